//! Signing secret wrapper that redacts sensitive material.

// self
use crate::_prelude::*;

/// Per-call HMAC secret kept out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Vec<u8>);
impl SigningSecret {
	/// Wraps raw secret bytes.
	pub fn new(value: impl Into<Vec<u8>>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret bytes. Callers must avoid logging them.
	pub fn expose(&self) -> &[u8] {
		&self.0
	}

	/// Returns `true` when no secret material is present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<[u8]> for SigningSecret {
	fn as_ref(&self) -> &[u8] {
		self.expose()
	}
}
impl From<&str> for SigningSecret {
	fn from(value: &str) -> Self {
		Self::new(value.as_bytes())
	}
}
impl From<String> for SigningSecret {
	fn from(value: String) -> Self {
		Self::new(value.into_bytes())
	}
}
impl Debug for SigningSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SigningSecret").field(&"<redacted>").finish()
	}
}
impl Display for SigningSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
