//! Compact HS256 request tokens bound to the request body.
//!
//! A token is `base64url(header).base64url(payload).base64url(hmac)` without padding. The
//! header is always `{"alg":"HS256"}`; the payload carries the caller claims plus `iat`,
//! `nbf`, `exp` (60 seconds after `iat`) and, when a body is present, `sig` (the lowercase
//! hex HMAC-SHA256 of the body). Tokens are minted per request and never stored.

pub mod secret;

pub use secret::SigningSecret;

// std
use std::collections::BTreeMap;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	error::SigningError,
	obs::{self, OpKind, OpOutcome},
};

/// Arbitrary caller claims merged into the token payload.
pub type Claims = Map<String, Value>;

type HmacSha256 = Hmac<Sha256>;

/// Validity window of every token.
pub const TOKEN_LIFETIME: Duration = Duration::seconds(60);

const HEADER_JSON: &str = r#"{"alg":"HS256"}"#;

/// Inputs for a single token; borrowed for the duration of one call.
#[derive(Clone, Copy, Debug)]
pub struct SigningContext<'a> {
	/// HMAC key shared with the API for this call.
	pub secret: &'a [u8],
	/// Optional structured claims.
	pub claims: Option<&'a Claims>,
	/// Optional request body bytes.
	pub body: Option<&'a [u8]>,
}
impl<'a> SigningContext<'a> {
	/// Creates a context carrying only the secret.
	pub fn new(secret: &'a [u8]) -> Self {
		Self { secret, claims: None, body: None }
	}

	/// Attaches caller claims.
	pub fn with_claims(mut self, claims: &'a Claims) -> Self {
		self.claims = Some(claims);

		self
	}

	/// Attaches the request body the token should cover.
	pub fn with_body(mut self, body: &'a [u8]) -> Self {
		self.body = Some(body);

		self
	}
}

/// Signed compact token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);
impl Token {
	/// Returns the encoded token.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Consumes the token and returns the encoded string.
	pub fn into_string(self) -> String {
		self.0
	}

	/// Returns the `Authorization` header value for this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}

	/// Returns the encoded header, payload, and signature segments.
	pub fn segments(&self) -> (&str, &str, &str) {
		let mut parts = self.0.splitn(3, '.');
		let header = parts.next().unwrap_or_default();
		let payload = parts.next().unwrap_or_default();
		let signature = parts.next().unwrap_or_default();

		(header, payload, signature)
	}

	/// Decodes the payload segment back into claims.
	pub fn claims(&self) -> Result<Claims, SigningError> {
		let (_, payload, _) = self.segments();
		let bytes = URL_SAFE_NO_PAD
			.decode(payload)
			.map_err(|e| SigningError::InvalidClaims { reason: e.to_string() })?;

		serde_json::from_slice(&bytes)
			.map_err(|e| SigningError::InvalidClaims { reason: e.to_string() })
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Token").field(&"<redacted>").finish()
	}
}

/// Builds request tokens from a secret, claims, and body.
#[derive(Clone, Debug)]
pub struct TokenSigner {
	clock: Arc<dyn Clock>,
}
impl TokenSigner {
	/// Creates a signer reading time from `clock`.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { clock }
	}

	/// Signs `context` at the current instant.
	pub fn sign(&self, context: &SigningContext) -> Result<Token, SigningError> {
		obs::record_outcome(OpKind::Sign, OpOutcome::Attempt);

		obs::record_result(OpKind::Sign, Self::sign_at(context, self.clock.now()))
	}

	/// Signs `context` as if the current instant were `now`.
	pub fn sign_at(context: &SigningContext, now: OffsetDateTime) -> Result<Token, SigningError> {
		if context.secret.is_empty() {
			return Err(SigningError::MissingSecret);
		}

		let issued_at = now.unix_timestamp();
		let mut payload: BTreeMap<String, Value> =
			context.claims.map(|claims| claims.clone().into_iter().collect()).unwrap_or_default();

		payload.insert("iat".into(), issued_at.into());
		payload.insert("nbf".into(), issued_at.into());
		payload.insert("exp".into(), (issued_at + TOKEN_LIFETIME.whole_seconds()).into());

		if let Some(body) = context.body.filter(|body| !body.is_empty()) {
			payload.insert("sig".into(), hex::encode(hmac_sha256(body, context.secret)).into());
		}

		let encoded_header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
		let encoded_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);
		let signing_input = format!("{encoded_header}.{encoded_payload}");
		let signature = URL_SAFE_NO_PAD.encode(hmac_sha256(signing_input.as_bytes(), context.secret));

		Ok(Token(format!("{signing_input}.{signature}")))
	}
}
impl Default for TokenSigner {
	fn default() -> Self {
		Self::new(Arc::new(SystemClock))
	}
}

/// RFC 2104 HMAC-SHA256 of `data` keyed by `secret`.
pub fn hmac_sha256(data: &[u8], secret: &[u8]) -> Vec<u8> {
	// HMAC accepts keys of any length.
	let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
		.unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts keys of any length"));

	mac.update(data);

	mac.finalize().into_bytes().to_vec()
}
