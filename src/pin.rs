//! Certificate pins and pin sets.
//!
//! A pin is `"<algorithm>/<base64 SPKI hash>"` with hyphens removed from the algorithm
//! name, so `sha-256/…` and `sha256/…` compare equal. Only `sha256` pins can match a
//! presented certificate; unknown algorithms never match, which keeps the verifier
//! fail-closed.

pub mod verifier;

pub use verifier::*;

// std
use std::collections::btree_set;
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const SHA256: &str = "sha256";

/// Error returned when a pin string cannot be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum PinError {
	/// The pin lacks the `/` separating algorithm and hash.
	#[error("Pin `{pin}` is missing the algorithm separator.")]
	MissingSeparator {
		/// Offending input.
		pin: String,
	},
	/// The algorithm component is empty.
	#[error("Pin algorithm cannot be empty.")]
	EmptyAlgorithm,
	/// The hash component is empty.
	#[error("Pin hash cannot be empty.")]
	EmptyHash,
}

/// Fingerprint of a trusted certificate public key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificatePin(String);
impl CertificatePin {
	/// Builds a pin from its components, stripping hyphens from the algorithm.
	pub fn new(algorithm: &str, spki_hash: &str) -> Result<Self, PinError> {
		let algorithm = algorithm.replace('-', "");

		if algorithm.is_empty() {
			return Err(PinError::EmptyAlgorithm);
		}
		if spki_hash.is_empty() {
			return Err(PinError::EmptyHash);
		}

		Ok(Self(format!("{algorithm}/{spki_hash}")))
	}

	/// Builds the `sha256` pin for a DER-encoded SubjectPublicKeyInfo.
	pub fn sha256_of(spki_der: &[u8]) -> Self {
		Self(format!("{SHA256}/{}", STANDARD.encode(Sha256::digest(spki_der))))
	}

	/// Returns the algorithm component.
	pub fn algorithm(&self) -> &str {
		self.split().0
	}

	/// Returns the base64 SPKI hash component.
	pub fn spki_hash(&self) -> &str {
		self.split().1
	}

	/// Returns the pin string.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Checks whether the DER-encoded SubjectPublicKeyInfo matches this pin.
	pub fn matches_spki(&self, spki_der: &[u8]) -> bool {
		self.algorithm().eq_ignore_ascii_case(SHA256)
			&& self.spki_hash() == STANDARD.encode(Sha256::digest(spki_der))
	}

	fn split(&self) -> (&str, &str) {
		self.0.split_once('/').unwrap_or((&self.0, ""))
	}
}
impl AsRef<str> for CertificatePin {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<CertificatePin> for String {
	fn from(value: CertificatePin) -> Self {
		value.0
	}
}
impl TryFrom<String> for CertificatePin {
	type Error = PinError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}
impl FromStr for CertificatePin {
	type Err = PinError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (algorithm, hash) =
			s.split_once('/').ok_or_else(|| PinError::MissingSeparator { pin: s.to_owned() })?;

		Self::new(algorithm, hash)
	}
}
impl Debug for CertificatePin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CertificatePin({})", self.0)
	}
}
impl Display for CertificatePin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Unique, unordered collection of pins.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinSet(BTreeSet<CertificatePin>);
impl PinSet {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a set holding only `pin`.
	pub fn singleton(pin: CertificatePin) -> Self {
		Self(BTreeSet::from([pin]))
	}

	/// Adds a pin, returning `false` if it was already present.
	pub fn insert(&mut self, pin: CertificatePin) -> bool {
		self.0.insert(pin)
	}

	/// Checks membership.
	pub fn contains(&self, pin: &CertificatePin) -> bool {
		self.0.contains(pin)
	}

	/// Number of pins.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the set holds no pins.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterates over the pins in a stable order.
	pub fn iter(&self) -> btree_set::Iter<'_, CertificatePin> {
		self.0.iter()
	}

	/// Checks whether any pin matches the DER-encoded SubjectPublicKeyInfo.
	pub fn matches_spki(&self, spki_der: &[u8]) -> bool {
		self.0.iter().any(|pin| pin.matches_spki(spki_der))
	}
}
impl FromIterator<CertificatePin> for PinSet {
	fn from_iter<I: IntoIterator<Item = CertificatePin>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}
impl IntoIterator for PinSet {
	type IntoIter = btree_set::IntoIter<CertificatePin>;
	type Item = CertificatePin;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}
impl<'a> IntoIterator for &'a PinSet {
	type IntoIter = btree_set::Iter<'a, CertificatePin>;
	type Item = &'a CertificatePin;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
impl Debug for PinSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.0.iter().map(CertificatePin::as_str)).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const API_CERT_DER: &[u8] = include_bytes!("../tests/fixtures/api_cert.der");
	const API_CERT_PIN: &str = "sha256/n/NjR7qNqqNMyfTOTgVwNOakgJ3PLJa0FWhyuXFBSq0=";

	fn api_spki() -> Vec<u8> {
		let (_, cert) = x509_parser::parse_x509_certificate(API_CERT_DER)
			.expect("Fixture certificate should parse.");

		cert.public_key().raw.to_vec()
	}

	#[test]
	fn algorithm_hyphens_are_stripped() {
		let pin = CertificatePin::new("RSA-PSS-SHA256", "abc=")
			.expect("Pin components should be accepted.");

		assert_eq!(pin.as_str(), "RSAPSSSHA256/abc=");
		assert_eq!(pin.algorithm(), "RSAPSSSHA256");
		assert_eq!(pin.spki_hash(), "abc=");
	}

	#[test]
	fn parsing_keeps_slashes_inside_hash() {
		let pin: CertificatePin = API_CERT_PIN.parse().expect("Fixture pin should parse.");

		assert_eq!(pin.algorithm(), "sha256");
		assert_eq!(pin.spki_hash(), "n/NjR7qNqqNMyfTOTgVwNOakgJ3PLJa0FWhyuXFBSq0=");
		assert_eq!(pin, CertificatePin::new("sha-256", pin.spki_hash()).expect("Pin should build."));
	}

	#[test]
	fn malformed_pins_are_rejected() {
		assert_eq!(
			"sha256".parse::<CertificatePin>(),
			Err(PinError::MissingSeparator { pin: "sha256".into() })
		);
		assert_eq!("-/abc".parse::<CertificatePin>(), Err(PinError::EmptyAlgorithm));
		assert_eq!("sha256/".parse::<CertificatePin>(), Err(PinError::EmptyHash));
	}

	#[test]
	fn sha256_pin_matches_certificate_spki() {
		let spki = api_spki();
		let pin: CertificatePin = API_CERT_PIN.parse().expect("Fixture pin should parse.");

		assert_eq!(CertificatePin::sha256_of(&spki), pin);
		assert!(pin.matches_spki(&spki));
		assert!(!pin.matches_spki(b"not a key"));
	}

	#[test]
	fn unknown_algorithms_never_match() {
		let spki = api_spki();
		let pin = CertificatePin::new("sha1", CertificatePin::sha256_of(&spki).spki_hash())
			.expect("Pin components should be accepted.");

		assert!(!pin.matches_spki(&spki));
	}

	#[test]
	fn pin_sets_compare_as_sets_and_serialize_as_strings() {
		let a: CertificatePin = "sha256/AAAA".parse().expect("Pin should parse.");
		let b: CertificatePin = "sha256/BBBB".parse().expect("Pin should parse.");
		let left: PinSet = [a.clone(), b.clone(), a.clone()].into_iter().collect();
		let right: PinSet = [b, a].into_iter().collect();

		assert_eq!(left, right);
		assert_eq!(left.len(), 2);

		let json = serde_json::to_string(&left).expect("Pin set should serialize.");

		assert_eq!(json, r#"["sha256/AAAA","sha256/BBBB"]"#);
		assert_eq!(serde_json::from_str::<PinSet>(&json).expect("Pin set should deserialize."), right);
	}
}
