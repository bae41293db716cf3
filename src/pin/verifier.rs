//! RSA-SHA256 verification of signed pin entries.

// crates.io
use base64::{
	Engine,
	alphabet,
	engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::STANDARD},
};
use rsa::{
	RsaPublicKey,
	pkcs1v15::{Signature, VerifyingKey},
	pkcs8::DecodePublicKey,
	signature::Verifier,
};
use sha2::Sha256;
// self
use crate::{_prelude::*, error::ConfigError};

/// X.509 SubjectPublicKeyInfo of the 2048-bit key that signs the published pin list.
const EMBEDDED_PUBLIC_KEY: &str = concat!(
	"MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAsH+SP53J8v5qORDS4I6S",
	"3tuFGuw/RtariaYEg+he2jlgXfpD+MQCtyWmAtTvZtOwFxsDJvLr9O1iDlsKAvMT",
	"BZ0UVkixfWGg0Uo5+Qty23WnNH74CHDv2aD1A7GmTjC8ixC5QOjSFqHHP3j8OHtA",
	"6TQNTfpWHiZD7jHZRc1dRh+ga/SPrVeTqIDFrs7QfclXnricX/3VoPgWPL7GWy0z",
	"HjpBqVP106ETh0tDWFAiZ9ie/eDXUt9s/hHbuJVe4zeOsiZ2TGmZfx2Lf1w57c9E",
	"tEuPhsBiWt+HBiq1tqMT5DJZ3hj+vM/mgzaWRQhzz661E+D61R2/jhLf9Hx6SBBB",
	"MQIDAQAB",
);

/// Standard-alphabet decoder that tolerates missing padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
	&alphabet::STANDARD,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Reason a single fetched entry was discarded.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum VerificationError {
	/// Entry is not an object or lacks a string field.
	#[error("Entry is missing the `{field}` field.")]
	MissingField {
		/// Absent field name.
		field: &'static str,
	},
	/// A field is not valid base64.
	#[error("Entry field `{field}` is not valid base64.")]
	InvalidBase64 {
		/// Offending field name.
		field: &'static str,
	},
	/// RSA signature does not cover the data bytes.
	#[error("Entry signature does not verify.")]
	BadSignature,
	/// Signed data is not a usable pin description.
	#[error("Signed entry data is invalid: {reason}.")]
	InvalidData {
		/// Human-readable failure.
		reason: String,
	},
}

/// RSA PKCS#1 v1.5 / SHA-256 verifier for pin entries.
#[derive(Clone, Debug)]
pub struct PinVerifier {
	key: VerifyingKey<Sha256>,
}
impl PinVerifier {
	/// Verifier for the key built into the crate.
	pub fn embedded() -> Result<Self, ConfigError> {
		let der = STANDARD
			.decode(EMBEDDED_PUBLIC_KEY)
			.map_err(|e| ConfigError::InvalidVerifyingKey { reason: e.to_string() })?;

		Self::from_public_key_der(&der)
	}

	/// Verifier for a DER-encoded SubjectPublicKeyInfo.
	pub fn from_public_key_der(der: &[u8]) -> Result<Self, ConfigError> {
		let key = RsaPublicKey::from_public_key_der(der)
			.map_err(|e| ConfigError::InvalidVerifyingKey { reason: e.to_string() })?;

		Ok(Self { key: VerifyingKey::new(key) })
	}

	/// Verifier for a PEM-encoded (`BEGIN PUBLIC KEY`) SubjectPublicKeyInfo.
	pub fn from_public_key_pem(pem: &str) -> Result<Self, ConfigError> {
		let key = RsaPublicKey::from_public_key_pem(pem)
			.map_err(|e| ConfigError::InvalidVerifyingKey { reason: e.to_string() })?;

		Ok(Self { key: VerifyingKey::new(key) })
	}

	/// Checks that `signature` is a valid RSA-SHA256 signature over `data`.
	pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), VerificationError> {
		let signature =
			Signature::try_from(signature).map_err(|_| VerificationError::BadSignature)?;

		self.key.verify(data, &signature).map_err(|_| VerificationError::BadSignature)
	}

	/// Decodes and verifies the base64 `data`/`signature` pair, returning the data bytes.
	pub fn open(&self, data_b64: &str, signature_b64: &str) -> Result<Vec<u8>, VerificationError> {
		let data = decode_lenient(data_b64)
			.ok_or(VerificationError::InvalidBase64 { field: "data" })?;
		let signature = decode_lenient(signature_b64)
			.ok_or(VerificationError::InvalidBase64 { field: "signature" })?;

		self.verify(&data, &signature)?;

		Ok(data)
	}
}

fn decode_lenient(input: &str) -> Option<Vec<u8>> {
	let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

	LENIENT_BASE64.decode(compact).ok()
}
