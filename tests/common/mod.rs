#![allow(dead_code)]

// std
use std::{env, path::PathBuf, process};
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use httpmock::MockServer;
use parking_lot::Mutex;
use rsa::{
	RsaPrivateKey,
	pkcs1v15::SigningKey,
	pkcs8::DecodePrivateKey,
	signature::{SignatureEncoding, Signer},
};
use serde_json::{Value, json};
use sha2::Sha256;
use time::{Duration, OffsetDateTime, macros::datetime};
// self
use pinned_auth::{
	clock::Clock,
	config::Config,
	pin::{CertificatePin, PinSet, PinVerifier},
};

pub const PRIVATE_PEM: &str = include_str!("../fixtures/pin_signing_key.pem");
pub const PUBLIC_PEM: &str = include_str!("../fixtures/pin_signing_key.pub.pem");
pub const FALLBACK_PIN: &str = "sha256/n/NjR7qNqqNMyfTOTgVwNOakgJ3PLJa0FWhyuXFBSq0=";

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<OffsetDateTime>);
impl ManualClock {
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Mutex::new(start))
	}

	pub fn advance(&self, by: Duration) {
		*self.0.lock() += by;
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(datetime!(2024-01-01 00:00:00 UTC))
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

pub fn verifier() -> PinVerifier {
	PinVerifier::from_public_key_pem(PUBLIC_PEM).expect("Fixture public key should decode.")
}

pub fn signed_entry(algorithm: &str, hash: &str) -> Value {
	let key = RsaPrivateKey::from_pkcs8_pem(PRIVATE_PEM).expect("Fixture private key should decode.");
	let data = json!({ "algorithm": algorithm, "spki_hash": hash }).to_string();
	let signature = SigningKey::<Sha256>::new(key).sign(data.as_bytes()).to_vec();

	json!({ "data": STANDARD.encode(&data), "signature": STANDARD.encode(signature) })
}

pub fn signed_body(entries: &[(&str, &str)]) -> String {
	Value::Array(entries.iter().map(|(algorithm, hash)| signed_entry(algorithm, hash)).collect())
		.to_string()
}

pub fn pins(values: &[&str]) -> PinSet {
	values
		.iter()
		.map(|pin| pin.parse::<CertificatePin>().expect("Pin fixture should parse."))
		.collect()
}

pub fn plaintext_config(server: &MockServer) -> Config {
	Config::builder(server.url("/v1"), FALLBACK_PIN)
		.app_name("Wallet")
		.app_version("2.4.1")
		.allow_plaintext(true)
		.build()
		.expect("Plaintext config should build for the mock server.")
}

pub fn temp_path(label: &str) -> PathBuf {
	let unique = format!(
		"pinned_auth_{label}_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}
