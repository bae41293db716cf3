//! Download and verification of the remotely published pin list.
//!
//! The endpoint answers with a JSON array of `{ "data": base64, "signature": base64 }`
//! entries. `data` decodes to `{"algorithm": "...", "spki_hash": "..."}` and `signature` is
//! an RSA-SHA256 signature over the decoded `data` bytes made with the pin-signing key.
//! Entries that fail any check are skipped, so a partially rotated fleet of signing keys
//! still yields the pins that verify; an all-invalid response yields an empty set.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{FetchError, TransportError},
	http::{PinHttpClient, ReqwestHttpClient},
	obs::{self, OpKind, OpOutcome, OpSpan},
	pin::{CertificatePin, PinSet, PinVerifier, VerificationError},
};

/// Boxed future returned by [`PinSource::fetch_pins`].
pub type PinFuture<'a> = Pin<Box<dyn Future<Output = Result<PinSet>> + 'a + Send>>;

/// Anything able to produce a freshly verified pin set.
pub trait PinSource
where
	Self: Send + Sync,
{
	/// Fetches and verifies the current pin set.
	fn fetch_pins(&self) -> PinFuture<'_>;
}

#[derive(Deserialize)]
struct SignedPinData {
	algorithm: String,
	spki_hash: String,
}

/// Fetches the signed pin list from the configured endpoint.
pub struct CertificateFetcher<C = ReqwestHttpClient>
where
	C: ?Sized + PinHttpClient,
{
	http_client: Arc<C>,
	endpoint: Url,
	verifier: PinVerifier,
}
impl<C> CertificateFetcher<C>
where
	C: ?Sized + PinHttpClient,
{
	/// Creates a fetcher for `endpoint` that trusts entries signed for `verifier`.
	pub fn new(endpoint: Url, verifier: PinVerifier, http_client: impl Into<Arc<C>>) -> Self {
		Self { http_client: http_client.into(), endpoint, verifier }
	}

	/// Endpoint the fetcher calls.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Fetches the pin list without blocking the calling task.
	pub async fn fetch(&self) -> Result<PinSet> {
		const KIND: OpKind = OpKind::FetchPins;

		let span = OpSpan::new(KIND, "fetch");

		obs::record_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let response = self.http_client.get(&self.endpoint).await?;

				if !response.is_success() {
					return Err(FetchError::UnexpectedStatus {
						status: response.status,
						url: self.endpoint.to_string(),
					}
					.into());
				}

				self.parse_response(&response.body)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Fetches the pin list on a private current-thread runtime.
	///
	/// Returns [`FetchError::BlockingInRuntime`] when called from within an async runtime;
	/// use [`CertificateFetcher::fetch`] there instead.
	pub fn fetch_blocking(&self) -> Result<PinSet> {
		if tokio::runtime::Handle::try_current().is_ok() {
			return Err(FetchError::BlockingInRuntime.into());
		}

		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
			.map_err(TransportError::Io)?;

		runtime.block_on(self.fetch())
	}

	/// Parses and verifies a raw endpoint body.
	pub fn parse_response(&self, body: &[u8]) -> Result<PinSet> {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Err(FetchError::EmptyResponse.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(body);
		let entries: Vec<Value> = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| FetchError::MalformedResponse { source })?;
		let mut pins = PinSet::new();

		for (index, entry) in entries.iter().enumerate() {
			match self.verify_entry(entry) {
				Ok(pin) => {
					pins.insert(pin);
				},
				Err(e) => trace_event!(debug, "Skipping certificate entry {index}: {e}"),
			}
		}

		trace_event!(debug, "Verified {} of {} certificate entries.", pins.len(), entries.len());

		Ok(pins)
	}

	fn verify_entry(&self, entry: &Value) -> Result<CertificatePin, VerificationError> {
		let data = string_field(entry, "data")?;
		let signature = string_field(entry, "signature")?;
		let opened = self.verifier.open(data, signature)?;
		let description: SignedPinData = serde_json::from_slice(&opened)
			.map_err(|e| VerificationError::InvalidData { reason: e.to_string() })?;

		CertificatePin::new(&description.algorithm, &description.spki_hash)
			.map_err(|e| VerificationError::InvalidData { reason: e.to_string() })
	}
}
impl<C> PinSource for CertificateFetcher<C>
where
	C: ?Sized + PinHttpClient,
{
	fn fetch_pins(&self) -> PinFuture<'_> {
		Box::pin(self.fetch())
	}
}
impl<C> Debug for CertificateFetcher<C>
where
	C: ?Sized + PinHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CertificateFetcher").field("endpoint", &self.endpoint.as_str()).finish()
	}
}

fn string_field<'a>(entry: &'a Value, field: &'static str) -> Result<&'a str, VerificationError> {
	entry.get(field).and_then(Value::as_str).ok_or(VerificationError::MissingField { field })
}
