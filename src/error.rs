//! Crate-level error types shared by the signer, fetcher, stores, and pipeline.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token could not be produced; the request must not be sent.
	#[error(transparent)]
	Signing(#[from] SigningError),
	/// Pin endpoint answered with something other than a usable pin list.
	#[error(transparent)]
	Fetch(#[from] FetchError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Pin string could not be parsed.
	#[error(transparent)]
	Pin(#[from] crate::pin::PinError),
}

/// Failures raised while building a request token.
#[derive(Debug, ThisError)]
pub enum SigningError {
	/// The per-call secret was empty or absent.
	#[error("Signing secret is missing.")]
	MissingSecret,
	/// Staged claims were not a JSON object.
	#[error("Token claims are invalid: {reason}.")]
	InvalidClaims {
		/// Human-readable parsing failure.
		reason: String,
	},
	/// The request body is a stream and cannot be bound into the token.
	#[error("Request body is not buffered and cannot be signed.")]
	UnbufferedBody,
	/// The produced token could not be written into a header value.
	#[error("Authorization header value is invalid.")]
	InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
	/// Claims could not be serialized.
	#[error("Token claims could not be serialized.")]
	Serialize(#[from] serde_json::Error),
}

/// Failures raised while interpreting the pin endpoint response.
#[derive(Debug, ThisError)]
pub enum FetchError {
	/// Endpoint returned an empty body.
	#[error("Certificate endpoint returned an empty body.")]
	EmptyResponse,
	/// Endpoint body was not a JSON array.
	#[error("Certificate endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Every entry failed verification, leaving nothing to trust.
	///
	/// A refresh treats this as a failure: the previously trusted set stays in place and
	/// the failure backoff applies, so an empty or fully forged response can never remove
	/// every pin.
	#[error("Certificate endpoint returned no verifiable pins.")]
	NoVerifiedPins,
	/// The blocking fetch was called from inside an async runtime.
	#[error("Blocking certificate fetch cannot run inside an async runtime.")]
	BlockingInRuntime,
	/// Endpoint answered with a non-success status code.
	#[error("Certificate endpoint {url} answered with status {status}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Endpoint that was called.
		url: String,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// API base URL was not supplied.
	#[error("Missing API URL.")]
	MissingApiUrl,
	/// Initial fallback pin was not supplied.
	#[error("Missing initial certificate pin.")]
	MissingInitialPin,
	/// URL could not be parsed.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoint does not use HTTPS and plaintext was not allowed.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Configured pin could not be parsed.
	#[error("Certificate pin `{pin}` is invalid.")]
	InvalidPin {
		/// Offending input.
		pin: String,
		/// Underlying parsing failure.
		#[source]
		source: crate::pin::PinError,
	},
	/// API URL carries no host to pin against.
	#[error("URL `{url}` has no host.")]
	MissingHost {
		/// Offending URL.
		url: String,
	},
	/// Embedded or supplied RSA verifying key is unusable.
	#[error("Pin verifying key is invalid: {reason}.")]
	InvalidVerifyingKey {
		/// Human-readable decoding failure.
		reason: String,
	},
	/// TLS configuration could not be assembled.
	#[error("TLS configuration could not be built.")]
	Tls {
		/// Underlying rustls failure.
		#[source]
		source: BoxError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a rustls configuration failure inside [`ConfigError`].
	pub fn tls(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Tls { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Endpoint that was called, when known.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Display, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.to_string(), source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		let url = e.url().map(ToString::to_string).unwrap_or_else(|| "<unknown>".into());

		Self::network(url, e)
	}
}
