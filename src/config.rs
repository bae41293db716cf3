//! Validated client configuration.
//!
//! The API host named by `api_url` is the host whose certificates are pinned. The pin list
//! is downloaded from `cert_endpoint`, which defaults to `<api_url>/certificate`.

/// Builder API for assembling configurations.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, error::ConfigError, pin::CertificatePin, refresh::RefreshPolicy};

/// Production API base URL.
pub const DEFAULT_API_URL: &str = "https://api.auth.cmtelecom.com/authenticator/v1.0";
/// Pin trusted for the production API before any rotated set has been fetched.
pub const DEFAULT_INITIAL_PIN: &str = "sha256/opbrnmGQhRgt/hnidpLFyJZBjDLo3tN/cIA4YafwQcs=";

/// Immutable configuration consumed by [`crate::Authenticator`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
	/// API base URL; its host is the pinned host.
	pub api_url: Url,
	/// Fallback pin used until a verified set has been persisted.
	pub initial_pin: CertificatePin,
	/// Endpoint publishing the signed pin list.
	pub cert_endpoint: Url,
	/// Application name reported in the `User-Agent` header.
	#[serde(default)]
	pub app_name: Option<String>,
	/// Application version reported in the `User-Agent` header.
	#[serde(default)]
	pub app_version: Option<String>,
	/// Refresh cooldowns.
	#[serde(default)]
	pub refresh_policy: RefreshPolicy,
	/// Permits `http` URLs for local and staging setups.
	#[serde(default)]
	pub allow_plaintext: bool,
}
impl Config {
	/// Creates a new builder for the provided API URL and initial pin.
	pub fn builder(api_url: impl Into<String>, initial_pin: impl Into<String>) -> ConfigBuilder {
		ConfigBuilder::new(api_url, initial_pin)
	}

	/// Host whose certificates are pinned.
	pub fn api_host(&self) -> Result<&str, ConfigError> {
		self.api_url
			.host_str()
			.filter(|host| !host.is_empty())
			.ok_or_else(|| ConfigError::MissingHost { url: self.api_url.to_string() })
	}

	/// Resolves `path` against the API base URL, keeping the base path.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		join(&self.api_url, path)
	}

	/// `User-Agent` value, when an application name is configured.
	pub fn user_agent(&self) -> Option<String> {
		let name = self.app_name.as_deref().filter(|name| !name.is_empty())?;
		let platform = format!("({}; {})", std::env::consts::OS, std::env::consts::ARCH);

		Some(match self.app_version.as_deref().filter(|version| !version.is_empty()) {
			Some(version) => format!("{name}/{version} {platform}"),
			None => format!("{name} {platform}"),
		})
	}

	/// Validates invariants, including configurations obtained through deserialization.
	pub fn validate(&self) -> Result<(), ConfigError> {
		validate_endpoint("API", &self.api_url, self.allow_plaintext)?;
		validate_endpoint("certificate", &self.cert_endpoint, self.allow_plaintext)?;
		self.api_host()?;

		Ok(())
	}
}

fn join(base: &Url, path: &str) -> Result<Url, ConfigError> {
	let raw = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));

	Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })
}

fn validate_endpoint(
	name: &'static str,
	url: &Url,
	allow_plaintext: bool,
) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if allow_plaintext => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}
