// self
use crate::{
	_prelude::*,
	config::{Config, DEFAULT_API_URL, DEFAULT_INITIAL_PIN},
	error::ConfigError,
	pin::CertificatePin,
	refresh::RefreshPolicy,
};

/// Builder for [`Config`] values.
#[derive(Debug)]
pub struct ConfigBuilder {
	/// Raw API base URL.
	pub api_url: String,
	/// Raw fallback pin.
	pub initial_pin: String,
	/// Optional override of the pin list endpoint.
	pub cert_endpoint: Option<String>,
	/// Application name for the `User-Agent` header.
	pub app_name: Option<String>,
	/// Application version for the `User-Agent` header.
	pub app_version: Option<String>,
	/// Refresh cooldowns.
	pub refresh_policy: RefreshPolicy,
	/// Permits `http` URLs.
	pub allow_plaintext: bool,
}
impl ConfigBuilder {
	/// Creates a new builder seeded with the provided API URL and initial pin.
	pub fn new(api_url: impl Into<String>, initial_pin: impl Into<String>) -> Self {
		Self {
			api_url: api_url.into(),
			initial_pin: initial_pin.into(),
			cert_endpoint: None,
			app_name: None,
			app_version: None,
			refresh_policy: RefreshPolicy::default(),
			allow_plaintext: false,
		}
	}

	/// Overrides the pin list endpoint.
	pub fn cert_endpoint(mut self, url: impl Into<String>) -> Self {
		self.cert_endpoint = Some(url.into());

		self
	}

	/// Sets the application name reported in the `User-Agent` header.
	pub fn app_name(mut self, name: impl Into<String>) -> Self {
		self.app_name = Some(name.into());

		self
	}

	/// Sets the application version reported in the `User-Agent` header.
	pub fn app_version(mut self, version: impl Into<String>) -> Self {
		self.app_version = Some(version.into());

		self
	}

	/// Overrides the refresh cooldowns.
	pub fn refresh_policy(mut self, policy: RefreshPolicy) -> Self {
		self.refresh_policy = policy;

		self
	}

	/// Allows `http` endpoints (local and staging only).
	pub fn allow_plaintext(mut self, allow: bool) -> Self {
		self.allow_plaintext = allow;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<Config, ConfigError> {
		let raw_api_url = self.api_url.trim();

		if raw_api_url.is_empty() {
			return Err(ConfigError::MissingApiUrl);
		}

		let api_url = parse_url(raw_api_url)?;
		let raw_pin = self.initial_pin.trim();

		if raw_pin.is_empty() {
			return Err(ConfigError::MissingInitialPin);
		}

		let initial_pin = raw_pin
			.parse::<CertificatePin>()
			.map_err(|source| ConfigError::InvalidPin { pin: raw_pin.to_owned(), source })?;
		let cert_endpoint = match self.cert_endpoint.as_deref() {
			Some(raw) => parse_url(raw.trim())?,
			None => parse_url(&format!("{}/certificate", api_url.as_str().trim_end_matches('/')))?,
		};
		let config = Config {
			api_url,
			initial_pin,
			cert_endpoint,
			app_name: self.app_name,
			app_version: self.app_version,
			refresh_policy: self.refresh_policy,
			allow_plaintext: self.allow_plaintext,
		};

		config.validate()?;

		Ok(config)
	}
}
impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new(DEFAULT_API_URL, DEFAULT_INITIAL_PIN)
	}
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { url: raw.to_owned(), source })
}
