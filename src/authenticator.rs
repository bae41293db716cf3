//! Explicit context handle wiring the signer, trust store, refresh coordinator, and pipeline.

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	config::Config,
	error::{ConfigError, SigningError},
	fetch::{CertificateFetcher, PinSource},
	http::ReqwestHttpClient,
	pin::{PinSet, PinVerifier},
	pipeline::RequestPipeline,
	refresh::{PinRefreshCoordinator, RefreshOutcome},
	store::{PinStore, TrustStore},
	token::{Claims, SigningContext, SigningSecret, Token, TokenSigner},
};

/// Entry point owning every collaborator of the authentication layer.
///
/// Cloning is cheap; clones share the trust store, refresh state, and pinned client.
#[derive(Clone, Debug)]
pub struct Authenticator {
	config: Arc<Config>,
	signer: TokenSigner,
	coordinator: PinRefreshCoordinator,
	pipeline: RequestPipeline,
}
impl Authenticator {
	/// Builds an authenticator that fetches pins from `config.cert_endpoint` and verifies
	/// them with the embedded signing key.
	pub async fn new(config: Config, store: Arc<dyn PinStore>) -> Result<Self> {
		let http_client = ReqwestClient::builder().build().map_err(ConfigError::http_client_build)?;
		let fetcher = <CertificateFetcher>::new(
			config.cert_endpoint.clone(),
			PinVerifier::embedded()?,
			ReqwestHttpClient::with_client(http_client),
		);

		Self::with_parts(config, store, Arc::new(fetcher), Arc::new(SystemClock)).await
	}

	/// Builds an authenticator from explicit collaborators.
	pub async fn with_parts(
		config: Config,
		store: Arc<dyn PinStore>,
		source: Arc<dyn PinSource>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		config.validate()?;

		let trust = TrustStore::new(store, config.initial_pin.clone());
		let pins = trust.load().await?;
		let signer = TokenSigner::new(clock.clone());
		let coordinator = PinRefreshCoordinator::new(source, trust, clock, config.refresh_policy);
		let pipeline = RequestPipeline::new(
			config.api_url.clone(),
			config.user_agent(),
			signer.clone(),
			coordinator.clone(),
			&pins,
		)?;

		trace_event!(
			info,
			"Authenticator ready for {} with {} trusted pins.",
			pipeline.api_host(),
			pins.len()
		);

		Ok(Self { config: Arc::new(config), signer, coordinator, pipeline })
	}

	/// Configuration in effect.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Token signer sharing this handle's clock.
	pub fn signer(&self) -> &TokenSigner {
		&self.signer
	}

	/// Refresh coordinator.
	pub fn coordinator(&self) -> &PinRefreshCoordinator {
		&self.coordinator
	}

	/// Pinned request pipeline.
	pub fn pipeline(&self) -> &RequestPipeline {
		&self.pipeline
	}

	/// Signs a token for a single call.
	pub fn sign(
		&self,
		secret: &SigningSecret,
		claims: Option<&Claims>,
		body: Option<&[u8]>,
	) -> Result<Token, SigningError> {
		let context = SigningContext { secret: secret.expose(), claims, body };

		self.signer.sign(&context)
	}

	/// Currently trusted pins (the fallback pin when nothing usable is persisted).
	pub async fn current_pins(&self) -> Result<PinSet> {
		Ok(self.coordinator.trust().load().await?)
	}

	/// Refreshes pins immediately, ignoring the cooldown.
	pub async fn refresh_now(&self) -> RefreshOutcome {
		self.pipeline.refresh_now().await
	}

	/// Forgets rotated pins and returns to the configured fallback pin.
	pub async fn reset_pins(&self) -> Result<()> {
		let trust = self.coordinator.trust();

		trust.reset().await?;
		self.pipeline.apply_pins(&PinSet::singleton(trust.fallback().clone()))?;

		Ok(())
	}

	/// Aborts background work started by this handle.
	pub fn shutdown(&self) {
		self.pipeline.shutdown();
	}
}
