//! Outbound request pipeline: refresh trigger, token injection, pinned transport.
//!
//! Every request first gives the [`PinRefreshCoordinator`] a chance to start a background
//! refresh, then has its staged signing headers replaced by a bearer token, and finally
//! goes out through the current pinned client snapshot. A pin rotation builds a fresh
//! client and swaps it in; requests already in flight keep the snapshot they started with.
//!
//! The pinned client never leaves the pipeline. Requests are started with
//! [`RequestPipeline::request`] and can only be sent through the signing path, so staged
//! secrets are always stripped before anything reaches the network.

// crates.io
use reqwest::{
	Body, Method, Request, RequestBuilder, Response,
	header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, SigningError, TransportError},
	ext::{AUTHORIZATION_PAYLOAD, AUTHORIZATION_SECRET, RequestSignerExt, StageSigningExt},
	obs::{self, OpKind, OpOutcome, OpSpan},
	pin::PinSet,
	refresh::{PinChangeListener, PinRefreshCoordinator, RefreshOutcome, RefreshTrigger},
	tls,
	token::{Claims, SigningSecret, TokenSigner},
};

#[derive(Clone)]
struct PinnedClient {
	client: ReqwestClient,
	pins: PinSet,
}

struct PipelineInner {
	api_url: Url,
	api_host: String,
	user_agent: Option<String>,
	snapshot: RwLock<PinnedClient>,
	signer: TokenSigner,
	coordinator: PinRefreshCoordinator,
	refresh_task: Mutex<Option<JoinHandle<()>>>,
}
impl PipelineInner {
	fn apply_pins(&self, pins: &PinSet) -> Result<(), ConfigError> {
		let client = tls::pinned_http_client(&self.api_host, pins, self.user_agent.as_deref())?;

		*self.snapshot.write() = PinnedClient { client, pins: pins.clone() };

		Ok(())
	}

	fn rebuild(&self, pins: &PinSet) {
		match self.apply_pins(pins) {
			Ok(()) => trace_event!(info, "Pinned client rebuilt with {} pins.", pins.len()),
			Err(e) => trace_event!(error, "Failed to rebuild pinned client: {e}."),
		}
	}
}
impl PinChangeListener for PipelineInner {
	fn on_pins_changed(&self, pins: &PinSet) {
		self.rebuild(pins);
	}

	// Catches up after an earlier rebuild failed while the new set was already persisted.
	fn on_pins_unchanged(&self, pins: &PinSet) {
		if self.snapshot.read().pins != *pins {
			self.rebuild(pins);
		}
	}
}

/// Signs and sends API requests over a certificate-pinned connection.
#[derive(Clone)]
pub struct RequestPipeline {
	inner: Arc<PipelineInner>,
}
impl RequestPipeline {
	/// Creates a pipeline for `api_url` trusting `pins` until the first rotation.
	pub fn new(
		api_url: Url,
		user_agent: Option<String>,
		signer: TokenSigner,
		coordinator: PinRefreshCoordinator,
		pins: &PinSet,
	) -> Result<Self, ConfigError> {
		let api_host = api_url
			.host_str()
			.filter(|host| !host.is_empty())
			.ok_or_else(|| ConfigError::MissingHost { url: api_url.to_string() })?
			.to_owned();
		let client = tls::pinned_http_client(&api_host, pins, user_agent.as_deref())?;

		Ok(Self {
			inner: Arc::new(PipelineInner {
				api_url,
				api_host,
				user_agent,
				snapshot: RwLock::new(PinnedClient { client, pins: pins.clone() }),
				signer,
				coordinator,
				refresh_task: Mutex::new(None),
			}),
		})
	}

	/// API base URL.
	pub fn api_url(&self) -> &Url {
		&self.inner.api_url
	}

	/// Host whose certificates are pinned.
	pub fn api_host(&self) -> &str {
		&self.inner.api_host
	}

	/// Pins enforced by the current client snapshot.
	pub fn pins(&self) -> PinSet {
		self.inner.snapshot.read().pins.clone()
	}

	fn client(&self) -> ReqwestClient {
		self.inner.snapshot.read().client.clone()
	}

	/// Starts a request against `<api_url>/<path>`.
	pub fn request(&self, method: Method, path: &str) -> PipelineRequest {
		let url = format!(
			"{}/{}",
			self.inner.api_url.as_str().trim_end_matches('/'),
			path.trim_start_matches('/')
		);

		PipelineRequest { pipeline: self.clone(), builder: self.client().request(method, url) }
	}

	/// Triggers a refresh if due, signs the request, and sends it.
	///
	/// Signing failures abort the call before anything reaches the network.
	pub async fn execute(&self, request: Request) -> Result<Response> {
		const KIND: OpKind = OpKind::Request;

		let span = OpSpan::new(KIND, "execute");

		obs::record_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.trigger_refresh();

				let mut request = self.inner.signer.sign_request(request)?;
				let missing_agent = self
					.inner
					.user_agent
					.as_deref()
					.filter(|_| !request.headers().contains_key(USER_AGENT));

				if let Some(user_agent) = missing_agent {
					let value = HeaderValue::from_str(user_agent).map_err(SigningError::from)?;

					request.headers_mut().insert(USER_AGENT, value);
				}

				let client = self.client();
				let response = client.execute(request).await.map_err(TransportError::from)?;

				Ok(response)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Gives the coordinator a chance to start a background refresh.
	pub fn trigger_refresh(&self) -> bool {
		let listener: Arc<dyn PinChangeListener> = self.inner.clone();

		match self.inner.coordinator.maybe_refresh(listener) {
			RefreshTrigger::Started(handle) => {
				*self.inner.refresh_task.lock() = Some(handle);

				true
			},
			_ => false,
		}
	}

	/// Refreshes pins right away, rebuilding the client on rotation.
	pub async fn refresh_now(&self) -> RefreshOutcome {
		self.inner.coordinator.refresh_now(self.inner.as_ref()).await
	}

	/// Replaces the pinned client with one trusting `pins`.
	pub fn apply_pins(&self, pins: &PinSet) -> Result<(), ConfigError> {
		self.inner.apply_pins(pins)
	}

	/// Aborts a background refresh that is still running.
	pub fn shutdown(&self) {
		if let Some(handle) = self.inner.refresh_task.lock().take() {
			handle.abort();
		}
	}
}
impl Debug for RequestPipeline {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("api_url", &self.inner.api_url.as_str())
			.field("user_agent", &self.inner.user_agent)
			.field("coordinator", &self.inner.coordinator)
			.finish()
	}
}

/// Request started by [`RequestPipeline::request`].
///
/// Sending always goes through [`RequestPipeline::execute`]; the wrapped reqwest builder is
/// never handed back to the caller.
#[must_use = "a pipeline request does nothing until sent"]
pub struct PipelineRequest {
	pipeline: RequestPipeline,
	builder: RequestBuilder,
}
impl PipelineRequest {
	/// Adds a header.
	pub fn header(self, name: HeaderName, value: HeaderValue) -> Self {
		self.with_builder(|builder| builder.header(name, value))
	}

	/// Merges `headers` into the request headers.
	pub fn headers(self, headers: HeaderMap) -> Self {
		self.with_builder(|builder| builder.headers(headers))
	}

	/// Sets a buffered request body.
	pub fn body(self, body: impl Into<Body>) -> Self {
		self.with_builder(|builder| builder.body(body))
	}

	/// Sets a per-request timeout.
	pub fn timeout(self, timeout: std::time::Duration) -> Self {
		self.with_builder(|builder| builder.timeout(timeout))
	}

	/// Applies any other reqwest builder option.
	pub fn with_builder(self, f: impl FnOnce(RequestBuilder) -> RequestBuilder) -> Self {
		Self { pipeline: self.pipeline, builder: f(self.builder) }
	}

	/// Builds the request and sends it through the signing path.
	pub async fn send(self) -> Result<Response> {
		let request = self.builder.build().map_err(TransportError::from)?;

		self.pipeline.execute(request).await
	}
}
impl StageSigningExt for PipelineRequest {
	fn signing_secret(self, secret: &SigningSecret) -> Self {
		self.with_builder(|builder| builder.header(AUTHORIZATION_SECRET, secret.expose()))
	}

	fn signing_claims(self, claims: &Claims) -> Self {
		let claims = serde_json::Value::Object(claims.clone()).to_string();

		self.with_builder(|builder| builder.header(AUTHORIZATION_PAYLOAD, claims))
	}
}
impl Debug for PipelineRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PipelineRequest").field("pipeline", &self.pipeline).finish_non_exhaustive()
	}
}
