//! Header-staged request signing for reqwest requests.

// crates.io
use reqwest::{
	Request,
	header::{AUTHORIZATION, HeaderValue},
};
use serde_json::Value;
// self
use crate::{
	error::SigningError,
	token::{Claims, SigningContext, SigningSecret, TokenSigner},
};

/// Staging header carrying the per-call HMAC secret. Never sent to the server.
pub const AUTHORIZATION_SECRET: &str = "Authorization-Secret";
/// Staging header carrying optional JSON claims. Never sent to the server.
pub const AUTHORIZATION_PAYLOAD: &str = "Authorization-Payload";

/// Describes how to turn staged signing inputs into an authorization header without
/// constraining the HTTP client type.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the request, removes any staging headers, and attaches the signed token.
	///
	/// Requests without a staged secret are returned without an authorization header.
	fn sign_request(&self, request: Request) -> Result<Request, Error>;
}
impl RequestSignerExt<Request, SigningError> for TokenSigner {
	fn sign_request(&self, mut request: Request) -> Result<Request, SigningError> {
		let headers = request.headers_mut();
		let secret = headers.remove(AUTHORIZATION_SECRET);
		let payload = headers.remove(AUTHORIZATION_PAYLOAD);
		let Some(secret) = secret else {
			return Ok(request);
		};
		let claims = payload.map(|value| parse_claims(value.as_bytes())).transpose()?;
		let body = match request.body() {
			Some(body) => Some(body.as_bytes().ok_or(SigningError::UnbufferedBody)?),
			None => None,
		};
		let mut context = SigningContext::new(secret.as_bytes());

		if let Some(claims) = &claims {
			context = context.with_claims(claims);
		}
		if let Some(body) = body {
			context = context.with_body(body);
		}

		let token = self.sign(&context)?;
		let mut value = HeaderValue::from_str(&token.bearer())?;

		value.set_sensitive(true);
		request.headers_mut().insert(AUTHORIZATION, value);

		Ok(request)
	}
}

/// Stages signing inputs on a request that is guaranteed to pass through a signer before
/// dispatch, such as [`crate::pipeline::PipelineRequest`].
pub trait StageSigningExt
where
	Self: Sized,
{
	/// Stages the per-call secret.
	fn signing_secret(self, secret: &SigningSecret) -> Self;

	/// Stages caller claims to merge into the token payload.
	fn signing_claims(self, claims: &Claims) -> Self;
}
fn parse_claims(raw: &[u8]) -> Result<Claims, SigningError> {
	match serde_json::from_slice(raw) {
		Ok(Value::Object(claims)) => Ok(claims),
		Ok(other) => Err(SigningError::InvalidClaims {
			reason: format!("expected a JSON object, found `{other}`"),
		}),
		Err(e) => Err(SigningError::InvalidClaims { reason: e.to_string() }),
	}
}
