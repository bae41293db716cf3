//! Transport primitives for downloading the signed pin list.
//!
//! [`PinHttpClient`] is the fetcher's only dependency on an HTTP stack. The default
//! [`ReqwestHttpClient`] wraps a plain reqwest client; the pin endpoint is authenticated by
//! the RSA signatures on its payload, so this client does not enforce pins itself.

// std
use std::ops::Deref;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`PinHttpClient::get`].
pub type HttpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + 'a + Send>>;

/// Status and body of a completed HTTP exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Abstraction over HTTP transports able to GET the pin endpoint.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// fetcher and the refresh task that runs it in the background.
pub trait PinHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Performs a GET request and buffers the full response.
	fn get<'a>(&'a self, url: &'a Url) -> HttpFuture<'a, HttpResponse>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl PinHttpClient for ReqwestHttpClient {
	fn get<'a>(&'a self, url: &'a Url) -> HttpFuture<'a, HttpResponse> {
		Box::pin(async move {
			let response = self
				.0
				.get(url.clone())
				.send()
				.await
				.map_err(|e| TransportError::network(url, e))?;
			let status = response.status().as_u16();
			let body = response.bytes().await.map_err(|e| TransportError::network(url, e))?;

			Ok(HttpResponse { status, body: body.to_vec() })
		})
	}
}
