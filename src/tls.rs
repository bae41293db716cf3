//! rustls configuration that enforces the pinned certificate set.
//!
//! [`PinningVerifier`] first runs regular WebPKI validation against the Mozilla root set and
//! then, for connections to the API host, requires at least one certificate in the presented
//! chain to carry a SubjectPublicKeyInfo whose SHA-256 matches a trusted pin. Any other
//! host is validated by WebPKI alone.

// crates.io
use rustls::{
	CertificateError, ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore,
	SignatureScheme,
	client::{
		WebPkiServerVerifier,
		danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
	},
	crypto::{CryptoProvider, ring},
	pki_types::{CertificateDer, ServerName, UnixTime},
};
use x509_parser::prelude::parse_x509_certificate;
// self
use crate::{_prelude::*, error::ConfigError, pin::PinSet};

/// Server certificate verifier that layers pin checks over WebPKI validation.
#[derive(Debug)]
pub struct PinningVerifier {
	inner: Arc<WebPkiServerVerifier>,
	host: String,
	pins: PinSet,
}
impl PinningVerifier {
	/// Creates a verifier pinning `host` to `pins`.
	pub fn new(
		host: impl Into<String>,
		pins: PinSet,
		provider: Arc<CryptoProvider>,
	) -> Result<Self, ConfigError> {
		let roots = RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.to_vec() };
		let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
			.build()
			.map_err(ConfigError::tls)?;

		Ok(Self { inner, host: host.into(), pins })
	}

	/// Pins enforced for the API host.
	pub fn pins(&self) -> &PinSet {
		&self.pins
	}

	/// Returns `true` when pins must be checked for `server_name`.
	pub fn applies_to(&self, server_name: &ServerName<'_>) -> bool {
		match server_name {
			ServerName::DnsName(name) => name.as_ref().eq_ignore_ascii_case(&self.host),
			_ => true,
		}
	}

	/// Runs the pin check on an already WebPKI-validated chain.
	pub fn check_pins(
		&self,
		end_entity: &CertificateDer<'_>,
		intermediates: &[CertificateDer<'_>],
		server_name: &ServerName<'_>,
	) -> Result<(), TlsError> {
		if !self.applies_to(server_name) {
			return Ok(());
		}

		let pinned = std::iter::once(end_entity)
			.chain(intermediates)
			.any(|cert| self.certificate_matches(cert));

		if pinned {
			Ok(())
		} else {
			trace_event!(warn, "No certificate presented by {} matches a trusted pin.", self.host);

			Err(TlsError::InvalidCertificate(CertificateError::ApplicationVerificationFailure))
		}
	}

	fn certificate_matches(&self, cert: &CertificateDer<'_>) -> bool {
		match parse_x509_certificate(cert.as_ref()) {
			Ok((_, parsed)) => self.pins.matches_spki(parsed.public_key().raw),
			Err(_) => false,
		}
	}
}
impl ServerCertVerifier for PinningVerifier {
	fn verify_server_cert(
		&self,
		end_entity: &CertificateDer<'_>,
		intermediates: &[CertificateDer<'_>],
		server_name: &ServerName<'_>,
		ocsp_response: &[u8],
		now: UnixTime,
	) -> Result<ServerCertVerified, TlsError> {
		let verified = self.inner.verify_server_cert(
			end_entity,
			intermediates,
			server_name,
			ocsp_response,
			now,
		)?;

		self.check_pins(end_entity, intermediates, server_name)?;

		Ok(verified)
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, TlsError> {
		self.inner.verify_tls12_signature(message, cert, dss)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, TlsError> {
		self.inner.verify_tls13_signature(message, cert, dss)
	}

	fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
		self.inner.supported_verify_schemes()
	}
}

/// Builds a client TLS configuration pinning `host` to `pins`.
pub fn pinned_client_config(host: &str, pins: &PinSet) -> Result<ClientConfig, ConfigError> {
	let provider = Arc::new(ring::default_provider());
	let verifier = PinningVerifier::new(host, pins.clone(), provider.clone())?;
	let mut config = ClientConfig::builder_with_provider(provider)
		.with_safe_default_protocol_versions()
		.map_err(ConfigError::tls)?
		.dangerous()
		.with_custom_certificate_verifier(Arc::new(verifier))
		.with_no_client_auth();

	config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

	Ok(config)
}

/// Builds a reqwest client whose TLS layer enforces `pins` for `host`.
pub fn pinned_http_client(
	host: &str,
	pins: &PinSet,
	user_agent: Option<&str>,
) -> Result<ReqwestClient, ConfigError> {
	let tls = pinned_client_config(host, pins)?;
	let mut builder = ReqwestClient::builder().use_preconfigured_tls(tls);

	if let Some(user_agent) = user_agent {
		builder = builder.user_agent(user_agent);
	}

	builder.build().map_err(ConfigError::http_client_build)
}
