//! Extension contracts that attach signed tokens to outbound requests.
//!
//! Callers stage the per-call secret and optional claims on the request itself (see
//! [`StageSigningExt`]); a [`RequestSignerExt`] implementation consumes those staging
//! headers right before dispatch and replaces them with `Authorization: Bearer <token>`.

pub mod request_signer;

pub use request_signer::*;
