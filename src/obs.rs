//! Optional observability helpers for signing, pin refresh, and request dispatch.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `pinned_auth.op` with the `op` and `stage`
//!   (call site) fields, plus log events for refresh decisions.
//! - Enable `metrics` to increment the `pinned_auth_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Request token construction.
	Sign,
	/// Download + verification of the remote pin list.
	FetchPins,
	/// Coordinated pin refresh (fetch + persist + notify).
	RefreshPins,
	/// Outbound API request through the pipeline.
	Request,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Sign => "sign",
			OpKind::FetchPins => "fetch_pins",
			OpKind::RefreshPins => "refresh_pins",
			OpKind::Request => "request",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure, whether propagated or absorbed.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
