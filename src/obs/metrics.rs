// self
use crate::obs::{OpKind, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"pinned_auth_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records the final outcome of a fallible operation and hands the result back.
pub fn record_result<T, E>(kind: OpKind, result: Result<T, E>) -> Result<T, E> {
	match &result {
		Ok(_) => record_outcome(kind, OpOutcome::Success),
		Err(_) => record_outcome(kind, OpOutcome::Failure),
	}

	result
}
