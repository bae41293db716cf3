// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for pin refresh attempts.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	rotations: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the total number of refresh attempts that reached the fetcher.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of successful refreshes (including unchanged pin sets).
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refreshes.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns how many refreshes persisted a different pin set.
	pub fn rotations(&self) -> u64 {
		self.rotations.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self, rotated: bool) {
		self.success.fetch_add(1, Ordering::Relaxed);

		if rotated {
			self.rotations.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
