//! Rate-limited, single-flight refresh of the pinned certificate set.
//!
//! [`PinRefreshCoordinator::maybe_refresh`] runs before every outbound request. It is cheap
//! when nothing needs doing: a cooldown check against `next_allowed`, then an atomic
//! compare-and-swap on the in-flight flag. A winning caller spawns the refresh on the
//! ambient Tokio runtime and returns immediately; the request is never blocked on the
//! fetch. After a successful fetch the next refresh is allowed one `success_interval`
//! later (whether or not the pins changed); after any failure the coordinator backs off
//! for `failure_backoff`.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use tokio::{runtime::Handle, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	clock::Clock,
	error::FetchError,
	fetch::PinSource,
	obs::{self, OpKind, OpOutcome, OpSpan},
	pin::PinSet,
	store::TrustStore,
};

/// Cooldowns applied between refreshes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPolicy {
	/// Wait after a successful fetch, changed or not.
	pub success_interval: Duration,
	/// Wait after a failed fetch or persistence error.
	pub failure_backoff: Duration,
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self { success_interval: Duration::hours(1), failure_backoff: Duration::minutes(1) }
	}
}

/// Receives the new pin set whenever a refresh persists a different one.
pub trait PinChangeListener
where
	Self: Send + Sync,
{
	/// Called once per rotation, after the new set has been persisted.
	fn on_pins_changed(&self, pins: &PinSet);

	/// Called when a fetch confirms the persisted set, so listeners that fell behind can
	/// re-apply it.
	fn on_pins_unchanged(&self, _pins: &PinSet) {}
}
impl<F> PinChangeListener for F
where
	F: Fn(&PinSet) + Send + Sync,
{
	fn on_pins_changed(&self, pins: &PinSet) {
		self(pins)
	}
}

/// Result of [`PinRefreshCoordinator::maybe_refresh`].
#[derive(Debug)]
pub enum RefreshTrigger {
	/// The cooldown has not elapsed yet.
	CoolingDown,
	/// Another refresh currently holds the in-flight flag.
	InFlight,
	/// No Tokio runtime is available on the calling thread.
	Unscheduled,
	/// A refresh task was spawned.
	Started(JoinHandle<()>),
}
impl RefreshTrigger {
	/// Returns `true` when a refresh task was spawned.
	pub fn is_started(&self) -> bool {
		matches!(self, Self::Started(_))
	}
}

/// Result of a refresh that actually ran (or was refused by single-flight).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// A different pin set was persisted and listeners were notified.
	Updated(PinSet),
	/// The fetched set equals the persisted one.
	Unchanged,
	/// Fetch or persistence failed; the failure backoff applies.
	Failed,
	/// Another refresh was already running.
	AlreadyInFlight,
}

#[derive(Debug)]
struct RefreshState {
	next_allowed: Mutex<OffsetDateTime>,
	in_flight: AtomicBool,
}
impl Default for RefreshState {
	fn default() -> Self {
		Self {
			next_allowed: Mutex::new(OffsetDateTime::UNIX_EPOCH),
			in_flight: AtomicBool::new(false),
		}
	}
}

// Clears the in-flight flag on drop, including when the refresh task is aborted.
struct InFlightGuard(Arc<RefreshState>);
impl InFlightGuard {
	fn acquire(state: &Arc<RefreshState>) -> Option<Self> {
		state
			.in_flight
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| Self(state.clone()))
	}
}
impl Drop for InFlightGuard {
	fn drop(&mut self) {
		self.0.in_flight.store(false, Ordering::Release);
	}
}

/// Decides when to refresh pins and makes sure only one refresh runs at a time.
#[derive(Clone)]
pub struct PinRefreshCoordinator {
	source: Arc<dyn PinSource>,
	trust: TrustStore,
	clock: Arc<dyn Clock>,
	policy: RefreshPolicy,
	state: Arc<RefreshState>,
	metrics: Arc<RefreshMetrics>,
}
impl PinRefreshCoordinator {
	/// Creates a coordinator that is immediately eligible to refresh.
	pub fn new(
		source: Arc<dyn PinSource>,
		trust: TrustStore,
		clock: Arc<dyn Clock>,
		policy: RefreshPolicy,
	) -> Self {
		Self {
			source,
			trust,
			clock,
			policy,
			state: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Trust store the coordinator writes to.
	pub fn trust(&self) -> &TrustStore {
		&self.trust
	}

	/// Cooldowns in effect.
	pub fn policy(&self) -> RefreshPolicy {
		self.policy
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Earliest instant the next refresh may start.
	pub fn next_allowed(&self) -> OffsetDateTime {
		*self.state.next_allowed.lock()
	}

	/// Returns `true` while a refresh holds the in-flight flag.
	pub fn is_in_flight(&self) -> bool {
		self.state.in_flight.load(Ordering::Acquire)
	}

	/// Starts a background refresh when the cooldown has elapsed and none is running.
	///
	/// Never blocks and never surfaces refresh failures.
	pub fn maybe_refresh(&self, listener: Arc<dyn PinChangeListener>) -> RefreshTrigger {
		if self.cooling_down() {
			return RefreshTrigger::CoolingDown;
		}

		let Ok(runtime) = Handle::try_current() else {
			trace_event!(debug, "No Tokio runtime available; skipping certificate refresh.");

			return RefreshTrigger::Unscheduled;
		};
		let Some(guard) = InFlightGuard::acquire(&self.state) else {
			return RefreshTrigger::InFlight;
		};

		// A refresh may have completed between the first check and the acquire.
		if self.cooling_down() {
			return RefreshTrigger::CoolingDown;
		}

		let this = self.clone();

		RefreshTrigger::Started(runtime.spawn(async move {
			this.run(guard, listener.as_ref()).await;
		}))
	}

	/// Refreshes immediately, ignoring the cooldown but honouring single-flight.
	pub async fn refresh_now(&self, listener: &dyn PinChangeListener) -> RefreshOutcome {
		match InFlightGuard::acquire(&self.state) {
			Some(guard) => self.run(guard, listener).await,
			None => RefreshOutcome::AlreadyInFlight,
		}
	}

	fn cooling_down(&self) -> bool {
		self.clock.now() < self.next_allowed()
	}

	// The guard is dropped only after `next_allowed` has been updated.
	async fn run(&self, _guard: InFlightGuard, listener: &dyn PinChangeListener) -> RefreshOutcome {
		const KIND: OpKind = OpKind::RefreshPins;

		let span = OpSpan::new(KIND, "refresh");

		obs::record_outcome(KIND, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let result = obs::record_result(KIND, span.instrument(self.fetch_and_apply(listener)).await);
		let now = self.clock.now();

		match result {
			Ok(outcome) => {
				*self.state.next_allowed.lock() = now + self.policy.success_interval;

				self.metrics.record_success(matches!(outcome, RefreshOutcome::Updated(_)));
				trace_event!(info, "Certificate refresh finished: {outcome:?}.");

				outcome
			},
			Err(e) => {
				*self.state.next_allowed.lock() = now + self.policy.failure_backoff;

				self.metrics.record_failure();
				trace_event!(warn, "Certificate refresh failed: {e}.");

				RefreshOutcome::Failed
			},
		}
	}

	async fn fetch_and_apply(&self, listener: &dyn PinChangeListener) -> Result<RefreshOutcome> {
		let fetched = self.source.fetch_pins().await?;

		if fetched.is_empty() {
			return Err(FetchError::NoVerifiedPins.into());
		}

		let persisted = self.trust.persisted().await?;

		if persisted.as_ref() == Some(&fetched) {
			listener.on_pins_unchanged(&fetched);

			return Ok(RefreshOutcome::Unchanged);
		}

		self.trust.save(&fetched).await?;
		listener.on_pins_changed(&fetched);

		Ok(RefreshOutcome::Updated(fetched))
	}
}
impl Debug for PinRefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PinRefreshCoordinator")
			.field("policy", &self.policy)
			.field("next_allowed", &self.next_allowed())
			.field("in_flight", &self.is_in_flight())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// crates.io
	use time::macros::datetime;
	use tokio::sync::Notify;
	// self
	use super::*;
	use crate::{
		error::TransportError,
		fetch::PinFuture,
		pin::CertificatePin,
		store::{MemoryStore, PinStore},
	};

	#[derive(Debug)]
	struct ManualClock(Mutex<OffsetDateTime>);
	impl ManualClock {
		fn advance(&self, by: Duration) {
			*self.0.lock() += by;
		}
	}
	impl Clock for ManualClock {
		fn now(&self) -> OffsetDateTime {
			*self.0.lock()
		}
	}

	struct ScriptedSource {
		calls: AtomicUsize,
		response: Mutex<Option<PinSet>>,
		gate: Option<Arc<Notify>>,
	}
	impl ScriptedSource {
		fn returning(pins: Option<PinSet>) -> Self {
			Self { calls: AtomicUsize::new(0), response: Mutex::new(pins), gate: None }
		}
	}
	impl PinSource for ScriptedSource {
		fn fetch_pins(&self) -> PinFuture<'_> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				if let Some(gate) = &self.gate {
					gate.notified().await;
				}

				self.response.lock().clone().ok_or_else(|| {
					Error::from(TransportError::Io(std::io::ErrorKind::ConnectionRefused.into()))
				})
			})
		}
	}

	struct Harness {
		clock: Arc<ManualClock>,
		source: Arc<ScriptedSource>,
		store: Arc<MemoryStore>,
		coordinator: PinRefreshCoordinator,
	}

	fn pins(values: &[&str]) -> PinSet {
		values.iter().map(|pin| pin.parse::<CertificatePin>().expect("Pin should parse.")).collect()
	}

	fn harness(source: ScriptedSource) -> Harness {
		let clock = Arc::new(ManualClock(Mutex::new(datetime!(2024-01-01 00:00:00 UTC))));
		let source = Arc::new(source);
		let store = Arc::new(MemoryStore::default());
		let trust = TrustStore::new(store.clone(), "sha256/FALLBACK".parse().expect("Pin should parse."));
		let coordinator =
			PinRefreshCoordinator::new(source.clone(), trust, clock.clone(), RefreshPolicy::default());

		Harness { clock, source, store, coordinator }
	}

	fn counting_listener() -> (Arc<AtomicUsize>, impl Fn(&PinSet) + Send + Sync) {
		let count = Arc::new(AtomicUsize::new(0));
		let seen = count.clone();

		(count, move |_: &PinSet| {
			seen.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[tokio::test]
	async fn rotation_persists_and_notifies_once() {
		let h = harness(ScriptedSource::returning(Some(pins(&["sha256/A", "sha256/B"]))));
		let (count, listener) = counting_listener();

		assert_eq!(
			h.coordinator.refresh_now(&listener).await,
			RefreshOutcome::Updated(pins(&["sha256/A", "sha256/B"]))
		);
		assert_eq!(count.load(Ordering::SeqCst), 1);
		assert_eq!(
			h.store.load_pin_set().await.expect("Memory store should load."),
			Some(pins(&["sha256/A", "sha256/B"]))
		);
		assert_eq!(h.coordinator.next_allowed(), h.clock.now() + Duration::hours(1));
		assert_eq!(h.coordinator.metrics().rotations(), 1);
	}

	#[tokio::test]
	async fn unchanged_set_keeps_success_cooldown_without_notifying() {
		let h = harness(ScriptedSource::returning(Some(pins(&["sha256/A"]))));
		let (count, listener) = counting_listener();

		h.store.save_pin_set(pins(&["sha256/A"])).await.expect("Memory store should save.");

		assert_eq!(h.coordinator.refresh_now(&listener).await, RefreshOutcome::Unchanged);
		assert_eq!(count.load(Ordering::SeqCst), 0);
		assert_eq!(h.coordinator.next_allowed(), h.clock.now() + Duration::hours(1));
	}

	#[tokio::test]
	async fn unchanged_set_is_reported_to_listeners() {
		struct Recorder(Mutex<Vec<PinSet>>);
		impl PinChangeListener for Recorder {
			fn on_pins_changed(&self, _pins: &PinSet) {
				panic!("Unchanged sets must not be reported as rotations.");
			}

			fn on_pins_unchanged(&self, pins: &PinSet) {
				self.0.lock().push(pins.clone());
			}
		}

		let h = harness(ScriptedSource::returning(Some(pins(&["sha256/A"]))));
		let recorder = Recorder(Mutex::new(Vec::new()));

		h.store.save_pin_set(pins(&["sha256/A"])).await.expect("Memory store should save.");

		assert_eq!(h.coordinator.refresh_now(&recorder).await, RefreshOutcome::Unchanged);
		assert_eq!(*recorder.0.lock(), vec![pins(&["sha256/A"])]);
	}

	#[tokio::test]
	async fn failure_backs_off_one_minute() {
		let h = harness(ScriptedSource::returning(None));
		let (count, listener) = counting_listener();

		assert_eq!(h.coordinator.refresh_now(&listener).await, RefreshOutcome::Failed);
		assert_eq!(count.load(Ordering::SeqCst), 0);
		assert_eq!(h.coordinator.next_allowed(), h.clock.now() + Duration::minutes(1));
		assert_eq!(h.coordinator.metrics().failures(), 1);
		assert!(!h.coordinator.is_in_flight());
	}

	#[tokio::test]
	async fn empty_verified_set_is_a_failure() {
		let h = harness(ScriptedSource::returning(Some(PinSet::new())));
		let (_, listener) = counting_listener();

		assert_eq!(h.coordinator.refresh_now(&listener).await, RefreshOutcome::Failed);
		assert_eq!(h.store.load_pin_set().await.expect("Memory store should load."), None);
	}

	#[tokio::test]
	async fn cooldown_suppresses_background_refresh() {
		let h = harness(ScriptedSource::returning(Some(pins(&["sha256/A"]))));
		let (_, listener) = counting_listener();
		let listener: Arc<dyn PinChangeListener> = Arc::new(listener);

		match h.coordinator.maybe_refresh(listener.clone()) {
			RefreshTrigger::Started(handle) => handle.await.expect("Refresh task should finish."),
			other => panic!("Expected a refresh to start, got {other:?}."),
		}

		h.clock.advance(Duration::minutes(59));

		assert!(matches!(h.coordinator.maybe_refresh(listener.clone()), RefreshTrigger::CoolingDown));

		h.clock.advance(Duration::minutes(1));

		assert!(h.coordinator.maybe_refresh(listener).is_started());
	}

	#[tokio::test]
	async fn single_flight_rejects_concurrent_refreshes() {
		let gate = Arc::new(Notify::new());
		let h = harness(ScriptedSource {
			gate: Some(gate.clone()),
			..ScriptedSource::returning(Some(pins(&["sha256/A"])))
		});
		let (count, listener) = counting_listener();
		let listener: Arc<dyn PinChangeListener> = Arc::new(listener);
		let RefreshTrigger::Started(handle) = h.coordinator.maybe_refresh(listener.clone()) else {
			panic!("First refresh should start.");
		};

		assert!(matches!(h.coordinator.maybe_refresh(listener.clone()), RefreshTrigger::InFlight));
		assert_eq!(h.coordinator.refresh_now(listener.as_ref()).await, RefreshOutcome::AlreadyInFlight);

		gate.notify_one();
		handle.await.expect("Refresh task should finish.");

		assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
		assert_eq!(count.load(Ordering::SeqCst), 1);
		assert!(!h.coordinator.is_in_flight());
	}

	#[tokio::test]
	async fn aborted_refresh_releases_flag() {
		let h = harness(ScriptedSource {
			gate: Some(Arc::new(Notify::new())),
			..ScriptedSource::returning(Some(pins(&["sha256/A"])))
		});
		let (_, listener) = counting_listener();
		let RefreshTrigger::Started(handle) = h.coordinator.maybe_refresh(Arc::new(listener)) else {
			panic!("Refresh should start.");
		};

		assert!(h.coordinator.is_in_flight());

		handle.abort();

		assert!(handle.await.is_err_and(|e| e.is_cancelled()));
		assert!(!h.coordinator.is_in_flight());
	}

	#[test]
	fn missing_runtime_is_reported() {
		let h = harness(ScriptedSource::returning(Some(pins(&["sha256/A"]))));
		let (_, listener) = counting_listener();

		assert!(matches!(h.coordinator.maybe_refresh(Arc::new(listener)), RefreshTrigger::Unscheduled));
		assert!(!h.coordinator.is_in_flight());
	}
}
