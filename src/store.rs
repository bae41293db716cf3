//! Persistence contracts for pinned certificates and the trust store built on top of them.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	pin::{CertificatePin, PinSet},
};

/// Boxed future returned by [`PinStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable key-value collaborator holding the persisted pin set.
pub trait PinStore
where
	Self: Send + Sync,
{
	/// Loads the persisted pin set, if any.
	fn load_pin_set(&self) -> StoreFuture<'_, Option<PinSet>>;

	/// Atomically replaces the persisted pin set.
	fn save_pin_set(&self, pins: PinSet) -> StoreFuture<'_, ()>;

	/// Removes the persisted pin set.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`PinStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Currently trusted pins: the persisted set, or the configured fallback pin when nothing
/// usable has been persisted yet.
#[derive(Clone)]
pub struct TrustStore {
	store: Arc<dyn PinStore>,
	fallback: CertificatePin,
}
impl TrustStore {
	/// Creates a trust store persisting through `store`.
	pub fn new(store: Arc<dyn PinStore>, fallback: CertificatePin) -> Self {
		Self { store, fallback }
	}

	/// Pin trusted when no rotated set is available.
	pub fn fallback(&self) -> &CertificatePin {
		&self.fallback
	}

	/// Returns the effective pin set (never empty).
	pub async fn load(&self) -> Result<PinSet, StoreError> {
		Ok(self.effective(self.persisted().await?))
	}

	/// Returns exactly what is persisted.
	pub async fn persisted(&self) -> Result<Option<PinSet>, StoreError> {
		self.store.load_pin_set().await
	}

	/// Replaces the persisted pin set.
	pub async fn save(&self, pins: &PinSet) -> Result<(), StoreError> {
		self.store.save_pin_set(pins.clone()).await
	}

	/// Forgets any rotated pins so the fallback pin applies again.
	pub async fn reset(&self) -> Result<(), StoreError> {
		self.store.clear().await
	}

	/// Resolves a persisted value into the effective pin set.
	pub fn effective(&self, persisted: Option<PinSet>) -> PinSet {
		match persisted {
			Some(pins) if !pins.is_empty() => pins,
			_ => PinSet::singleton(self.fallback.clone()),
		}
	}
}
impl Debug for TrustStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TrustStore").field("fallback", &self.fallback).finish()
	}
}
