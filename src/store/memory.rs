//! Thread-safe in-memory [`PinStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	pin::PinSet,
	store::{PinStore, StoreError, StoreFuture},
};

type Slot = Arc<RwLock<Option<PinSet>>>;

/// Storage backend that keeps the pin set in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Creates a store already holding `pins`.
	pub fn with_pins(pins: PinSet) -> Self {
		Self(Arc::new(RwLock::new(Some(pins))))
	}

	fn replace_now(slot: Slot, pins: Option<PinSet>) -> Result<(), StoreError> {
		*slot.write() = pins;

		Ok(())
	}
}
impl PinStore for MemoryStore {
	fn load_pin_set(&self) -> StoreFuture<'_, Option<PinSet>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn save_pin_set(&self, pins: PinSet) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move { Self::replace_now(slot, Some(pins)) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move { Self::replace_now(slot, None) })
	}
}
