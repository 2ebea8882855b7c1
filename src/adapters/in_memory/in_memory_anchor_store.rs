// In memory implementation of the AnchorStore port.
//
// Purpose
// - Support engine tests and local development without touching the
//   filesystem. Cloning shares the single slot.

use std::sync::{Arc, RwLock};

use crate::core::ports::AnchorStore;
use crate::core::record::ChangeAnchor;

#[derive(Clone)]
pub struct InMemoryAnchorStore {
    slot: Arc<RwLock<Option<ChangeAnchor>>>,
}

impl InMemoryAnchorStore {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
        }
    }
}

impl Default for InMemoryAnchorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnchorStore for InMemoryAnchorStore {
    fn load(&self) -> Option<ChangeAnchor> {
        self.slot.read().expect("anchor slot poisoned").clone()
    }

    fn save(&self, anchor: &ChangeAnchor) {
        *self.slot.write().expect("anchor slot poisoned") = Some(anchor.clone());
    }
}
