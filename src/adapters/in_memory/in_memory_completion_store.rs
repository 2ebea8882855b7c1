// In memory implementation of the CompletionStore port.
//
// Purpose
// - Back streak tests without the filesystem. Cloning shares the day set.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::application::streak::CompletionStore;

#[derive(Clone)]
pub struct InMemoryCompletionStore {
    days: Arc<RwLock<BTreeSet<String>>>,
}

impl InMemoryCompletionStore {
    pub fn new() -> Self {
        Self {
            days: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }
}

impl Default for InMemoryCompletionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionStore for InMemoryCompletionStore {
    fn load(&self) -> BTreeSet<String> {
        self.days.read().expect("day set poisoned").clone()
    }

    fn save(&self, days: &BTreeSet<String>) {
        *self.days.write().expect("day set poisoned") = days.clone();
    }
}
