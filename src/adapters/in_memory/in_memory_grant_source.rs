// In memory implementation of the GrantSource port.
//
// Purpose
// - Count grant acquisitions and releases, and let tests expire in-flight
//   grants on demand, so leak-freedom of the background path is assertable.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::core::ports::{ExecutionGrant, GrantSource};

#[derive(Clone)]
pub struct InMemoryGrantSource {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    begun: AtomicUsize,
    released: AtomicUsize,
    expired: Arc<AtomicBool>,
    expiry: Arc<Notify>,
}

impl Default for InMemoryGrantSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGrantSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    pub fn begun(&self) -> usize {
        self.inner.begun.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Expire every grant handed out by this source, now and in the future.
    pub fn expire_all(&self) {
        self.inner.expired.store(true, Ordering::SeqCst);
        self.inner.expiry.notify_waiters();
    }
}

impl GrantSource for InMemoryGrantSource {
    fn begin(&self, name: &str) -> ExecutionGrant {
        self.inner.begun.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        ExecutionGrant::new(
            name,
            Box::new(move || {
                inner.released.fetch_add(1, Ordering::SeqCst);
            }),
            self.inner.expired.clone(),
            self.inner.expiry.clone(),
        )
    }
}
