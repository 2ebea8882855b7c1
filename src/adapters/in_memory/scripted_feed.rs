// In memory implementation of the ChangeFeed port.
//
// Purpose
// - Script feed behavior for tests and local development: seeded history for
//   backfill windows, queued incremental batches, injectable failures, and a
//   monotonic anchor counter so every fetch hands back a fresh bookmark.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::core::ports::{ChangeBatch, ChangeFeed, FeedError};
use crate::core::record::{ChangeAnchor, SourceRecord, SyncWindow};

#[derive(Clone)]
pub struct ScriptedFeed {
    inner: Arc<Inner>,
}

struct Inner {
    available: AtomicBool,
    history: Mutex<Vec<SourceRecord>>,
    pending: Mutex<VecDeque<Vec<SourceRecord>>>,
    fail_next: AtomicBool,
    anchor_seq: AtomicU64,
    held: AtomicBool,
    release: Notify,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                available: AtomicBool::new(true),
                history: Mutex::new(Vec::new()),
                pending: Mutex::new(VecDeque::new()),
                fail_next: AtomicBool::new(false),
                anchor_seq: AtomicU64::new(0),
                held: AtomicBool::new(false),
                release: Notify::new(),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Records visible to window queries (backfill).
    pub fn seed_history(&self, records: Vec<SourceRecord>) {
        self.inner
            .history
            .lock()
            .expect("feed history poisoned")
            .extend(records);
    }

    /// Queue one incremental batch; each `fetch_since` consumes one queued
    /// batch, or returns an empty one when the queue is dry.
    pub fn push_changes(&self, records: Vec<SourceRecord>) {
        self.inner
            .pending
            .lock()
            .expect("feed queue poisoned")
            .push_back(records);
    }

    /// The next feed query fails once with a transient error.
    pub fn fail_next_fetch(&self) {
        self.inner.fail_next.store(true, Ordering::SeqCst);
    }

    /// Park incremental fetches until `release_fetches`, so tests can keep a
    /// sync run in flight while triggering another.
    pub fn hold_fetches(&self) {
        self.inner.held.store(true, Ordering::SeqCst);
    }

    pub fn release_fetches(&self) {
        self.inner.held.store(false, Ordering::SeqCst);
        self.inner.release.notify_waiters();
    }

    async fn wait_while_held(&self) {
        loop {
            let released = self.inner.release.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if !self.inner.held.load(Ordering::SeqCst) {
                return;
            }
            released.await;
        }
    }

    fn next_anchor(&self) -> ChangeAnchor {
        let seq = self.inner.anchor_seq.fetch_add(1, Ordering::SeqCst) + 1;
        ChangeAnchor::from_bytes(seq.to_be_bytes().to_vec())
    }

    fn take_scripted_failure(&self) -> Result<(), FeedError> {
        if self.inner.fail_next.swap(false, Ordering::SeqCst) {
            Err(FeedError::Query("scripted feed failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for ScriptedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    async fn fetch_window(&self, window: SyncWindow) -> Result<Vec<SourceRecord>, FeedError> {
        self.take_scripted_failure()?;
        let history = self.inner.history.lock().expect("feed history poisoned");
        Ok(history
            .iter()
            .filter(|record| window.contains(record.start_time))
            .cloned()
            .collect())
    }

    async fn fetch_since(
        &self,
        _anchor: Option<&ChangeAnchor>,
    ) -> Result<ChangeBatch, FeedError> {
        self.wait_while_held().await;
        self.take_scripted_failure()?;
        let records = self
            .inner
            .pending
            .lock()
            .expect("feed queue poisoned")
            .pop_front()
            .unwrap_or_default();
        Ok(ChangeBatch {
            records,
            new_anchor: self.next_anchor(),
        })
    }

    async fn prime(&self) -> Result<ChangeAnchor, FeedError> {
        self.take_scripted_failure()?;
        Ok(self.next_anchor())
    }
}
