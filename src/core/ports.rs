// Ports define what the sync engine needs from the outside world, without implementing it.
//
// Purpose
// - Describe the three external collaborators as traits: the durable anchor
//   slot, the health-data change feed, and the remote row store. Plus the
//   OS-granted background execution grant as a scoped resource.
//
// Responsibilities
// - Keep the core independent of any platform framework or HTTP client by
//   coding against traits. Port errors carry string detail so no transport
//   type leaks into the core.
//
// Boundaries
// - No concrete input or output here. Adapters implement these traits in the
//   adapters layer; platform glue implements ChangeFeed and GrantSource on
//   top of the OS frameworks.
//
// Testing guidance
// - Use the in-memory implementations for tests and local development.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use super::record::{ChangeAnchor, SourceRecord, SyncWindow};
use super::rows::{MediaRow, OptOutFeedbackRow, ParticipantRow, StreakRow, UploadRow};

/// Durable single-slot store for the change anchor.
///
/// `load` must never fail: missing or corrupt data reads as `None`, which
/// forces a fresh backfill instead of a crash. `save` must be durable before
/// it returns, since the caller treats it as the recovery checkpoint;
/// adapters log write failures rather than propagate them (a lost save only
/// widens the next fetch, which upsert idempotency absorbs).
pub trait AnchorStore: Send + Sync {
    fn load(&self) -> Option<ChangeAnchor>;
    fn save(&self, anchor: &ChangeAnchor);
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("health data feed unavailable")]
    Unavailable,

    #[error("feed query failed: {0}")]
    Query(String),
}

/// Records plus the fresh anchor that bookmarks the position after them.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub records: Vec<SourceRecord>,
    pub new_anchor: ChangeAnchor,
}

/// The external health-data change feed.
///
/// Errors propagate to the caller uncaught; retry is the scheduling policy's
/// job, not the feed's.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Whether the platform store is present and authorized. When false the
    /// engine silently no-ops.
    fn is_available(&self) -> bool;

    /// All records whose start time falls in the half-open window. Unordered;
    /// used only for backfill.
    async fn fetch_window(&self, window: SyncWindow) -> Result<Vec<SourceRecord>, FeedError>;

    /// All changes recorded since the prior anchor, with no time-window
    /// restriction. Always returns a fresh anchor, even for zero records.
    async fn fetch_since(&self, anchor: Option<&ChangeAnchor>) -> Result<ChangeBatch, FeedError>;

    /// Zero-result anchor query: bookmark "now" without retrieving history.
    async fn prime(&self) -> Result<ChangeAnchor, FeedError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink rejected request: HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// The remote row store, treated as an opaque upsert/insert/delete sink.
///
/// Upserts resolve conflicts server-side on the stated key, so redelivery of
/// the same logical row is a no-op. No partial-batch semantics: a call either
/// lands the whole batch or fails.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Upsert sleep rows, conflict key `(user_id, sample_uuid)`. Empty
    /// batches must not issue a network call.
    async fn upsert_samples(&self, rows: &[UploadRow]) -> Result<(), SinkError>;

    /// Upsert the participant row, conflict key `user_id`.
    async fn upsert_participant(&self, row: &ParticipantRow) -> Result<(), SinkError>;

    /// Upsert the streak row, conflict key `user_id`.
    async fn upsert_streak(&self, row: &StreakRow) -> Result<(), SinkError>;

    /// Record one media-upload row. Insert-only.
    async fn insert_media(&self, row: &MediaRow) -> Result<(), SinkError>;

    /// Record why a participant left. Insert-only; callers drop blank
    /// reasons before reaching the sink. Allowed for inactive users.
    async fn insert_opt_out_feedback(&self, row: &OptOutFeedbackRow) -> Result<(), SinkError>;

    /// Push media bytes to object storage under the given path.
    async fn store_object(&self, path: &str, bytes: &[u8], mime: &str) -> Result<(), SinkError>;

    /// Flip the participant row to inactive. Allowed for inactive users.
    async fn mark_inactive(&self, owner: Uuid) -> Result<(), SinkError>;

    /// Delete every row owned by the user across all tables. Allowed for
    /// inactive users.
    async fn delete_user_data(&self, owner: Uuid) -> Result<(), SinkError>;
}

/// Hands out finite-duration background execution grants.
///
/// Platform glue backs this with the OS begin/end background-task calls; the
/// in-memory adapter backs it in tests.
pub trait GrantSource: Send + Sync {
    fn begin(&self, name: &str) -> ExecutionGrant;
}

/// A scoped background execution grant.
///
/// Released exactly once, on drop, so no exit path (completion, error, or
/// expiration) can leak it. The source signals expiration through
/// [`ExecutionGrant::expired`]; in-flight work must be abandoned when that
/// resolves (the anchor has not advanced, so the next trigger repeats the
/// interval).
pub struct ExecutionGrant {
    name: String,
    on_release: Option<Box<dyn FnOnce() + Send + Sync>>,
    expired_flag: Arc<AtomicBool>,
    expired_signal: Arc<Notify>,
}

impl ExecutionGrant {
    pub fn new(
        name: impl Into<String>,
        on_release: Box<dyn FnOnce() + Send + Sync>,
        expired_flag: Arc<AtomicBool>,
        expired_signal: Arc<Notify>,
    ) -> Self {
        Self {
            name: name.into(),
            on_release: Some(on_release),
            expired_flag,
            expired_signal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves when the source expires the grant. Returns immediately if it
    /// already has.
    ///
    /// The source signals with `notify_waiters`, which only reaches waiters
    /// that are already registered, so the waiter must be enabled before the
    /// flag is checked or a signal landing in between is lost.
    pub async fn expired(&self) {
        let notified = self.expired_signal.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.expired_flag.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

impl Drop for ExecutionGrant {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}
