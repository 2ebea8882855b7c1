// Application error taxonomy for sync runs.
//
// Purpose
// - One enum a caller can match on to decide retry and surfacing. A corrupt
//   local anchor is deliberately NOT here: the anchor store swallows it and
//   reports "never synced", which routes the next run through backfill.
//
// Propagation policy
// - Background-triggered runs log and swallow these; foreground runs may
//   render a transient status string. Nothing here is fatal to the process.

use thiserror::Error;

use crate::core::ports::{FeedError, SinkError};

#[derive(Debug, Error)]
pub enum SyncError {
    /// The health data store is missing or not authorized. Not retryable
    /// without user action.
    #[error("health data feed unavailable")]
    FeedUnavailable,

    /// Transient feed query failure. The anchor was not advanced; the next
    /// scheduled trigger retries the same interval.
    #[error("change fetch failed: {0}")]
    FetchFailed(String),

    /// Transient sink failure. The anchor was not advanced; the same batch is
    /// resent next run, which the sink's upsert absorbs.
    #[error("upload failed: {0}")]
    UploadFailed(String),
}

impl From<FeedError> for SyncError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Unavailable => SyncError::FeedUnavailable,
            FeedError::Query(detail) => SyncError::FetchFailed(detail),
        }
    }
}

impl SyncError {
    pub fn upload(err: SinkError) -> Self {
        SyncError::UploadFailed(err.to_string())
    }
}
