// Background-delivery trigger path for the sync engine.
//
// Purpose
// - Handle the platform's change notifications: acknowledge receipt
//   immediately so the OS keeps delivering, then run the incremental sync
//   inside a finite execution grant that is released on every exit path.
//
// Propagation policy
// - The user is never interrupted by a background sync failure: errors are
//   logged and swallowed here. Grant expiration abandons the run; the anchor
//   has not advanced, so the next trigger repeats the same interval.

use std::sync::Arc;

use crate::core::ports::{AnchorStore, ChangeFeed, GrantSource, RemoteSink};

use super::errors::SyncError;
use super::sync_engine::SleepSyncEngine;

const GRANT_NAME: &str = "sleep incremental sync";

/// One change notification's acknowledgment callback. The platform requires
/// it to be called promptly; calling it is idempotent, and dropping an
/// unacknowledged handle acknowledges as a backstop.
pub struct Acknowledgment {
    ack: Option<Box<dyn FnOnce() + Send>>,
}

impl Acknowledgment {
    pub fn new(ack: Box<dyn FnOnce() + Send>) -> Self {
        Self { ack: Some(ack) }
    }

    pub fn ack(&mut self) {
        if let Some(ack) = self.ack.take() {
            ack();
        }
    }
}

impl Drop for Acknowledgment {
    fn drop(&mut self) {
        self.ack();
    }
}

pub struct BackgroundDelivery<A, F, S, G> {
    engine: Arc<SleepSyncEngine<A, F, S>>,
    grants: G,
}

impl<A, F, S, G> BackgroundDelivery<A, F, S, G>
where
    A: AnchorStore,
    F: ChangeFeed,
    S: RemoteSink,
    G: GrantSource,
{
    pub fn new(engine: Arc<SleepSyncEngine<A, F, S>>, grants: G) -> Self {
        Self { engine, grants }
    }

    /// Entry point wired to the platform's observer callback.
    pub async fn handle_change_notification(&self, mut ack: Acknowledgment) {
        // Ack before doing any work so the OS can throttle and queue
        // correctly; the fetch and upload run under the grant below.
        ack.ack();

        let grant = self.grants.begin(GRANT_NAME);
        tokio::select! {
            result = self.engine.sync() => match result {
                Ok(outcome) => {
                    tracing::info!(
                        uploaded = outcome.uploaded,
                        backfilled = outcome.backfilled,
                        skipped = outcome.skipped,
                        "background sync finished"
                    );
                }
                Err(SyncError::FeedUnavailable) => {
                    tracing::debug!("background sync skipped, feed unavailable");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "background sync failed, will retry on next trigger");
                }
            },
            _ = grant.expired() => {
                tracing::warn!(grant = grant.name(), "execution grant expired, abandoning sync run");
            }
        }
        // The grant drops here on every path, releasing it exactly once.
    }
}
