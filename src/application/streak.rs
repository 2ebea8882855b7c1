// Daily streak bookkeeping.
//
// Purpose
// - Track which study days the participant completed, one normalized
//   `yyyy-mm-dd` key per day, and mirror the sorted day list to the remote
//   sink. Marking is idempotent per day; the push is best-effort (a failed
//   push never loses the local completion, the next completion resends the
//   whole list).

use std::collections::BTreeSet;

use chrono::Local;
use uuid::Uuid;

use crate::core::ports::RemoteSink;
use crate::core::rows::StreakRow;

/// Durable local store for the completed-day set.
pub trait CompletionStore: Send + Sync {
    fn load(&self) -> BTreeSet<String>;
    fn save(&self, days: &BTreeSet<String>);
}

pub struct StreakTracker<C, S> {
    owner: Uuid,
    store: C,
    sink: S,
}

impl<C, S> StreakTracker<C, S>
where
    C: CompletionStore,
    S: RemoteSink,
{
    pub fn new(owner: Uuid, store: C, sink: S) -> Self {
        Self { owner, store, sink }
    }

    /// Marks the current local calendar day as completed. Returns false when
    /// the day was already counted (no double counting, no push).
    pub async fn mark_today_completed(&self) -> bool {
        self.mark_day(&Local::now().format("%Y-%m-%d").to_string())
            .await
    }

    /// Day-key seam used by `mark_today_completed` and by tests.
    pub async fn mark_day(&self, day_key: &str) -> bool {
        let mut days = self.store.load();
        if !days.insert(day_key.to_string()) {
            tracing::debug!(day = day_key, "streak already marked for today, skipping");
            return false;
        }
        self.store.save(&days);
        tracing::info!(day = day_key, total = days.len(), "marked streak day completed");

        let row = StreakRow::new(self.owner, days.into_iter().collect());
        if let Err(err) = self.sink.upsert_streak(&row).await {
            tracing::warn!(error = %err, "streak push failed, keeping local completion");
        }
        true
    }

    pub fn completed_days(&self) -> BTreeSet<String> {
        self.store.load()
    }
}
