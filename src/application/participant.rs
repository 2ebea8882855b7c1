// Participant state and opt-out flow.
//
// Purpose
// - One gate for "is this participant still in the study". Inactive
//   participants stop contributing data without errors: every upload-shaped
//   sink call becomes a no-op, while the opt-out operations (mark inactive,
//   delete all data) keep working so a withdrawal can complete.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::ports::{RemoteSink, SinkError};
use crate::core::rows::{MediaRow, OptOutFeedbackRow, ParticipantRow, StreakRow, UploadRow};

/// Shared active-participant flag. The embedding application loads the
/// persisted value at startup and constructs the gate with it.
#[derive(Clone)]
pub struct ParticipantGate {
    active: Arc<AtomicBool>,
}

impl ParticipantGate {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

/// RemoteSink decorator that suppresses uploads for inactive participants.
///
/// Wrap the real sink with this before handing it to the engine and the
/// other services; they never need to know about the gate.
#[derive(Clone)]
pub struct GatedSink<S> {
    gate: ParticipantGate,
    inner: S,
}

impl<S> GatedSink<S> {
    pub fn new(gate: ParticipantGate, inner: S) -> Self {
        Self { gate, inner }
    }

    fn suppressed(&self, what: &str) -> bool {
        if self.gate.is_active() {
            return false;
        }
        tracing::debug!(what, "participant inactive, suppressing upload");
        true
    }
}

#[async_trait]
impl<S: RemoteSink> RemoteSink for GatedSink<S> {
    async fn upsert_samples(&self, rows: &[UploadRow]) -> Result<(), SinkError> {
        if self.suppressed("sleep samples") {
            return Ok(());
        }
        self.inner.upsert_samples(rows).await
    }

    async fn upsert_participant(&self, row: &ParticipantRow) -> Result<(), SinkError> {
        if self.suppressed("participant") {
            return Ok(());
        }
        self.inner.upsert_participant(row).await
    }

    async fn upsert_streak(&self, row: &StreakRow) -> Result<(), SinkError> {
        if self.suppressed("streak") {
            return Ok(());
        }
        self.inner.upsert_streak(row).await
    }

    async fn insert_media(&self, row: &MediaRow) -> Result<(), SinkError> {
        if self.suppressed("media row") {
            return Ok(());
        }
        self.inner.insert_media(row).await
    }

    async fn store_object(&self, path: &str, bytes: &[u8], mime: &str) -> Result<(), SinkError> {
        if self.suppressed("media object") {
            return Ok(());
        }
        self.inner.store_object(path, bytes, mime).await
    }

    // Opt-out operations pass through regardless of the gate: a withdrawn
    // participant must still be able to flip the flag, leave feedback, and
    // purge their rows.

    async fn insert_opt_out_feedback(&self, row: &OptOutFeedbackRow) -> Result<(), SinkError> {
        self.inner.insert_opt_out_feedback(row).await
    }

    async fn mark_inactive(&self, owner: Uuid) -> Result<(), SinkError> {
        self.inner.mark_inactive(owner).await
    }

    async fn delete_user_data(&self, owner: Uuid) -> Result<(), SinkError> {
        self.inner.delete_user_data(owner).await
    }
}

pub struct ParticipantService<S> {
    owner: Uuid,
    gate: ParticipantGate,
    sink: S,
    app_build: Option<String>,
}

impl<S: RemoteSink> ParticipantService<S> {
    pub fn new(owner: Uuid, gate: ParticipantGate, sink: S) -> Self {
        Self {
            owner,
            gate,
            sink,
            app_build: None,
        }
    }

    /// Stamp submitted feedback with the app build that collected it.
    pub fn with_app_build(mut self, build: impl Into<String>) -> Self {
        self.app_build = Some(build.into());
        self
    }

    /// Enroll or re-enroll the participant under their study code.
    pub async fn register(&self, study_code: &str) -> Result<(), SinkError> {
        let row = ParticipantRow {
            user_id: self.owner,
            study_code: study_code.to_string(),
            is_active: true,
        };
        self.sink.upsert_participant(&row).await
    }

    /// Withdraw from the study. Flips the gate first so no further uploads
    /// race past it, then either purges every row or marks the participant
    /// inactive server-side.
    pub async fn opt_out(&self, delete_data: bool) -> Result<(), SinkError> {
        self.gate.set_active(false);
        if delete_data {
            self.sink.delete_user_data(self.owner).await
        } else {
            self.sink.mark_inactive(self.owner).await
        }
    }

    /// Record why the participant left. Blank reasons are dropped without a
    /// network call. The row carries no user id, so it survives a full data
    /// purge.
    pub async fn submit_feedback(
        &self,
        reason: &str,
        delete_requested: bool,
    ) -> Result<(), SinkError> {
        let trimmed = reason.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let row = OptOutFeedbackRow {
            reason: trimmed.to_string(),
            delete_requested,
            app_build: self.app_build.clone(),
        };
        self.sink.insert_opt_out_feedback(&row).await
    }
}

#[cfg(test)]
mod participant_tests {
    use super::*;
    use crate::adapters::in_memory::recording_sink::RecordingSink;
    use rstest::rstest;

    fn sample_row(owner: Uuid) -> UploadRow {
        UploadRow {
            user_id: owner,
            sample_uuid: Uuid::new_v4(),
            start_time: "2026-08-30T22:00:00.000Z".to_string(),
            end_time: "2026-08-31T06:00:00.000Z".to_string(),
            state: "asleep".to_string(),
            source_bundle_id: None,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_suppress_uploads_for_an_inactive_participant() {
        let owner = Uuid::new_v4();
        let sink = RecordingSink::new();
        let gated = GatedSink::new(ParticipantGate::new(false), sink.clone());

        gated
            .upsert_samples(&[sample_row(owner)])
            .await
            .expect("suppressed call still succeeds");
        gated
            .upsert_streak(&StreakRow::new(owner, vec![]))
            .await
            .expect("suppressed call still succeeds");

        assert!(sink.upsert_batches().is_empty());
        assert!(sink.streak(owner).is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_pass_uploads_through_for_an_active_participant() {
        let owner = Uuid::new_v4();
        let sink = RecordingSink::new();
        let gated = GatedSink::new(ParticipantGate::new(true), sink.clone());

        gated.upsert_samples(&[sample_row(owner)]).await.expect("upsert");
        assert_eq!(sink.upsert_batches().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_let_an_inactive_participant_complete_an_opt_out() {
        let owner = Uuid::new_v4();
        let sink = RecordingSink::new();
        let gate = ParticipantGate::new(true);
        let gated = GatedSink::new(gate.clone(), sink.clone());
        let service = ParticipantService::new(owner, gate.clone(), gated);

        service.opt_out(true).await.expect("opt-out with deletion");

        assert!(!gate.is_active());
        assert_eq!(sink.deleted_users(), vec![owner]);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_mark_inactive_when_data_is_kept() {
        let owner = Uuid::new_v4();
        let sink = RecordingSink::new();
        let gate = ParticipantGate::new(true);
        let service = ParticipantService::new(owner, gate.clone(), sink.clone());

        service.opt_out(false).await.expect("opt-out keeping data");

        assert!(!gate.is_active());
        assert_eq!(sink.marked_inactive(), vec![owner]);
        assert!(sink.deleted_users().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_record_trimmed_opt_out_feedback() {
        let sink = RecordingSink::new();
        let service =
            ParticipantService::new(Uuid::new_v4(), ParticipantGate::new(false), sink.clone())
                .with_app_build("142");

        service
            .submit_feedback("  too many reminders \n", true)
            .await
            .expect("feedback");

        let rows = sink.opt_out_feedback();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason, "too many reminders");
        assert!(rows[0].delete_requested);
        assert_eq!(rows[0].app_build.as_deref(), Some("142"));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_drop_blank_opt_out_feedback() {
        let sink = RecordingSink::new();
        let service =
            ParticipantService::new(Uuid::new_v4(), ParticipantGate::new(true), sink.clone());

        service.submit_feedback("   \n", false).await.expect("no-op");

        assert!(sink.opt_out_feedback().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_let_an_inactive_participant_submit_feedback() {
        let sink = RecordingSink::new();
        let gate = ParticipantGate::new(false);
        let gated = GatedSink::new(gate.clone(), sink.clone());
        let service = ParticipantService::new(Uuid::new_v4(), gate, gated);

        service
            .submit_feedback("switching phones", false)
            .await
            .expect("feedback");

        assert_eq!(sink.opt_out_feedback().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_register_the_participant_as_active() {
        let owner = Uuid::new_v4();
        let sink = RecordingSink::new();
        let service = ParticipantService::new(owner, ParticipantGate::new(true), sink.clone());

        service.register("SONA-1234").await.expect("register");

        let row = sink.participant(owner).expect("participant row");
        assert_eq!(row.study_code, "SONA-1234");
        assert!(row.is_active);
    }
}
