// In memory implementation of the RemoteSink port.
//
// Purpose
// - Record every call so tests can assert batch shapes, and keep upserted
//   rows keyed the way the real sink resolves conflicts, so idempotency is
//   observable (redelivery leaves one row, with the latest values).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::ports::{RemoteSink, SinkError};
use crate::core::rows::{MediaRow, OptOutFeedbackRow, ParticipantRow, StreakRow, UploadRow};

#[derive(Clone)]
pub struct RecordingSink {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    fail_uploads: AtomicBool,
    upsert_batches: Mutex<Vec<Vec<UploadRow>>>,
    samples: Mutex<HashMap<(Uuid, Uuid), UploadRow>>,
    participants: Mutex<HashMap<Uuid, ParticipantRow>>,
    streaks: Mutex<HashMap<Uuid, StreakRow>>,
    media: Mutex<Vec<MediaRow>>,
    objects: Mutex<Vec<(String, usize, String)>>,
    feedback: Mutex<Vec<OptOutFeedbackRow>>,
    inactive: Mutex<Vec<Uuid>>,
    deleted: Mutex<Vec<Uuid>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// When true, every write call fails with a transport error.
    pub fn fail_uploads(&self, fail: bool) {
        self.inner.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn upsert_batches(&self) -> Vec<Vec<UploadRow>> {
        self.inner.upsert_batches.lock().expect("sink poisoned").clone()
    }

    /// Rows currently held after conflict resolution on (user_id, sample_uuid).
    pub fn stored_row_count(&self) -> usize {
        self.inner.samples.lock().expect("sink poisoned").len()
    }

    pub fn stored_row(&self, user_id: Uuid, sample_uuid: Uuid) -> Option<UploadRow> {
        self.inner
            .samples
            .lock()
            .expect("sink poisoned")
            .get(&(user_id, sample_uuid))
            .cloned()
    }

    pub fn participant(&self, user_id: Uuid) -> Option<ParticipantRow> {
        self.inner
            .participants
            .lock()
            .expect("sink poisoned")
            .get(&user_id)
            .cloned()
    }

    pub fn streak(&self, user_id: Uuid) -> Option<StreakRow> {
        self.inner
            .streaks
            .lock()
            .expect("sink poisoned")
            .get(&user_id)
            .cloned()
    }

    pub fn media_rows(&self) -> Vec<MediaRow> {
        self.inner.media.lock().expect("sink poisoned").clone()
    }

    /// Stored objects as (path, byte length, mime).
    pub fn stored_objects(&self) -> Vec<(String, usize, String)> {
        self.inner.objects.lock().expect("sink poisoned").clone()
    }

    pub fn opt_out_feedback(&self) -> Vec<OptOutFeedbackRow> {
        self.inner.feedback.lock().expect("sink poisoned").clone()
    }

    pub fn marked_inactive(&self) -> Vec<Uuid> {
        self.inner.inactive.lock().expect("sink poisoned").clone()
    }

    pub fn deleted_users(&self) -> Vec<Uuid> {
        self.inner.deleted.lock().expect("sink poisoned").clone()
    }

    fn check_failure(&self) -> Result<(), SinkError> {
        if self.inner.fail_uploads.load(Ordering::SeqCst) {
            Err(SinkError::Transport("scripted sink failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSink for RecordingSink {
    async fn upsert_samples(&self, rows: &[UploadRow]) -> Result<(), SinkError> {
        self.check_failure()?;
        self.inner
            .upsert_batches
            .lock()
            .expect("sink poisoned")
            .push(rows.to_vec());
        let mut samples = self.inner.samples.lock().expect("sink poisoned");
        for row in rows {
            samples.insert((row.user_id, row.sample_uuid), row.clone());
        }
        Ok(())
    }

    async fn upsert_participant(&self, row: &ParticipantRow) -> Result<(), SinkError> {
        self.check_failure()?;
        self.inner
            .participants
            .lock()
            .expect("sink poisoned")
            .insert(row.user_id, row.clone());
        Ok(())
    }

    async fn upsert_streak(&self, row: &StreakRow) -> Result<(), SinkError> {
        self.check_failure()?;
        self.inner
            .streaks
            .lock()
            .expect("sink poisoned")
            .insert(row.user_id, row.clone());
        Ok(())
    }

    async fn insert_media(&self, row: &MediaRow) -> Result<(), SinkError> {
        self.check_failure()?;
        self.inner.media.lock().expect("sink poisoned").push(row.clone());
        Ok(())
    }

    async fn store_object(&self, path: &str, bytes: &[u8], mime: &str) -> Result<(), SinkError> {
        self.check_failure()?;
        self.inner
            .objects
            .lock()
            .expect("sink poisoned")
            .push((path.to_string(), bytes.len(), mime.to_string()));
        Ok(())
    }

    async fn insert_opt_out_feedback(&self, row: &OptOutFeedbackRow) -> Result<(), SinkError> {
        self.check_failure()?;
        self.inner
            .feedback
            .lock()
            .expect("sink poisoned")
            .push(row.clone());
        Ok(())
    }

    async fn mark_inactive(&self, owner: Uuid) -> Result<(), SinkError> {
        self.check_failure()?;
        self.inner.inactive.lock().expect("sink poisoned").push(owner);
        Ok(())
    }

    async fn delete_user_data(&self, owner: Uuid) -> Result<(), SinkError> {
        self.check_failure()?;
        // Storage objects go with their media rows, mirroring the real sink's
        // purge order.
        let owned_paths: Vec<String> = {
            let mut media = self.inner.media.lock().expect("sink poisoned");
            let paths = media
                .iter()
                .filter(|row| row.user_id == owner)
                .map(|row| row.storage_path.clone())
                .collect();
            media.retain(|row| row.user_id != owner);
            paths
        };
        self.inner
            .objects
            .lock()
            .expect("sink poisoned")
            .retain(|(path, _, _)| !owned_paths.contains(path));
        self.inner.streaks.lock().expect("sink poisoned").remove(&owner);
        self.inner
            .samples
            .lock()
            .expect("sink poisoned")
            .retain(|(user, _), _| *user != owner);
        self.inner
            .participants
            .lock()
            .expect("sink poisoned")
            .remove(&owner);
        self.inner.deleted.lock().expect("sink poisoned").push(owner);
        Ok(())
    }
}
