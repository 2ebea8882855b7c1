// Wire row shapes sent to the remote row store.
//
// Purpose
// - Map domain records to the exact rows the remote sink upserts. Timestamps
//   are ISO-8601 UTC strings with fractional seconds so rows are unambiguous
//   regardless of the device's locale or timezone.
//
// Boundaries
// - Row structs are plain serde DTOs; no network code here.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::record::{SleepStage, SourceRecord};

fn iso_utc(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Row shape for the sleep-sample table.
///
/// The sink resolves conflicts on `(user_id, sample_uuid)`, so redelivering
/// the same record is a no-op rather than a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRow {
    pub user_id: Uuid,
    pub sample_uuid: Uuid,
    pub start_time: String,
    pub end_time: String,
    pub state: String,
    pub source_bundle_id: Option<String>,
}

impl UploadRow {
    pub fn from_record(owner: Uuid, record: &SourceRecord) -> Self {
        Self {
            user_id: owner,
            sample_uuid: record.uuid,
            start_time: iso_utc(record.start_time),
            end_time: iso_utc(record.end_time),
            state: SleepStage::from_raw(record.raw_stage).as_str().to_string(),
            source_bundle_id: record.source_bundle_id.clone(),
        }
    }
}

/// Row shape for the participants table, conflict key `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantRow {
    pub user_id: Uuid,
    pub study_code: String,
    pub is_active: bool,
}

/// Row shape for the streak table, conflict key `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRow {
    pub user_id: Uuid,
    /// Sorted `yyyy-mm-dd` day keys of completed study days.
    pub streak_days: Vec<String>,
    pub updated_at: String,
}

impl StreakRow {
    pub fn new(user_id: Uuid, streak_days: Vec<String>) -> Self {
        Self {
            user_id,
            streak_days,
            updated_at: iso_utc(Utc::now()),
        }
    }
}

/// Row shape for the media-uploads table. Insert-only; one row per uploaded
/// object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRow {
    pub user_id: Uuid,
    pub storage_path: String,
    pub mime_type: Option<String>,
    pub bytes: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub duration_seconds: Option<f64>,
}

/// Row shape for the opt-out feedback table. Insert-only and deliberately
/// carries no user id, so the feedback survives a full data purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptOutFeedbackRow {
    pub reason: String,
    pub delete_requested: bool,
    pub app_build: Option<String>,
}
