// REST implementation of the RemoteSink port.
//
// Purpose
// - Talk to the hosted row store over its PostgREST-style HTTP surface:
//   batch upserts with a server-side conflict key, filtered updates and
//   deletes, and object storage for media bytes. The backend's schema stays
//   opaque; this adapter only knows table names and conflict keys.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::core::ports::{RemoteSink, SinkError};
use crate::core::rows::{MediaRow, OptOutFeedbackRow, ParticipantRow, StreakRow, UploadRow};

use super::config::RestSinkConfig;

const SAMPLES_TABLE: &str = "sleep_samples";
const PARTICIPANTS_TABLE: &str = "participants";
const STREAKS_TABLE: &str = "user_streaks";
const MEDIA_TABLE: &str = "media_uploads";
const FEEDBACK_TABLE: &str = "opt_out_feedback";

const SAMPLES_CONFLICT_KEY: &str = "user_id,sample_uuid";
const USER_CONFLICT_KEY: &str = "user_id";

/// The storage API caps how many objects one bulk delete may name.
const STORAGE_DELETE_CHUNK: usize = 100;

/// Projection row for `media_uploads?select=storage_path`.
#[derive(Deserialize)]
struct MediaPathRow {
    storage_path: String,
}

#[derive(Clone)]
pub struct RestSink {
    client: Client,
    config: RestSinkConfig,
}

impl RestSink {
    pub fn new(config: RestSinkConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.base_url.trim_end_matches('/'))
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{path}", self.bucket_url())
    }

    fn bucket_url(&self) -> String {
        format!(
            "{}/storage/v1/object/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.storage_bucket
        )
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    /// Whole-batch upsert: the server resolves conflicts on `conflict_key`,
    /// so redelivery merges instead of duplicating.
    async fn upsert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        conflict_key: &str,
        body: &T,
    ) -> Result<(), SinkError> {
        let request = self
            .authed(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(body);
        check(request.send().await).await
    }

    async fn delete_rows(&self, table: &str, owner: Uuid) -> Result<(), SinkError> {
        let request = self
            .authed(self.client.delete(self.table_url(table)))
            .query(&[("user_id", format!("eq.{owner}"))]);
        check(request.send().await).await
    }

    async fn fetch_media_paths(&self, owner: Uuid) -> Result<Vec<String>, SinkError> {
        let request = self.authed(self.client.get(self.table_url(MEDIA_TABLE))).query(&[
            ("select", "storage_path".to_string()),
            ("user_id", format!("eq.{owner}")),
        ]);
        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let rows: Vec<MediaPathRow> = response
            .json()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(rows.into_iter().map(|row| row.storage_path).collect())
    }

    async fn delete_storage_objects(&self, paths: &[String]) -> Result<(), SinkError> {
        for chunk in paths.chunks(STORAGE_DELETE_CHUNK) {
            let request = self
                .authed(self.client.delete(self.bucket_url()))
                .json(&serde_json::json!({ "prefixes": chunk }));
            check(request.send().await).await?;
        }
        Ok(())
    }
}

async fn check(result: Result<Response, reqwest::Error>) -> Result<(), SinkError> {
    let response = result.map_err(|e| SinkError::Transport(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteSink for RestSink {
    async fn upsert_samples(&self, rows: &[UploadRow]) -> Result<(), SinkError> {
        // No network call for an empty batch; background wakes are frequent
        // and usually carry nothing.
        if rows.is_empty() {
            return Ok(());
        }
        self.upsert(SAMPLES_TABLE, SAMPLES_CONFLICT_KEY, rows).await
    }

    async fn upsert_participant(&self, row: &ParticipantRow) -> Result<(), SinkError> {
        self.upsert(PARTICIPANTS_TABLE, USER_CONFLICT_KEY, row).await
    }

    async fn upsert_streak(&self, row: &StreakRow) -> Result<(), SinkError> {
        self.upsert(STREAKS_TABLE, USER_CONFLICT_KEY, row).await
    }

    async fn insert_media(&self, row: &MediaRow) -> Result<(), SinkError> {
        let request = self
            .authed(self.client.post(self.table_url(MEDIA_TABLE)))
            .header("Prefer", "return=minimal")
            .json(row);
        check(request.send().await).await
    }

    async fn insert_opt_out_feedback(&self, row: &OptOutFeedbackRow) -> Result<(), SinkError> {
        let request = self
            .authed(self.client.post(self.table_url(FEEDBACK_TABLE)))
            .header("Prefer", "return=minimal")
            .json(row);
        check(request.send().await).await
    }

    async fn store_object(&self, path: &str, bytes: &[u8], mime: &str) -> Result<(), SinkError> {
        let request = self
            .authed(self.client.post(self.object_url(path)))
            .header("Content-Type", mime)
            .body(bytes.to_vec());
        check(request.send().await).await
    }

    async fn mark_inactive(&self, owner: Uuid) -> Result<(), SinkError> {
        let request = self
            .authed(self.client.patch(self.table_url(PARTICIPANTS_TABLE)))
            .query(&[("user_id", format!("eq.{owner}"))])
            .json(&serde_json::json!({ "is_active": false }));
        check(request.send().await).await
    }

    async fn delete_user_data(&self, owner: Uuid) -> Result<(), SinkError> {
        // Storage objects first: once the media rows are gone nothing records
        // which paths belonged to the user.
        let paths = self.fetch_media_paths(owner).await?;
        if !paths.is_empty() {
            self.delete_storage_objects(&paths).await?;
        }
        // Participants last, so a failed purge leaves the row that marks the
        // user as known and the purge can be retried.
        self.delete_rows(MEDIA_TABLE, owner).await?;
        self.delete_rows(STREAKS_TABLE, owner).await?;
        self.delete_rows(SAMPLES_TABLE, owner).await?;
        self.delete_rows(PARTICIPANTS_TABLE, owner).await
    }
}
