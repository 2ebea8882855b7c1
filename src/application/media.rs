// Media-submission recording.
//
// Purpose
// - Push submitted media bytes to object storage under a per-user path and
//   record one row per object. Videos above the size cap are rejected up
//   front with a human-readable message rather than shipped and bounced.

use thiserror::Error;
use uuid::Uuid;

use crate::core::ports::{RemoteSink, SinkError};
use crate::core::rows::MediaRow;

pub const MAX_VIDEO_UPLOAD_BYTES: usize = 80 * 1024 * 1024;

fn human_mb(bytes: usize) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("this video is too large ({}); maximum is {}", human_mb(*.bytes), human_mb(*.max))]
    VideoTooLarge { bytes: usize, max: usize },

    #[error("media could not be read")]
    EmptyMedia,

    #[error("media upload failed: {0}")]
    Upload(String),
}

impl From<SinkError> for MediaError {
    fn from(err: SinkError) -> Self {
        MediaError::Upload(err.to_string())
    }
}

/// Optional pixel dimensions and duration probed by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaDimensions {
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub duration_seconds: Option<f64>,
}

pub struct MediaService<S> {
    owner: Uuid,
    sink: S,
}

impl<S: RemoteSink> MediaService<S> {
    pub fn new(owner: Uuid, sink: S) -> Self {
        Self { owner, sink }
    }

    /// Store image bytes and record the row. Returns the storage path.
    pub async fn record_image(
        &self,
        bytes: &[u8],
        ext: &str,
        mime: &str,
        dimensions: MediaDimensions,
    ) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::EmptyMedia);
        }
        self.store_and_record("photos", bytes, ext, mime, dimensions)
            .await
    }

    /// Store video bytes and record the row, enforcing the size cap.
    pub async fn record_video(
        &self,
        bytes: &[u8],
        ext: &str,
        mime: &str,
        dimensions: MediaDimensions,
    ) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::EmptyMedia);
        }
        if bytes.len() > MAX_VIDEO_UPLOAD_BYTES {
            return Err(MediaError::VideoTooLarge {
                bytes: bytes.len(),
                max: MAX_VIDEO_UPLOAD_BYTES,
            });
        }
        let ext = if ext.is_empty() { "mov" } else { ext };
        self.store_and_record("videos", bytes, ext, mime, dimensions)
            .await
    }

    async fn store_and_record(
        &self,
        kind: &str,
        bytes: &[u8],
        ext: &str,
        mime: &str,
        dimensions: MediaDimensions,
    ) -> Result<String, MediaError> {
        let path = format!(
            "{}/{kind}/{}.{}",
            self.owner.to_string().to_lowercase(),
            Uuid::new_v4(),
            ext.to_lowercase()
        );
        self.sink.store_object(&path, bytes, mime).await?;

        let row = MediaRow {
            user_id: self.owner,
            storage_path: path.clone(),
            mime_type: Some(mime.to_string()),
            bytes: Some(bytes.len() as i64),
            width: dimensions.width,
            height: dimensions.height,
            duration_seconds: dimensions.duration_seconds,
        };
        self.sink.insert_media(&row).await?;
        tracing::info!(path = %path, bytes = bytes.len(), "recorded media upload");
        Ok(path)
    }
}

#[cfg(test)]
mod media_tests {
    use super::*;
    use crate::adapters::in_memory::recording_sink::RecordingSink;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn it_should_store_the_object_and_record_one_row() {
        let sink = RecordingSink::new();
        let owner = Uuid::new_v4();
        let service = MediaService::new(owner, sink.clone());

        let path = service
            .record_image(&[1, 2, 3], "jpg", "image/jpeg", MediaDimensions::default())
            .await
            .expect("image should record");

        assert!(path.starts_with(&owner.to_string().to_lowercase()));
        assert!(path.contains("/photos/"));
        assert!(path.ends_with(".jpg"));

        let objects = sink.stored_objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].0, path);
        assert_eq!(objects[0].1, 3);
        assert_eq!(objects[0].2, "image/jpeg");

        let rows = sink.media_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].storage_path, path);
        assert_eq!(rows[0].bytes, Some(3));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_oversized_videos_with_a_readable_message() {
        let sink = RecordingSink::new();
        let service = MediaService::new(Uuid::new_v4(), sink.clone());
        let oversized = vec![0u8; MAX_VIDEO_UPLOAD_BYTES + 1];

        let err = service
            .record_video(&oversized, "mov", "video/quicktime", MediaDimensions::default())
            .await
            .expect_err("must reject");

        assert!(matches!(err, MediaError::VideoTooLarge { .. }));
        assert!(err.to_string().contains("80.0 MB"));
        assert!(sink.stored_objects().is_empty(), "nothing shipped");
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_default_the_video_extension_when_missing() {
        let sink = RecordingSink::new();
        let service = MediaService::new(Uuid::new_v4(), sink.clone());

        let path = service
            .record_video(&[9; 16], "", "video/quicktime", MediaDimensions::default())
            .await
            .expect("video should record");

        assert!(path.contains("/videos/"));
        assert!(path.ends_with(".mov"));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_empty_media() {
        let sink = RecordingSink::new();
        let service = MediaService::new(Uuid::new_v4(), sink);

        let err = service
            .record_image(&[], "png", "image/png", MediaDimensions::default())
            .await
            .expect_err("empty bytes");
        assert!(matches!(err, MediaError::EmptyMedia));
    }
}
