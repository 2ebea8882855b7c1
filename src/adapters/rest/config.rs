// Configuration for the REST sink adapter.
//
// Purpose
// - Load the hosted backend's URL and key from the environment. Returns
//   `Ok(None)` when the backend simply is not configured (local development
//   without a sink), and errs only on a half-configured setup so
//   misconfiguration fails fast.

#[derive(Debug, Clone)]
pub struct RestSinkConfig {
    pub base_url: String,
    pub api_key: String,
    pub storage_bucket: String,
    pub timeout_secs: u64,
}

impl RestSinkConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            storage_bucket: "user-uploads".to_string(),
            timeout_secs: 30,
        }
    }

    /// Reads `SLEEP_SYNC_BASE_URL`, `SLEEP_SYNC_API_KEY`, and the optional
    /// `SLEEP_SYNC_STORAGE_BUCKET` / `SLEEP_SYNC_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Option<Self>, String> {
        let base_url = match std::env::var("SLEEP_SYNC_BASE_URL").ok() {
            Some(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };
        let api_key = std::env::var("SLEEP_SYNC_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or("SLEEP_SYNC_API_KEY is required when SLEEP_SYNC_BASE_URL is set")?;

        let mut config = Self::new(base_url, api_key);
        if let Some(bucket) = std::env::var("SLEEP_SYNC_STORAGE_BUCKET")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            config.storage_bucket = bucket;
        }
        if let Some(timeout) = std::env::var("SLEEP_SYNC_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_secs = timeout;
        }
        Ok(Some(config))
    }
}
