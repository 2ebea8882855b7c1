// File-backed implementations of the local single-slot stores.
//
// Purpose
// - Durable anchor slot and completed-day set for an installation. Writes go
//   to a temp file, are synced, then renamed over the slot so a crash cannot
//   leave a half-written slot behind.
//
// Failure semantics
// - Reads treat missing or corrupt content as "never synced" / empty, never
//   as an error. Writes log failures instead of propagating them; a lost
//   anchor save only widens the next fetch, which upsert idempotency absorbs.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::application::streak::CompletionStore;
use crate::core::ports::AnchorStore;
use crate::core::record::ChangeAnchor;

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

/// Single base64-encoded anchor slot in a file.
#[derive(Clone)]
pub struct FileAnchorStore {
    path: PathBuf,
}

impl FileAnchorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AnchorStore for FileAnchorStore {
    fn load(&self) -> Option<ChangeAnchor> {
        let contents = fs::read_to_string(&self.path).ok()?;
        let anchor = ChangeAnchor::from_base64(&contents);
        if anchor.is_none() {
            tracing::warn!(path = %self.path.display(), "corrupt anchor slot, treating as never synced");
        }
        anchor
    }

    fn save(&self, anchor: &ChangeAnchor) {
        if let Err(err) = write_atomic(&self.path, &anchor.to_base64()) {
            tracing::warn!(error = %err, path = %self.path.display(), "anchor save failed");
        }
    }
}

/// Completed-day set as a JSON string array in a file.
#[derive(Clone)]
pub struct FileCompletionStore {
    path: PathBuf,
}

impl FileCompletionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CompletionStore for FileCompletionStore {
    fn load(&self) -> BTreeSet<String> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return BTreeSet::new();
        };
        match serde_json::from_str(&contents) {
            Ok(days) => days,
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "corrupt day set, starting empty");
                BTreeSet::new()
            }
        }
    }

    fn save(&self, days: &BTreeSet<String>) {
        let json = match serde_json::to_string(days) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "day set serialization failed");
                return;
            }
        };
        if let Err(err) = write_atomic(&self.path, &json) {
            tracing::warn!(error = %err, path = %self.path.display(), "day set save failed");
        }
    }
}
