//! Durable copies of the tracker catalog and the submitted-URL history.
//!
//! Both documents are versioned JSON written through a temp file and an
//! atomic rename. A version mismatch is refused, never migrated.

use crate::model::{RunId, TrackedRun};
use crate::tracker::{Tracker, TrackerSnapshot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

pub const STATE_VERSION: u32 = 1;
pub const HISTORY_VERSION: u32 = 1;
pub const MAX_HISTORY: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported version {found} in {} (expected {expected})", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    active: Vec<TrackedRun>,
    active_order: Vec<RunId>,
    archived: Vec<TrackedRun>,
    archived_order: Vec<RunId>,
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    version: u32,
    commands: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
}

/// Only the `version` field, read before the full document so a newer
/// schema is reported as a version problem rather than a parse error.
#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Persists the tracker catalog at an explicit path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, tracker: &Tracker) -> Result<(), StorageError> {
        let TrackerSnapshot {
            active,
            active_order,
            archived,
            archived_order,
        } = tracker.export_state();
        let doc = StateDocument {
            version: STATE_VERSION,
            active,
            active_order,
            archived,
            archived_order,
            saved_at: OffsetDateTime::now_utc(),
        };
        let payload = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.path, &payload)?;
        tracing::debug!(
            path = %self.path.display(),
            active = tracker.len_active(),
            archived = tracker.len_archived(),
            "saved tracker state"
        );
        Ok(())
    }

    /// Read the persisted snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<TrackerSnapshot>, StorageError> {
        let Some(data) = read_optional(&self.path)? else {
            return Ok(None);
        };
        let doc: StateDocument = decode_versioned(&self.path, &data, STATE_VERSION)?;
        Ok(Some(TrackerSnapshot {
            active: doc.active,
            active_order: doc.active_order,
            archived: doc.archived,
            archived_order: doc.archived_order,
        }))
    }

    /// Load into `tracker`. On any error the tracker is left untouched.
    pub fn restore_into(&self, tracker: &mut Tracker) -> Result<bool, StorageError> {
        match self.load()? {
            Some(snapshot) => {
                tracker.import_state(snapshot);
                tracing::info!(
                    path = %self.path.display(),
                    active = tracker.len_active(),
                    archived = tracker.len_archived(),
                    "restored tracker state"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move an unreadable state file to `<name>.bak` so the next save does
    /// not overwrite it. Returns the backup path.
    pub fn set_aside(&self) -> Result<PathBuf, StorageError> {
        let backup = match self.path.file_name() {
            Some(name) => self
                .path
                .with_file_name(format!("{}.bak", name.to_string_lossy())),
            None => self.path.with_extension("bak"),
        };
        std::fs::rename(&self.path, &backup).map_err(|source| StorageError::Io {
            action: "back up",
            path: self.path.clone(),
            source,
        })?;
        tracing::warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            "moved unreadable state aside"
        );
        Ok(backup)
    }
}

/// Persists the list of URLs the user has submitted, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, commands: &[String]) -> Result<(), StorageError> {
        let start = commands.len().saturating_sub(MAX_HISTORY);
        let doc = HistoryDocument {
            version: HISTORY_VERSION,
            commands: commands[start..].to_vec(),
            saved_at: OffsetDateTime::now_utc(),
        };
        let payload = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.path, &payload)
    }

    pub fn load(&self) -> Result<Vec<String>, StorageError> {
        let Some(data) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        let doc: HistoryDocument = decode_versioned(&self.path, &data, HISTORY_VERSION)?;
        Ok(doc.commands)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Io {
            action: "read",
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn decode_versioned<T: serde::de::DeserializeOwned>(
    path: &Path,
    data: &[u8],
    expected: u32,
) -> Result<T, StorageError> {
    let corrupt = |source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    };
    let probe: VersionProbe = serde_json::from_slice(data).map_err(corrupt)?;
    if probe.version != expected {
        return Err(StorageError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: probe.version,
            expected,
        });
    }
    serde_json::from_slice(data).map_err(corrupt)
}

/// Write `payload` next to `path` and rename it into place.
fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            action: "create directory",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    std::fs::write(&temp_path, payload).map_err(|source| StorageError::Io {
        action: "write",
        path: temp_path.clone(),
        source,
    })?;
    if let Err(source) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(StorageError::Io {
            action: "replace",
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
