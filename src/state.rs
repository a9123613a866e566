//! The activation record: which profile was last applied, and when.
//!
//! The record lives next to (never inside) the global configuration, so it
//! cannot collide with keys that users or other tools set. It is a historical
//! claim about the last successful `use`, not a live guarantee.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ProfileError, Result};
use crate::fs_utils::{atomic_write, ensure_dir};
use crate::gitconfig::Settings;
use crate::profiles::ProfileStore;

/// Contents of `active.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRecord {
    /// Name of the last successfully activated profile
    pub name: String,
    /// When the activation completed
    pub activated_at: DateTime<Utc>,
    /// The settings that were applied, in application order
    pub snapshot: Settings,
}

impl ActiveRecord {
    pub fn user_name(&self) -> Option<&str> {
        self.snapshot.get("user.name")
    }

    pub fn user_email(&self) -> Option<&str> {
        self.snapshot.get("user.email")
    }
}

/// Outcome of [`ActivationTracker::current`]. Both variants are successes.
#[derive(Debug, Clone, PartialEq)]
pub enum Current {
    /// Nothing has been activated through this tool yet
    Unset,
    Active {
        record: ActiveRecord,
        /// The recorded profile no longer exists in the store
        stale_profile_reference: bool,
    },
}

/// Owner of the activation record
#[derive(Debug, Clone)]
pub struct ActivationTracker {
    record_path: PathBuf,
    lock_path: PathBuf,
}

impl ActivationTracker {
    pub fn new(record_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            record_path: record_path.into(),
            lock_path: lock_path.into(),
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Take the cross-process activation lock.
    ///
    /// Held for the whole of a `use` so concurrent activations run one after
    /// the other. Released on drop.
    pub fn lock(&self) -> Result<ActivationLock> {
        ActivationLock::acquire(&self.lock_path)
    }

    /// Replace the record with `name` and a snapshot of `applied`.
    pub fn record_activation(&self, name: &str, applied: &Settings) -> Result<ActiveRecord> {
        let record = ActiveRecord {
            name: name.to_string(),
            activated_at: Utc::now(),
            snapshot: applied.clone(),
        };

        if let Some(parent) = self.record_path.parent() {
            ensure_dir(parent).map_err(|e| ProfileError::storage(parent, e))?;
        }

        let content = serde_json::to_string_pretty(&record).map_err(|e| {
            ProfileError::storage(&self.record_path, io::Error::other(e))
        })?;
        atomic_write(&self.record_path, content.as_bytes())
            .map_err(|e| ProfileError::storage(&self.record_path, e))?;

        tracing::info!(profile = name, "recorded activation");
        Ok(record)
    }

    /// Read the raw record, `None` if nothing was ever activated
    pub fn read_record(&self) -> Result<Option<ActiveRecord>> {
        let content = match fs::read_to_string(&self.record_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProfileError::storage(&self.record_path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ProfileError::StateCorrupt {
                path: self.record_path.clone(),
                reason: e.to_string(),
            })
    }

    /// What is currently active according to the last successful `use`.
    ///
    /// Never consults the live global configuration. A record whose profile
    /// has since been deleted is still returned, flagged as stale.
    pub fn current(&self, store: &ProfileStore) -> Result<Current> {
        let Some(record) = self.read_record()? else {
            return Ok(Current::Unset);
        };

        let stale_profile_reference = !store.exists(&record.name);
        if stale_profile_reference {
            tracing::warn!(profile = %record.name, "active profile no longer exists in store");
        }

        Ok(Current::Active {
            record,
            stale_profile_reference,
        })
    }
}

/// Exclusive lock on `active.lock`
pub struct ActivationLock {
    file: File,
}

impl ActivationLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent).map_err(|e| ProfileError::storage(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ProfileError::storage(path, e))?;

        // Blocks until any other activation finishes
        file.lock_exclusive()
            .map_err(|e| ProfileError::storage(path, e))?;

        Ok(Self { file })
    }
}

impl Drop for ActivationLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
