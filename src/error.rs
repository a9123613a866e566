//! Error types for git-profile.
//!
//! Every failure the core can produce is a [`ProfileError`]. Command handlers
//! wrap these in `anyhow` for context, and `main` downcasts back to pick the
//! process exit status.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Error, Debug)]
pub enum ProfileError {
    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------
    #[error("Storage unavailable at '{path}': {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Activation record '{path}' is corrupt: {reason}")]
    StateCorrupt { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // Profiles
    // -------------------------------------------------------------------------
    #[error("Profile '{name}' not found (expected file: {path})")]
    ProfileNotFound { name: String, path: PathBuf },

    #[error("Profile '{name}' already exists at {path}")]
    ProfileAlreadyExists { name: String, path: PathBuf },

    #[error("Profile file '{path}' is corrupt (line {line}): {reason}")]
    ProfileCorrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(
        "Invalid profile name '{name}': only letters, digits, '-' and '_' are allowed (1-64 characters)"
    )]
    InvalidProfileName { name: String },

    #[error("Invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    // -------------------------------------------------------------------------
    // Git configuration backend
    // -------------------------------------------------------------------------
    #[error("Git configuration backend unavailable: {0}")]
    ConfigBackendUnavailable(String),

    #[error(
        "Profile '{profile}' was only partially applied: applied [{}], not applied [{}]: {reason}",
        .applied.join(", "),
        .pending.join(", ")
    )]
    PartialApply {
        profile: String,
        applied: Vec<String>,
        pending: Vec<String>,
        reason: String,
    },
}

impl ProfileError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error kind.
    ///
    /// 2 is left to clap for usage errors and 1 for everything that is not a
    /// `ProfileError`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StorageUnavailable { .. } => 3,
            Self::ProfileNotFound { .. } => 4,
            Self::ProfileAlreadyExists { .. } => 5,
            Self::ProfileCorrupt { .. } => 6,
            Self::ConfigBackendUnavailable(_) => 7,
            Self::PartialApply { .. } => 8,
            Self::InvalidProfileName { .. } | Self::InvalidProfile { .. } => 9,
            Self::StateCorrupt { .. } => 10,
        }
    }
}
