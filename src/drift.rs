//! Advisory drift detection.
//!
//! Compares the snapshot taken at activation time with what the global
//! configuration holds now. The result is informational only: it never
//! changes the activation record and never decides what is "current".

use crate::applier::{BackendError, ConfigBackend};
use crate::state::ActiveRecord;

/// A snapshot key whose live value no longer matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub key: String,
    pub recorded: String,
    /// `None` when the key has been removed from the global configuration
    pub live: Option<String>,
}

/// Re-read every snapshot key and report the ones that changed
pub fn detect(record: &ActiveRecord, backend: &dyn ConfigBackend) -> Result<Vec<Drift>, BackendError> {
    let mut drifted = Vec::new();

    for (key, recorded) in record.snapshot.iter() {
        let live = backend.get(key)?;
        if live.as_deref() != Some(recorded) {
            tracing::debug!(key, recorded, live = ?live, "drift detected");
            drifted.push(Drift {
                key: key.to_string(),
                recorded: recorded.to_string(),
                live,
            });
        }
    }

    Ok(drifted)
}
