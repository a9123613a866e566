//! Profile switching logic.
//!
//! `use <name>` is the composition of the three core components:
//! load the profile from the store, apply it to the global configuration,
//! then record the activation. The record is only written after a fully
//! successful apply, so a failed switch leaves "current" unchanged.

use crate::applier::{ConfigBackend, apply};
use crate::error::Result;
use crate::profiles::ProfileStore;
use crate::state::{ActivationTracker, ActiveRecord};

/// Switch to a specific profile
pub fn switch_to_profile(
    store: &ProfileStore,
    backend: &dyn ConfigBackend,
    tracker: &ActivationTracker,
    name: &str,
) -> Result<ActiveRecord> {
    // Nothing is created on disk for a profile that cannot be loaded
    store.load(name)?;
    let _lock = tracker.lock()?;

    // Re-read under the lock so the applied content is the latest
    let profile = store.load(name)?;
    let applied = apply(&profile, backend)?;
    let record = tracker.record_activation(&profile.name, &applied)?;

    tracing::info!(profile = name, keys = applied.len(), "switched profile");
    Ok(record)
}
