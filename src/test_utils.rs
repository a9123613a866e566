//! Test utilities shared across test modules

use crate::paths::Paths;
use tempfile::TempDir;

/// Create a Paths struct for testing using a temporary directory
///
/// Mirrors the real layout: profiles under a config home, the activation
/// record under a state home.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths::from_dirs(
        temp_dir.path().join(".config/git-profiles"),
        temp_dir.path().join(".local/state/git-profile"),
        temp_dir.path().join(".config/git-profile/config.toml"),
    )
}
