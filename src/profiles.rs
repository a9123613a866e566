//! Core profile management logic.
//!
//! This module handles the "data model" of profiles:
//! - Validating profile names and required identity keys
//! - Listing available profiles
//! - Loading, saving and deleting profile files
//!
//! Profiles live as `<name>.gitconfig` files in a single directory and are
//! owned exclusively by [`ProfileStore`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ProfileError, Result};
use crate::fs_utils::{atomic_create, atomic_write, ensure_dir};
use crate::gitconfig::{self, Settings};
use crate::paths::PROFILE_EXTENSION;

/// Keys every profile must define
pub const REQUIRED_KEYS: [&str; 2] = ["user.name", "user.email"];

/// A named set of Git configuration values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub settings: Settings,
}

impl Profile {
    pub fn new(name: impl Into<String>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }

    pub fn user_name(&self) -> Option<&str> {
        self.settings.get("user.name")
    }

    pub fn user_email(&self) -> Option<&str> {
        self.settings.get("user.email")
    }

    /// Keys required for a usable identity that are absent or blank
    pub fn missing_required_keys(&self) -> Vec<&'static str> {
        REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| {
                self.settings
                    .get(key)
                    .is_none_or(|value| value.trim().is_empty())
            })
            .collect()
    }
}

/// Validate profile name
///
/// Only allows alphanumeric characters, underscores, and hyphens.
pub fn validate_profile_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().count() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if !valid {
        return Err(ProfileError::InvalidProfileName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Directory-backed store of profile files
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `name`
    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, PROFILE_EXTENSION))
    }

    /// Ensure the store directory exists. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        ensure_dir(&self.dir).map_err(|e| ProfileError::storage(&self.dir, e))?;
        tracing::debug!(dir = %self.dir.display(), "profile store ready");
        Ok(())
    }

    /// Names of all stored profiles, sorted lexicographically.
    ///
    /// A store directory that does not exist yet is treated as empty.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProfileError::storage(&self.dir, e)),
        };

        let mut profiles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProfileError::storage(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            // Stray files like `.gitconfig` or `my notes.gitconfig` are not profiles
            if validate_profile_name(name).is_ok() {
                profiles.push(name.to_string());
            }
        }
        profiles.sort();
        Ok(profiles)
    }

    /// Check if a profile exists
    pub fn exists(&self, name: &str) -> bool {
        validate_profile_name(name).is_ok() && self.profile_path(name).is_file()
    }

    /// Load and validate a profile
    pub fn load(&self, name: &str) -> Result<Profile> {
        validate_profile_name(name)?;
        let path = self.profile_path(name);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ProfileError::ProfileNotFound {
                    name: name.to_string(),
                    path,
                });
            }
            Err(e) => return Err(ProfileError::storage(&path, e)),
        };

        let text = String::from_utf8(bytes).map_err(|e| {
            let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
            let line = valid.iter().filter(|b| **b == b'\n').count() + 1;
            ProfileError::ProfileCorrupt {
                path: path.clone(),
                line,
                reason: "invalid UTF-8".to_string(),
            }
        })?;

        let settings = gitconfig::parse(&text).map_err(|e| ProfileError::ProfileCorrupt {
            path: path.clone(),
            line: e.line,
            reason: e.reason,
        })?;

        let profile = Profile::new(name, settings);
        let missing = profile.missing_required_keys();
        if !missing.is_empty() {
            return Err(ProfileError::ProfileCorrupt {
                path,
                line: text.lines().count().max(1),
                reason: format!("missing required key(s): {}", missing.join(", ")),
            });
        }

        tracing::debug!(profile = name, keys = profile.settings.len(), "loaded profile");
        Ok(profile)
    }

    /// Atomically write a profile.
    ///
    /// Fails with `ProfileAlreadyExists` if the file exists and `overwrite`
    /// is false; the existing file is left untouched in that case.
    pub fn save(&self, profile: &Profile, overwrite: bool) -> Result<PathBuf> {
        validate_profile_name(&profile.name)?;
        self.validate_settings(profile)?;

        let path = self.profile_path(&profile.name);
        if !overwrite && path.exists() {
            return Err(ProfileError::ProfileAlreadyExists {
                name: profile.name.clone(),
                path,
            });
        }

        self.initialize()?;
        let content = gitconfig::render(&profile.settings);
        let written = if overwrite {
            atomic_write(&path, content.as_bytes())
        } else {
            // Another writer may have created the file since the check above
            atomic_create(&path, content.as_bytes())
        };
        match written {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ProfileError::ProfileAlreadyExists {
                    name: profile.name.clone(),
                    path,
                });
            }
            Err(e) => return Err(ProfileError::storage(&path, e)),
        }

        tracing::info!(profile = %profile.name, path = %path.display(), overwrite, "saved profile");
        Ok(path)
    }

    /// Remove a profile file
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_profile_name(name)?;
        let path = self.profile_path(name);

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(profile = name, "deleted profile");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProfileError::ProfileNotFound {
                name: name.to_string(),
                path,
            }),
            Err(e) => Err(ProfileError::storage(&path, e)),
        }
    }

    fn validate_settings(&self, profile: &Profile) -> Result<()> {
        let invalid = |reason: String| ProfileError::InvalidProfile {
            name: profile.name.clone(),
            reason,
        };

        let missing = profile.missing_required_keys();
        if !missing.is_empty() {
            return Err(invalid(format!(
                "missing required key(s): {}",
                missing.join(", ")
            )));
        }

        for (key, value) in profile.settings.iter() {
            let normalized = gitconfig::normalize_key(key).map_err(invalid)?;
            if normalized != key {
                return Err(invalid(format!(
                    "key '{}' is not normalized (expected '{}')",
                    key, normalized
                )));
            }
            if value.contains('\0') {
                return Err(invalid(format!("value of '{}' contains a NUL byte", key)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(name: &str, email: &str) -> Settings {
        [("user.name", name), ("user.email", email)]
            .into_iter()
            .collect()
    }

    fn test_store(temp_dir: &TempDir) -> ProfileStore {
        ProfileStore::new(temp_dir.path().join("profiles"))
    }

    #[test]
    fn test_profile_name_validation() {
        assert!(validate_profile_name("work").is_ok());
        assert!(validate_profile_name("my-profile").is_ok());
        assert!(validate_profile_name("test_123").is_ok());

        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name("invalid name").is_err());
        assert!(validate_profile_name("test/profile").is_err());
        assert!(validate_profile_name("../escape").is_err());
        assert!(validate_profile_name("emoji😊").is_err());
        assert!(validate_profile_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        store.initialize().unwrap();
        store.initialize().unwrap();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_initialize_fails_when_parent_is_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let store = ProfileStore::new(blocker.join("profiles"));
        assert!(matches!(
            store.initialize(),
            Err(ProfileError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn test_list_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        assert!(store.list().unwrap().is_empty());
        store.initialize().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        store.initialize().unwrap();

        for name in ["work", "personal", "oss"] {
            store
                .save(&Profile::new(name, identity("Ann", "ann@x.com")), false)
                .unwrap();
        }
        fs::write(store.dir().join("notes.txt"), "x").unwrap();
        fs::write(store.dir().join("bad name.gitconfig"), "x").unwrap();
        fs::create_dir(store.dir().join("dir.gitconfig")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["oss", "personal", "work"]);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let mut settings = Settings::new();
        settings.insert("core.editor", "vim");
        settings.insert("user.name", "Ann");
        settings.insert("commit.gpgsign", "true");
        settings.insert("user.email", "ann@x.com");
        settings.insert("alias.lg", "log --graph # pretty");
        let profile = Profile::new("personal", settings);

        store.save(&profile, false).unwrap();
        let loaded = store.load("personal").unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_save_without_overwrite_keeps_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        store
            .save(&Profile::new("work", identity("Ann W", "ann@company.com")), false)
            .unwrap();
        let before = fs::read(store.profile_path("work")).unwrap();

        let err = store
            .save(&Profile::new("work", identity("Other", "o@x.com")), false)
            .unwrap_err();
        assert!(matches!(err, ProfileError::ProfileAlreadyExists { .. }));
        assert_eq!(fs::read(store.profile_path("work")).unwrap(), before);

        store
            .save(&Profile::new("work", identity("Other", "o@x.com")), true)
            .unwrap();
        assert_eq!(store.load("work").unwrap().user_name(), Some("Other"));
    }

    #[test]
    fn test_concurrent_creates_have_one_winner() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("profiles");
        ProfileStore::new(&dir).initialize().unwrap();
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dir = dir.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let email = format!("writer{}@x.com", i);
                    barrier.wait();
                    let result = ProfileStore::new(dir)
                        .save(&Profile::new("work", identity("Ann", &email)), false);
                    (email, result)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<&String> = results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(email, _)| email)
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(results.iter().all(|(_, r)| matches!(
            r,
            Ok(_) | Err(ProfileError::ProfileAlreadyExists { .. })
        )));

        let stored = ProfileStore::new(&dir).load("work").unwrap();
        assert_eq!(stored.user_email(), Some(winners[0].as_str()));
    }

    #[test]
    fn test_save_rejects_incomplete_identity() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let settings: Settings = [("user.name", "Ann")].into_iter().collect();
        let err = store.save(&Profile::new("x", settings), false).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidProfile { .. }));
        assert!(!store.profile_path("x").exists());

        let settings: Settings = [("user.name", "Ann"), ("user.email", "  ")]
            .into_iter()
            .collect();
        assert!(store.save(&Profile::new("x", settings), false).is_err());
    }

    #[test]
    fn test_save_rejects_unnormalized_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        let mut settings = identity("Ann", "ann@x.com");
        settings.insert("Core.Editor", "vim");
        let err = store.save(&Profile::new("x", settings), false).unwrap_err();
        assert!(err.to_string().contains("core.editor"));
    }

    #[test]
    fn test_load_missing_profile() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        store.initialize().unwrap();

        assert!(matches!(
            store.load("ghost"),
            Err(ProfileError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_corrupt_profile_reports_path_and_line() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        store.initialize().unwrap();

        fs::write(
            store.profile_path("broken"),
            "[user]\n\tname = Ann\n[core\n",
        )
        .unwrap();

        match store.load("broken") {
            Err(ProfileError::ProfileCorrupt { path, line, .. }) => {
                assert_eq!(path, store.profile_path("broken"));
                assert_eq!(line, 3);
            }
            other => panic!("expected ProfileCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_load_invalid_utf8_and_missing_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        store.initialize().unwrap();

        fs::write(store.profile_path("bytes"), b"[user]\n\tname = \xff\n").unwrap();
        match store.load("bytes") {
            Err(ProfileError::ProfileCorrupt { line, reason, .. }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("expected ProfileCorrupt, got {:?}", other),
        }

        fs::write(store.profile_path("half"), "[user]\n\tname = Ann\n").unwrap();
        match store.load("half") {
            Err(ProfileError::ProfileCorrupt { reason, .. }) => {
                assert!(reason.contains("user.email"));
            }
            other => panic!("expected ProfileCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_profile() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);

        store
            .save(&Profile::new("old", identity("Ann", "ann@x.com")), false)
            .unwrap();
        assert!(store.exists("old"));

        store.delete("old").unwrap();
        assert!(!store.exists("old"));
        assert!(matches!(
            store.delete("old"),
            Err(ProfileError::ProfileNotFound { .. })
        ));
    }
}
