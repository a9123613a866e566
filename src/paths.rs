use anyhow::{Context, Result};
use directories::BaseDirs;
use std::cell::OnceCell;
use std::path::PathBuf;

use crate::config::Config;

/// Environment variable overriding the profile directory
pub const PROFILES_DIR_ENV: &str = "GIT_PROFILE_DIR";
/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "GIT_PROFILE_STATE_DIR";
/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "GIT_PROFILE_CONFIG";

/// File extension of profile files
pub const PROFILE_EXTENSION: &str = "gitconfig";

/// All computed paths used by git-profile
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.config/git-profiles
    pub profiles_dir: PathBuf,
    /// ~/.local/state/git-profile
    pub state_dir: PathBuf,
    /// ~/.local/state/git-profile/active.json
    pub active_file: PathBuf,
    /// ~/.local/state/git-profile/active.lock
    pub lock_file: PathBuf,
    /// ~/.config/git-profile/config.toml
    pub config_file: PathBuf,
}

/// Explicit overrides, typically from CLI flags
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub config_file: Option<PathBuf>,
    pub profiles_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
}

impl Paths {
    /// Default layout derived from the user's base directories
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let config_home = base_dirs.config_dir();
        let state_home = base_dirs
            .state_dir()
            .unwrap_or_else(|| base_dirs.data_local_dir());

        Ok(Self::from_dirs(
            config_home.join("git-profiles"),
            state_home.join("git-profile"),
            config_home.join("git-profile").join("config.toml"),
        ))
    }

    /// Build the layout from a profile directory and a state directory
    pub fn from_dirs(profiles_dir: PathBuf, state_dir: PathBuf, config_file: PathBuf) -> Self {
        let active_file = state_dir.join("active.json");
        let lock_file = state_dir.join("active.lock");
        Self {
            profiles_dir,
            state_dir,
            active_file,
            lock_file,
            config_file,
        }
    }

    /// Resolve the final layout.
    ///
    /// Precedence: CLI flag > environment > config file > defaults.
    pub fn resolve(overrides: &PathOverrides) -> Result<(Self, Config)> {
        Self::resolve_with(overrides, Self::new)
    }

    /// Like [`Paths::resolve`], with the default layout computed by
    /// `defaults`. It is only called when some location is left unset.
    fn resolve_with(
        overrides: &PathOverrides,
        defaults: impl Fn() -> Result<Self>,
    ) -> Result<(Self, Config)> {
        let env = |name: &str| std::env::var_os(name).map(PathBuf::from);
        let cached: OnceCell<Self> = OnceCell::new();
        let default_of = |pick: fn(&Self) -> &PathBuf| -> Result<PathBuf> {
            if let Some(layout) = cached.get() {
                return Ok(pick(layout).clone());
            }
            let layout = defaults()?;
            let path = pick(&layout).clone();
            let _ = cached.set(layout);
            Ok(path)
        };

        let config_file = match overrides.config_file.clone().or_else(|| env(CONFIG_FILE_ENV)) {
            Some(path) => path,
            None => default_of(|d| &d.config_file)?,
        };
        let config = Config::load_from(&config_file)?;

        let profiles_dir = match overrides
            .profiles_dir
            .clone()
            .or_else(|| env(PROFILES_DIR_ENV))
            .or_else(|| config.profiles_dir.clone())
        {
            Some(path) => path,
            None => default_of(|d| &d.profiles_dir)?,
        };
        let state_dir = match overrides
            .state_dir
            .clone()
            .or_else(|| env(STATE_DIR_ENV))
            .or_else(|| config.state_dir.clone())
        {
            Some(path) => path,
            None => default_of(|d| &d.state_dir)?,
        };

        Ok((Self::from_dirs(profiles_dir, state_dir, config_file), config))
    }

    /// Get the path to a specific profile's file
    pub fn profile_file(&self, name: &str) -> PathBuf {
        self.profiles_dir
            .join(format!("{}.{}", name, PROFILE_EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_profile_file_path() {
        let paths = Paths::from_dirs("/p".into(), "/s".into(), "/c.toml".into());
        assert_eq!(paths.profile_file("work"), PathBuf::from("/p/work.gitconfig"));
        assert_eq!(paths.active_file, PathBuf::from("/s/active.json"));
    }

    #[test]
    #[serial]
    fn test_full_overrides_need_no_home_directory() {
        let temp = TempDir::new().unwrap();
        let overrides = PathOverrides {
            config_file: Some(temp.path().join("config.toml")),
            profiles_dir: Some(temp.path().join("profiles")),
            state_dir: Some(temp.path().join("state")),
        };

        let (paths, _) =
            Paths::resolve_with(&overrides, || Err(anyhow::anyhow!("no home directory"))).unwrap();
        assert_eq!(paths.profiles_dir, temp.path().join("profiles"));
        assert_eq!(paths.active_file, temp.path().join("state/active.json"));

        let partial = PathOverrides {
            state_dir: None,
            ..overrides
        };
        let resolved = Paths::resolve_with(&partial, || Err(anyhow::anyhow!("no home directory")));
        if std::env::var_os(STATE_DIR_ENV).is_none() {
            assert!(resolved.is_err());
        }
    }

    #[test]
    #[serial]
    fn test_resolve_precedence() {
        let temp = TempDir::new().unwrap();
        let config_file = temp.path().join("config.toml");
        std::fs::write(
            &config_file,
            "profiles_dir = \"/from/file\"\nstate_dir = \"/state/file\"\n",
        )
        .unwrap();

        unsafe {
            std::env::set_var(STATE_DIR_ENV, "/state/env");
            std::env::remove_var(PROFILES_DIR_ENV);
        }

        let (paths, _) = Paths::resolve(&PathOverrides {
            config_file: Some(config_file.clone()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(paths.profiles_dir, PathBuf::from("/from/file"));
        assert_eq!(paths.state_dir, PathBuf::from("/state/env"));

        let (paths, _) = Paths::resolve(&PathOverrides {
            config_file: Some(config_file),
            profiles_dir: Some("/from/flag".into()),
            state_dir: None,
        })
        .unwrap();
        assert_eq!(paths.profiles_dir, PathBuf::from("/from/flag"));

        unsafe { std::env::remove_var(STATE_DIR_ENV) };
    }
}
