//! Applying a profile to the global Git configuration.
//!
//! The global configuration is shared, machine-wide state. Everything that
//! touches it goes through a [`ConfigBackend`]; [`apply`] is the only place
//! that writes through one.

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::GitSettings;
use crate::error::{ProfileError, Result};
use crate::gitconfig::Settings;
use crate::profiles::Profile;

/// Identity keys written before everything else, in this order
pub const IDENTITY_ORDER: [&str; 2] = ["user.email", "user.name"];

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Failure reported by a configuration backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be invoked at all
    Unavailable(String),
    /// The backend ran but refused the operation
    Rejected { key: String, message: String },
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "{}", msg),
            Self::Rejected { key, message } => write!(f, "setting '{}' rejected: {}", key, message),
        }
    }
}

/// Read/write access to the global configuration scope
pub trait ConfigBackend {
    /// Check that the backend can be invoked
    fn probe(&self) -> std::result::Result<(), BackendError>;

    /// Read a key from the global scope; `None` when unset
    fn get(&self, key: &str) -> std::result::Result<Option<String>, BackendError>;

    /// Set a key in the global scope
    fn set(&self, key: &str, value: &str) -> std::result::Result<(), BackendError>;
}

/// Where `GitCli` reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    File(PathBuf),
}

/// Backend that shells out to `git config`
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    scope: ConfigScope,
    timeout: Duration,
}

struct Finished {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl GitCli {
    pub fn new(program: impl Into<String>, scope: ConfigScope, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            scope,
            timeout,
        }
    }

    pub fn from_settings(settings: &GitSettings) -> Self {
        let scope = match &settings.config_file {
            Some(path) => ConfigScope::File(path.clone()),
            None => ConfigScope::Global,
        };
        Self::new(settings.program.clone(), scope, settings.timeout())
    }

    fn scope_args(&self) -> Vec<OsString> {
        match &self.scope {
            ConfigScope::Global => vec!["--global".into()],
            ConfigScope::File(path) => vec!["--file".into(), path.clone().into_os_string()],
        }
    }

    /// Run git with a deadline; the child is killed when it expires.
    fn run(&self, args: Vec<OsString>) -> std::result::Result<Finished, BackendError> {
        tracing::trace!(program = %self.program, ?args, "running git");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BackendError::Unavailable(format!("failed to run '{}': {}", self.program, e))
            })?;

        // Drain both pipes while waiting so a chatty child cannot stall on a full buffer
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now().checked_add(self.timeout).ok_or_else(|| {
            let _ = child.kill();
            let _ = child.wait();
            BackendError::Unavailable(format!(
                "timeout of {}s for '{}' is out of range",
                self.timeout.as_secs(),
                self.program
            ))
        })?;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    // Reader threads are left to finish on their own
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BackendError::Unavailable(format!(
                        "'{}' did not finish within {}s",
                        self.program,
                        self.timeout.as_secs_f32()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(BackendError::Unavailable(format!(
                        "failed to wait for '{}': {}",
                        self.program, e
                    )));
                }
            }
        };

        let stdout = self.collect(stdout, "stdout")?;
        let stderr = self.collect(stderr, "stderr")?;

        Ok(Finished {
            code: status.code(),
            stdout,
            stderr,
        })
    }

    fn collect(
        &self,
        reader: Option<JoinHandle<io::Result<String>>>,
        stream: &str,
    ) -> std::result::Result<String, BackendError> {
        let Some(handle) = reader else {
            return Ok(String::new());
        };
        let read_failed = |reason: String| {
            BackendError::Unavailable(format!(
                "failed to read {} of '{}': {}",
                stream, self.program, reason
            ))
        };
        handle
            .join()
            .map_err(|_| read_failed("reader thread panicked".to_string()))?
            .map_err(|e| read_failed(e.to_string()))
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = String::new();
        pipe.read_to_string(&mut buf)?;
        Ok(buf)
    })
}

impl ConfigBackend for GitCli {
    fn probe(&self) -> std::result::Result<(), BackendError> {
        let finished = self.run(vec!["--version".into()])?;
        if finished.code != Some(0) {
            return Err(BackendError::Unavailable(format!(
                "'{} --version' failed: {}",
                self.program,
                finished.stderr.trim()
            )));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> std::result::Result<Option<String>, BackendError> {
        let mut args: Vec<OsString> = vec!["config".into()];
        args.extend(self.scope_args());
        args.push("--get".into());
        args.push(key.into());

        let finished = self.run(args)?;
        match finished.code {
            Some(0) => {
                let value = finished
                    .stdout
                    .strip_suffix('\n')
                    .unwrap_or(&finished.stdout)
                    .to_string();
                Ok(Some(value))
            }
            // Exit status 1 means the key is not set
            Some(1) => Ok(None),
            _ => Err(BackendError::Rejected {
                key: key.to_string(),
                message: finished.stderr.trim().to_string(),
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), BackendError> {
        let mut args: Vec<OsString> = vec!["config".into()];
        args.extend(self.scope_args());
        args.push("--replace-all".into());
        args.push(key.into());
        args.push(value.into());

        let finished = self.run(args)?;
        if finished.code != Some(0) {
            return Err(BackendError::Rejected {
                key: key.to_string(),
                message: finished.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Keys of `settings` in the order `apply` writes them
pub fn application_order(settings: &Settings) -> Vec<&str> {
    let mut order: Vec<&str> = IDENTITY_ORDER
        .iter()
        .copied()
        .filter(|key| settings.contains_key(key))
        .collect();
    order.extend(settings.keys().filter(|key| !IDENTITY_ORDER.contains(key)));
    order
}

/// Write every key of `profile` to the global configuration.
///
/// Keys not in the profile are left untouched. `user.email` is written
/// first, then `user.name`, then the rest in insertion order. Returns the
/// settings that were applied, in application order.
pub fn apply(profile: &Profile, backend: &dyn ConfigBackend) -> Result<Settings> {
    backend
        .probe()
        .map_err(|e| ProfileError::ConfigBackendUnavailable(e.to_string()))?;

    let order = application_order(&profile.settings);
    let mut applied = Settings::new();

    for (idx, key) in order.iter().enumerate() {
        let value = profile.settings.get(key).unwrap_or_default();

        if let Err(e) = backend.set(key, value) {
            tracing::warn!(profile = %profile.name, key, error = %e, "apply stopped");

            if applied.is_empty() {
                if let BackendError::Unavailable(msg) = &e {
                    return Err(ProfileError::ConfigBackendUnavailable(msg.clone()));
                }
            }
            return Err(ProfileError::PartialApply {
                profile: profile.name.clone(),
                applied: applied.keys().map(str::to_string).collect(),
                pending: order[idx..].iter().map(|k| k.to_string()).collect(),
                reason: e.to_string(),
            });
        }

        tracing::debug!(profile = %profile.name, key, "applied");
        applied.insert(*key, value);
    }

    Ok(applied)
}
