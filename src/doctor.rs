//! Diagnostics for git-profile.
//!
//! `git-profile doctor` checks:
//! - the profile and state directories
//! - that git can be invoked
//! - the activation record, including stale references and drift
//! - that every profile file loads
//!
//! Each step reports pass/warn/fail lines; only failures count as issues.

use anstyle::AnsiColor;

use crate::applier::ConfigBackend;
use crate::drift;
use crate::paths::Paths;
use crate::profiles::ProfileStore;
use crate::state::{ActivationTracker, Current};
use crate::ui::Ui;

/// Run the doctor diagnostics. Returns `true` when no step failed.
pub fn run_doctor(paths: &Paths, git: &dyn ConfigBackend, ui: &Ui) -> bool {
    let store = ProfileStore::new(&paths.profiles_dir);
    let tracker = ActivationTracker::new(&paths.active_file, &paths.lock_file);

    ui.section("git-profile Doctor");
    ui.newline();

    let mut healthy = true;

    healthy &= check_step(ui, "Directories", || {
        let mut ok = true;
        for (label, dir) in [
            ("Profile directory", &paths.profiles_dir),
            ("State directory", &paths.state_dir),
        ] {
            if dir.is_dir() {
                ui.println(format!("  {} {} exists: {}", ui.icon_ok(), label, dir.display()));
            } else if dir.exists() {
                ui.println(format!(
                    "  {} {} is not a directory: {}",
                    ui.icon_err(),
                    label,
                    dir.display()
                ));
                ok = false;
            } else {
                // Created on first use
                ui.println(format!(
                    "  {} {} missing: {}",
                    ui.icon_warn(),
                    label,
                    dir.display()
                ));
            }
        }

        if paths.config_file.exists() {
            ui.println(format!(
                "  {} Config file: {}",
                ui.icon_info(),
                paths.config_file.display()
            ));
        }
        ok
    });

    healthy &= check_step(ui, "Git", || match git.probe() {
        Ok(()) => {
            ui.println(format!("  {} git is available", ui.icon_ok()));
            for key in ["user.name", "user.email"] {
                match git.get(key) {
                    Ok(Some(value)) => {
                        ui.println(format!("  {} global {} = {}", ui.icon_info(), key, value))
                    }
                    Ok(None) => ui.println(format!("  {} global {} is not set", ui.icon_warn(), key)),
                    Err(e) => ui.println(format!("  {} cannot read {}: {}", ui.icon_warn(), key, e)),
                }
            }
            true
        }
        Err(e) => {
            ui.println(format!("  {} git unavailable: {}", ui.icon_err(), e));
            false
        }
    });

    healthy &= check_step(ui, "Activation Record", || match tracker.current(&store) {
        Ok(Current::Unset) => {
            ui.println(format!("  {} No profile activated yet", ui.icon_info()));
            true
        }
        Ok(Current::Active {
            record,
            stale_profile_reference,
        }) => {
            ui.println(format!(
                "  {} Active profile: {} (since {})",
                ui.icon_ok(),
                record.name,
                record.activated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            if stale_profile_reference {
                ui.println(format!(
                    "  {} Profile '{}' no longer exists",
                    ui.icon_warn(),
                    record.name
                ));
            }
            match drift::detect(&record, git) {
                Ok(drifted) if drifted.is_empty() => {
                    ui.println(format!("  {} Global config matches the snapshot", ui.icon_ok()))
                }
                Ok(drifted) => {
                    for d in drifted {
                        ui.println(format!(
                            "  {} {} changed: recorded '{}', now {}",
                            ui.icon_warn(),
                            d.key,
                            d.recorded,
                            d.live.map_or_else(|| "unset".to_string(), |v| format!("'{}'", v))
                        ));
                    }
                }
                Err(e) => ui.println(format!("  {} Drift check skipped: {}", ui.icon_warn(), e)),
            }
            true
        }
        Err(e) => {
            ui.println(format!("  {} {}", ui.icon_err(), e));
            false
        }
    });

    healthy &= check_step(ui, "Profiles", || {
        let profiles = match store.list() {
            Ok(p) => p,
            Err(e) => {
                ui.println(format!("  {} Failed to list profiles: {}", ui.icon_err(), e));
                return false;
            }
        };

        if profiles.is_empty() {
            ui.println(format!("  {} No profiles found", ui.icon_warn()));
            return true;
        }

        ui.println(format!("  Found {} profiles:", profiles.len()));
        let mut all_valid = true;
        for name in profiles {
            match store.load(&name) {
                Ok(profile) => ui.println(format!(
                    "    {} {}: {} ({} keys)",
                    ui.icon_ok(),
                    name,
                    ui.identity(profile.user_name(), profile.user_email()),
                    profile.settings.len()
                )),
                Err(e) => {
                    ui.println(format!("    {} {}: {}", ui.icon_err(), name, e));
                    all_valid = false;
                }
            }
        }
        all_valid
    });

    if healthy {
        ui.ok("No issues found");
    }
    healthy
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> bool
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
    success
}
