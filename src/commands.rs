//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command (`init`,
//! `create`, `use`, `list`, `show`, `current`, `delete`, `doctor`). Handlers
//! gather input, call into the core (`profiles`, `applier`, `state`,
//! `switch`) and report through [`Ui`].

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use inquire::{Confirm, Text};
use std::io::IsTerminal;

use crate::applier::ConfigBackend;
use crate::doctor::run_doctor;
use crate::drift;
use crate::error::ProfileError;
use crate::gitconfig::{Settings, normalize_key};
use crate::paths::Paths;
use crate::profiles::{Profile, ProfileStore, validate_profile_name};
use crate::state::{ActivationTracker, ActiveRecord, Current};
use crate::switch::switch_to_profile;
use crate::ui::Ui;

const EXAMPLE_PROFILE: &str = "[user]\n\tname = Your Name\n\temail = your_email@example.com\n[core]\n\teditor = nano";
const DEFAULT_EDITOR: &str = "nano";

pub fn store(paths: &Paths) -> ProfileStore {
    ProfileStore::new(&paths.profiles_dir)
}

pub fn tracker(paths: &Paths) -> ActivationTracker {
    ActivationTracker::new(&paths.active_file, &paths.lock_file)
}

/// Follow-up advice printed under an error
pub fn hint_for(err: &ProfileError) -> Option<String> {
    match err {
        ProfileError::ProfileNotFound { .. } => {
            Some("Use 'git-profile list' to see available profiles.".to_string())
        }
        ProfileError::ProfileAlreadyExists { .. } => {
            Some("Use --force to overwrite it, or choose a different name.".to_string())
        }
        ProfileError::ProfileCorrupt { path, .. } => Some(format!(
            "Fix the file by hand, then retry: {}",
            path.display()
        )),
        ProfileError::ConfigBackendUnavailable(_) => {
            Some("Is git installed and on your PATH?".to_string())
        }
        ProfileError::PartialApply { profile, .. } => Some(format!(
            "The active profile was not changed. Retry with 'git-profile use {}'.",
            profile
        )),
        ProfileError::StateCorrupt { path, .. } => Some(format!(
            "Delete the file and activate a profile again: {}",
            path.display()
        )),
        ProfileError::InvalidProfileName { .. } | ProfileError::InvalidProfile { .. } => None,
        ProfileError::StorageUnavailable { .. } => None,
    }
}

/// Create the profile directory and print setup instructions
pub fn init(paths: &Paths, ui: &Ui) -> Result<()> {
    store(paths).initialize()?;

    ui.ok(format!(
        "Profile directory ready: {}",
        paths.profiles_dir.display()
    ));
    ui.newline();
    ui.println("Create profiles like:");
    ui.println(format!("  {}", paths.profile_file("personal").display()));
    ui.println(format!("  {}", paths.profile_file("work").display()));
    ui.newline();
    ui.println("Example profile content:");
    ui.println(ui.dim(EXAMPLE_PROFILE));
    ui.newline();
    ui.println("Or use:");
    ui.println(format!("  {} create personal --activate", ui.bold("git-profile")));
    ui.println(format!("  {} create work", ui.bold("git-profile")));
    Ok(())
}

/// List all available profiles
pub fn list(paths: &Paths, ui: &Ui) -> Result<()> {
    let store = store(paths);
    let profiles = store.list()?;

    if profiles.is_empty() {
        // Stdout stays empty for an empty store
        ui.warn(format!(
            "No profiles found in {}. Create one with: git-profile create <name>",
            paths.profiles_dir.display()
        ));
        return Ok(());
    }

    // A broken record must not hide the list
    let active = match tracker(paths).read_record() {
        Ok(record) => record.map(|r| r.name),
        Err(e) => {
            ui.warn(format!("Could not read activation record: {}", e));
            None
        }
    };

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Identity"),
        ui.header_cell("Status"),
    ]);

    for name in &profiles {
        let is_active = active.as_deref() == Some(name.as_str());
        let icon = ui.active_marker(is_active);

        let (identity, status) = match store.load(name) {
            Ok(profile) => (
                ui.cell(ui.identity(profile.user_name(), profile.user_email())),
                if is_active {
                    ui.colored_cell("active", AnsiColor::Green)
                } else {
                    ui.cell("-")
                },
            ),
            Err(_) => (
                ui.cell("?"),
                ui.colored_cell("corrupt", AnsiColor::Red),
            ),
        };

        table.add_row(vec![ui.cell(icon), ui.cell(name), identity, status]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());
    Ok(())
}

/// Print a profile's settings, or its file verbatim with `raw`
pub fn show(paths: &Paths, name: &str, raw: bool, ui: &Ui) -> Result<()> {
    let store = store(paths);
    let profile = store.load(name)?;
    let path = store.profile_path(name);

    if raw {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        ui.println(format!("# Profile: {}", name));
        ui.println(format!("# Path: {}", path.display()));
        ui.newline();
        ui.println(content.trim_end());
        return Ok(());
    }

    ui.section(format!("Profile: {}", profile.name));
    ui.println(ui.dim(path.display().to_string()));
    ui.newline();
    ui.println(ui.settings_table(&profile.settings).to_string());
    Ok(())
}

/// Show the profile recorded by the last successful `use`
pub fn current(paths: &Paths, git: &dyn ConfigBackend, check: bool, ui: &Ui) -> Result<()> {
    let current = tracker(paths).current(&store(paths))?;

    let (record, stale) = match current {
        Current::Unset => {
            ui.info("No profile has been activated with git-profile yet (unset).");
            ui.println(format!("Activate one with: {} use <name>", ui.bold("git-profile")));
            return Ok(());
        }
        Current::Active {
            record,
            stale_profile_reference,
        } => (record, stale_profile_reference),
    };

    ui.section("Current Profile");
    ui.newline();

    let mut table = ui.simple_table();
    table.add_row(vec![ui.cell("Active profile:"), ui.header_cell(&record.name)]);
    table.add_row(vec![
        ui.cell("Activated at:"),
        ui.cell(record.activated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
    ]);
    table.add_row(vec![
        ui.cell("user.name:"),
        ui.cell(record.user_name().unwrap_or("(not recorded)")),
    ]);
    table.add_row(vec![
        ui.cell("user.email:"),
        ui.cell(record.user_email().unwrap_or("(not recorded)")),
    ]);
    ui.println(table.to_string());

    if stale {
        ui.newline();
        ui.warn(format!(
            "Profile '{}' no longer exists in {}; the values above are from the activation snapshot.",
            record.name,
            paths.profiles_dir.display()
        ));
    }

    if check {
        ui.newline();
        report_drift(&record, git, ui);
    }

    Ok(())
}

fn report_drift(record: &ActiveRecord, git: &dyn ConfigBackend, ui: &Ui) {
    ui.section("Drift check (advisory)");
    match drift::detect(record, git) {
        Ok(drifted) if drifted.is_empty() => {
            ui.ok("Global git configuration matches the activation snapshot.");
        }
        Ok(drifted) => {
            let mut table = ui.table();
            table.set_header(vec![
                ui.header_cell("Key"),
                ui.header_cell("Recorded"),
                ui.header_cell("Live"),
            ]);
            for d in &drifted {
                table.add_row(vec![
                    ui.cell(&d.key),
                    ui.cell(&d.recorded),
                    match &d.live {
                        Some(v) => ui.colored_cell(v, AnsiColor::Yellow),
                        None => ui.colored_cell("(unset)", AnsiColor::Red),
                    },
                ]);
            }
            ui.println(table.to_string());
            ui.warn(format!(
                "{} key(s) changed outside git-profile since the last activation.",
                drifted.len()
            ));
        }
        Err(e) => ui.warn(format!("Could not read the live configuration: {}", e)),
    }
}

/// Inputs for `create`, mostly straight from CLI flags
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: String,
    pub user_name: Option<String>,
    pub email: Option<String>,
    /// Extra `key=value` settings, keys already normalized
    pub set: Vec<(String, String)>,
    pub force: bool,
    pub activate: bool,
    pub no_input: bool,
}

/// Parse a `--set key=value` argument
pub fn parse_setting(arg: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
    let key = normalize_key(key.trim())?;
    Ok((key, value.to_string()))
}

/// Build the settings of a new profile.
///
/// Identity first, then `core.editor` when given, then `--set` pairs, which
/// override anything before them.
pub fn build_settings(
    user_name: &str,
    email: &str,
    editor: Option<&str>,
    extra: &[(String, String)],
) -> Settings {
    let mut settings = Settings::new();
    settings.insert("user.name", user_name.trim());
    settings.insert("user.email", email.trim());
    if let Some(editor) = editor.map(str::trim).filter(|e| !e.is_empty()) {
        settings.insert("core.editor", editor);
    }
    for (key, value) in extra {
        settings.insert(key.as_str(), value.as_str());
    }
    settings
}

/// Create a profile from flags and/or interactive prompts
pub fn create(paths: &Paths, git: &dyn ConfigBackend, opts: &CreateOptions, ui: &Ui) -> Result<()> {
    validate_profile_name(&opts.name)?;
    let store = store(paths);

    // Fail before prompting rather than after
    if store.exists(&opts.name) && !opts.force {
        return Err(ProfileError::ProfileAlreadyExists {
            name: opts.name.clone(),
            path: store.profile_path(&opts.name),
        }
        .into());
    }

    let interactive = !opts.no_input && (opts.user_name.is_none() || opts.email.is_none());
    let settings = if interactive {
        if !std::io::stdin().is_terminal() {
            bail!(
                "Cannot prompt for profile values: stdin is not a terminal.\nHint: Pass --user-name and --email (and --no-input) instead."
            );
        }
        prompt_settings(git, opts, ui)?
    } else {
        let (Some(user_name), Some(email)) = (&opts.user_name, &opts.email) else {
            bail!("--no-input requires both --user-name and --email");
        };
        build_settings(user_name, email, None, &opts.set)
    };

    let path = store.save(&Profile::new(&opts.name, settings), opts.force)?;
    ui.ok(format!("Saved profile '{}'", opts.name));
    ui.println(format!("  -> {}", path.display()));

    if opts.activate {
        ui.newline();
        use_profile(paths, git, &opts.name, ui)?;
    } else {
        ui.newline();
        ui.println("To activate it:");
        ui.println(format!("  git-profile use {}", opts.name));
    }

    Ok(())
}

/// Interactive profile values, defaulting to the live global identity
fn prompt_settings(git: &dyn ConfigBackend, opts: &CreateOptions, ui: &Ui) -> Result<Settings> {
    ui.section(format!("Creating profile: {}", opts.name));
    ui.println(ui.dim("(Press Enter to accept the default shown.)"));

    let live = |key: &str| git.get(key).ok().flatten();
    let default_name = opts
        .user_name
        .clone()
        .or_else(|| live("user.name"))
        .unwrap_or_else(|| "Your Name".to_string());
    let default_email = opts
        .email
        .clone()
        .or_else(|| live("user.email"))
        .unwrap_or_else(|| "your_email@example.com".to_string());

    let user_name = Text::new("Git user.name:")
        .with_default(&default_name)
        .prompt()
        .context("Profile creation cancelled")?;
    let email = Text::new("Git user.email:")
        .with_default(&default_email)
        .prompt()
        .context("Profile creation cancelled")?;
    let editor = Text::new("core.editor:")
        .with_default(DEFAULT_EDITOR)
        .with_help_message("Leave empty to not set an editor")
        .prompt()
        .context("Profile creation cancelled")?;

    Ok(build_settings(&user_name, &email, Some(&editor), &opts.set))
}

/// Switch to a profile
pub fn use_profile(paths: &Paths, git: &dyn ConfigBackend, name: &str, ui: &Ui) -> Result<()> {
    let spinner = ui.spinner(format!("Activating profile '{}'...", name));

    match switch_to_profile(&store(paths), git, &tracker(paths), name) {
        Ok(record) => {
            ui.spinner_finish_ok(&spinner, format!("Activated profile: {}", record.name));
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Failed to activate '{}'", name));
            return Err(e.into());
        }
    }

    ui.newline();
    ui.println("Current global git identity:");
    let read_back = |key: &str| match git.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => "(not set)".to_string(),
        Err(e) => format!("(unreadable: {})", e),
    };
    ui.println(format!("  user.name  = {}", read_back("user.name")));
    ui.println(format!("  user.email = {}", read_back("user.email")));
    Ok(())
}

/// Remove a profile file
pub fn delete(paths: &Paths, name: &str, force: bool, ui: &Ui) -> Result<()> {
    let store = store(paths);
    if !store.exists(name) {
        // Let the store produce the precise error
        store.delete(name)?;
    }

    if !force {
        let confirm = Confirm::new(&format!("Delete profile '{}'?", name))
            .with_default(false)
            .with_help_message("This permanently removes the profile file")
            .prompt()
            .context("Confirmation cancelled")?;

        if !confirm {
            ui.warn("Deletion cancelled.");
            return Ok(());
        }
    }

    store.delete(name)?;
    ui.ok(format!("Deleted profile '{}'", name));

    if let Ok(Some(record)) = tracker(paths).read_record() {
        if record.name == name {
            ui.warn(format!(
                "'{}' was the active profile. Your global git identity is unchanged; 'git-profile current' will report it as stale.",
                name
            ));
        }
    }
    Ok(())
}

/// Run diagnostics
pub fn doctor(paths: &Paths, git: &dyn ConfigBackend, ui: &Ui) -> Result<()> {
    if !run_doctor(paths, git, ui) {
        bail!("Doctor found issues; see the report above");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::tests::MemoryBackend;
    use crate::test_utils::setup_test_paths;
    use crate::ui::ColorMode;
    use tempfile::TempDir;

    fn test_ui() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    fn opts(name: &str, user: &str, email: &str) -> CreateOptions {
        CreateOptions {
            name: name.to_string(),
            user_name: Some(user.to_string()),
            email: Some(email.to_string()),
            no_input: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_init_and_list_empty() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();

        init(&paths, &ui).unwrap();
        assert!(paths.profiles_dir.is_dir());
        assert!(list(&paths, &ui).is_ok());
    }

    #[test]
    fn test_create_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        let git = MemoryBackend::default();

        create(&paths, &git, &opts("work", "Ann W", "ann@company.com"), &ui).unwrap();

        assert_eq!(store(&paths).list().unwrap(), vec!["work"]);
        assert!(list(&paths, &ui).is_ok());
        assert!(show(&paths, "work", false, &ui).is_ok());
        assert!(show(&paths, "work", true, &ui).is_ok());
    }

    #[test]
    fn test_create_duplicate_requires_force() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        let git = MemoryBackend::default();

        create(&paths, &git, &opts("work", "Ann W", "ann@company.com"), &ui).unwrap();
        let err = create(&paths, &git, &opts("work", "X", "x@x.com"), &ui).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProfileError>(),
            Some(ProfileError::ProfileAlreadyExists { .. })
        ));

        let mut forced = opts("work", "X", "x@x.com");
        forced.force = true;
        create(&paths, &git, &forced, &ui).unwrap();
        assert_eq!(
            store(&paths).load("work").unwrap().user_name(),
            Some("X")
        );
    }

    #[test]
    fn test_create_with_activate() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        let git = MemoryBackend::default();

        let mut o = opts("personal", "Ann", "ann@x.com");
        o.activate = true;
        o.set = vec![parse_setting("core.editor=vim").unwrap()];
        create(&paths, &git, &o, &ui).unwrap();

        assert_eq!(
            git.values.borrow().get("core.editor").map(String::as_str),
            Some("vim")
        );
        let record = tracker(&paths).read_record().unwrap().unwrap();
        assert_eq!(record.name, "personal");
    }

    #[test]
    fn test_no_input_requires_identity() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let git = MemoryBackend::default();

        let o = CreateOptions {
            name: "x".into(),
            user_name: Some("Ann".into()),
            no_input: true,
            ..Default::default()
        };
        assert!(create(&paths, &git, &o, &test_ui()).is_err());
        assert!(!store(&paths).exists("x"));
    }

    #[test]
    fn test_use_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let git = MemoryBackend::default();

        let err = use_profile(&paths, &git, "nonexistent", &test_ui()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProfileError>(),
            Some(ProfileError::ProfileNotFound { .. })
        ));
        assert!(tracker(&paths).read_record().unwrap().is_none());
    }

    #[test]
    fn test_current_states() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        let git = MemoryBackend::default();

        assert!(current(&paths, &git, true, &ui).is_ok());

        create(&paths, &git, &opts("work", "Ann W", "ann@company.com"), &ui).unwrap();
        use_profile(&paths, &git, "work", &ui).unwrap();
        assert!(current(&paths, &git, true, &ui).is_ok());

        delete(&paths, "work", true, &ui).unwrap();
        assert!(current(&paths, &git, false, &ui).is_ok());
    }

    #[test]
    fn test_delete_missing() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);

        let err = delete(&paths, "ghost", true, &test_ui()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProfileError>(),
            Some(ProfileError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn test_parse_setting() {
        assert_eq!(
            parse_setting("Core.Editor=code --wait").unwrap(),
            ("core.editor".to_string(), "code --wait".to_string())
        );
        assert_eq!(
            parse_setting("alias.eq=a=b").unwrap(),
            ("alias.eq".to_string(), "a=b".to_string())
        );
        assert!(parse_setting("novalue").is_err());
        assert!(parse_setting("nosection=x").is_err());
    }

    #[test]
    fn test_build_settings_order_and_overrides() {
        let extra = vec![("user.email".to_string(), "override@x.com".to_string())];
        let settings = build_settings(" Ann ", "ann@x.com", Some(""), &extra);

        let keys: Vec<&str> = settings.keys().collect();
        assert_eq!(keys, vec!["user.name", "user.email"]);
        assert_eq!(settings.get("user.name"), Some("Ann"));
        assert_eq!(settings.get("user.email"), Some("override@x.com"));
    }

    #[test]
    fn test_hints() {
        let err = ProfileError::ProfileNotFound {
            name: "x".into(),
            path: "/p/x.gitconfig".into(),
        };
        assert!(hint_for(&err).unwrap().contains("git-profile list"));
    }
}
