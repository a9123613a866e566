use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use gitprof::{
    applier::GitCli,
    commands::{self, CreateOptions},
    error::ProfileError,
    logging,
    paths::{PathOverrides, Paths},
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "git-profile")]
#[command(about = "Git Profile Switcher - keep named identities and switch the global git config between them")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Config file (default: ~/.config/git-profile/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding <name>.gitconfig profiles
    #[arg(long, global = true, value_name = "DIR")]
    profiles_dir: Option<PathBuf>,

    /// Directory holding the activation record
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the profile directory and print setup instructions
    Init,

    /// Create a new profile
    Create {
        /// Name of the profile to create
        name: String,

        /// Value for user.name (prompted when omitted)
        #[arg(long, value_name = "NAME")]
        user_name: Option<String>,

        /// Value for user.email (prompted when omitted)
        #[arg(long, value_name = "EMAIL")]
        email: Option<String>,

        /// Extra setting, repeatable: --set core.editor=vim
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = commands::parse_setting)]
        set: Vec<(String, String)>,

        /// Overwrite an existing profile
        #[arg(long)]
        force: bool,

        /// Activate the profile after creating it
        #[arg(long)]
        activate: bool,

        /// Never prompt; requires --user-name and --email
        #[arg(long)]
        no_input: bool,
    },

    /// Switch to a profile (apply it to the global git config)
    Use {
        /// Name of the profile to activate
        name: String,
    },

    /// List all available profiles
    List,

    /// Show a profile's settings
    Show {
        /// Name of the profile to show
        name: String,

        /// Print the file exactly as stored
        #[arg(long)]
        raw: bool,
    },

    /// Show the last profile activated with git-profile
    Current {
        /// Also compare the snapshot with the live global config
        #[arg(long)]
        check: bool,
    },

    /// Delete a profile
    Delete {
        /// Name of the profile to delete
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Run diagnostics on the git-profile setup
    Doctor,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ui = Ui::new(cli.color, cli.no_color);
    logging::init_tracing(cli.verbose, ui.color_enabled);

    match run(cli, &ui) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui.err(format!("{:#}", err));
            let profile_error = err
                .chain()
                .find_map(|e| e.downcast_ref::<ProfileError>());
            if let Some(hint) = profile_error.and_then(commands::hint_for) {
                eprintln!("Hint: {}", hint);
            }
            let code = profile_error.map_or(1, ProfileError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli, ui: &Ui) -> Result<()> {
    let overrides = PathOverrides {
        config_file: cli.config,
        profiles_dir: cli.profiles_dir,
        state_dir: cli.state_dir,
    };
    let (paths, config) = Paths::resolve(&overrides)?;
    let git = GitCli::from_settings(&config.git);
    tracing::debug!(?paths, "resolved paths");

    match cli.command {
        Commands::Init => commands::init(&paths, ui),
        Commands::Create {
            name,
            user_name,
            email,
            set,
            force,
            activate,
            no_input,
        } => {
            let opts = CreateOptions {
                name,
                user_name,
                email,
                set,
                force,
                activate,
                no_input,
            };
            commands::create(&paths, &git, &opts, ui)
        }
        Commands::Use { name } => commands::use_profile(&paths, &git, &name, ui),
        Commands::List => commands::list(&paths, ui),
        Commands::Show { name, raw } => commands::show(&paths, &name, raw, ui),
        Commands::Current { check } => commands::current(&paths, &git, check, ui),
        Commands::Delete { name, force } => commands::delete(&paths, &name, force, ui),
        Commands::Doctor => commands::doctor(&paths, &git, ui),
    }
}
