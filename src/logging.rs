use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV: &str = "GIT_PROFILE_LOG";

/// Initialize tracing on stderr.
///
/// `GIT_PROFILE_LOG` wins when set; otherwise the level follows the number
/// of `-v` flags (warn, info, debug, trace). Stdout stays reserved for
/// command output.
pub fn init_tracing(verbosity: u8, ansi: bool) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("gitprof={}", default_level)));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .without_time();

    // Keep any subscriber that is already installed
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
