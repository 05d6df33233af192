//! Tracing setup for the `exttest` binary.
//!
//! Harness progress is logged at `info`. Output of external tools (forge,
//! npm, git) is logged line by line under [`STDOUT_TARGET`] and
//! [`STDERR_TARGET`] and only shows up at `debug` verbosity.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log target for lines an external command wrote to stdout.
pub const STDOUT_TARGET: &str = "exttest::stdout";

/// Log target for lines an external command wrote to stderr.
pub const STDERR_TARGET: &str = "exttest::stderr";

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let output = if level >= Level::DEBUG { "debug" } else { "off" };
    format!(
        "{},{STDOUT_TARGET}={output},{STDERR_TARGET}={output}",
        level.as_str().to_ascii_lowercase()
    )
}

/// Install the global subscriber. Only the first call takes effect.
///
/// Events carry a `stream` field instead of a target, so command output
/// stays distinguishable from harness messages in both formats.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_target(false).flatten_event(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false).compact()).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
