//! Tracing initialisation for progeval binaries.
//!
//! Call [`init_tracing`] once at program start. Filtering comes from the
//! `PROGEVAL_LOG` environment variable (same syntax as `RUST_LOG`), falling
//! back to the supplied level. `PROGEVAL_LOG_FORMAT=json` switches to
//! newline-delimited JSON regardless of the `json` argument.
//!
//! Safe to call more than once; the global subscriber can only be set once
//! per process, so later calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable controlling the log filter.
pub const LOG_ENV: &str = "PROGEVAL_LOG";

/// Environment variable forcing JSON log output.
pub const LOG_FORMAT_ENV: &str = "PROGEVAL_LOG_FORMAT";

/// Initialise the global tracing subscriber.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let json = json
        || std::env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
