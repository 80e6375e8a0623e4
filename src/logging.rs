//! # Structured Logging Bootstrap
//!
//! One-shot `tracing` initialization for binaries and tests embedding the
//! core. Libraries should not install global subscribers behind their
//! host's back, so this is opt-in: the embedding application calls
//! [`init_logging`] once at startup, or installs its own subscriber and
//! skips this entirely.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with an environment-derived filter.
///
/// The filter comes from `DRAFTMILL_LOG` (falling back to `info`);
/// `DRAFTMILL_LOG_FORMAT=json` switches the output to line-delimited JSON
/// for log shippers. Safe to call more than once, and a no-op when a
/// global subscriber is already installed.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = std::env::var(constants::ENV_LOG_FILTER).unwrap_or_else(|_| "info".into());
        let json = std::env::var(constants::ENV_LOG_FORMAT)
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(false),
                )
                .with(EnvFilter::new(filter.clone()))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(EnvFilter::new(filter.clone()))
                .try_init()
        };

        match result {
            Ok(()) => tracing::info!(filter = %filter, json, "🔧 structured logging initialized"),
            Err(_) => {
                // A subscriber is already set, likely by the embedding
                // application. Continue with whatever is installed.
                tracing::debug!("global tracing subscriber already initialized");
            }
        }
    });
}
