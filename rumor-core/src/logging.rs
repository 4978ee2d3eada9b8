//! Tracing subscriber setup.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::GeneralConfig;

static INIT: Once = Once::new();

/// Environment variable holding per-module log directives.
pub const LOG_ENV: &str = "RUMOR_LOG";

/// The filter used when `RUMOR_LOG` is unset or invalid.
#[must_use]
pub fn default_directive(config: &GeneralConfig) -> String {
    format!("rumor_core={}", config.log_level)
}

/// Install the global `fmt` subscriber.
///
/// `RUMOR_LOG` takes precedence over `general.log_level`, e.g.
/// `RUMOR_LOG=rumor_core::persistence=debug,rumor_core=info`.
/// Only the first call has any effect.
pub fn init_tracing(config: &GeneralConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));
        let installed = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init();
        if installed.is_err() {
            tracing::debug!("A global subscriber was already installed");
        }
    });
}
