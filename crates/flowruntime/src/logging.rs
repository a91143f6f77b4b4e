//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. the `level` argument (if provided)
//! 2. `FLOWENGINE_LOG` environment variable (e.g. "info", "flowruntime=debug")
//! 3. default to `info`

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "FLOWENGINE_LOG";

/// Install a global subscriber writing to stderr.
///
/// Calling it again once a subscriber is installed is a no-op.
pub fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log filter '{}'", level))?,
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        assert!(init_logging(Some("debug")).is_ok());
        assert!(init_logging(None).is_ok());
    }

    #[test]
    fn bad_filter_is_rejected() {
        assert!(init_logging(Some("flowruntime=notalevel")).is_err());
    }
}
