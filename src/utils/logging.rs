//! Structured logging setup.
//!
//! The library itself only emits `tracing` events. Applications that have no subscriber of
//! their own can call [`init_logging`] once at startup.

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{BitswarmError, Result};

/// Install a global `fmt` subscriber according to `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `Ok(false)` when another
/// subscriber was already installed, so calling it twice is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            BitswarmError::Config("log_file_path must be set when log_to_file is true".into())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BitswarmError::Config(format!("Failed to open log file: {e}")))?;
        let builder = builder.with_writer(Mutex::new(file)).with_ansi(false);
        if config.json_format {
            builder.json().try_init().is_ok()
        } else {
            builder.try_init().is_ok()
        }
    } else if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
    Ok(installed)
}
