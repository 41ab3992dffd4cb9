//! Tracing subscriber setup
//!
//! The library only emits events through the `tracing` macros; binaries
//! and embedders call [`init`] once to see them.
//!
//! # Usage
//!
//! Configure via RUST_LOG environment variable:
//! - `RUST_LOG=debug` - all debug logs
//! - `RUST_LOG=strata::syntax=trace` - parse and injection details
//! - `RUST_LOG=strata::syntax::worker=debug` - worker lifecycle only

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize tracing subscriber with console and optional file logging
///
/// Console output respects RUST_LOG and defaults to `warn`. When
/// `log_dir` is given, a daily-rotated `strata.log` is written there at
/// debug level.
pub fn init(log_dir: Option<&Path>) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_filter(console_filter);

    let file_layer = log_dir.and_then(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(dir, "strata.log");
            Some(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true)
                    .with_filter(EnvFilter::new("debug")),
            )
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not initialize file logging in {}: {}",
                dir.display(),
                e
            );
            None
        }
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
