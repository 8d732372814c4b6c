//! Logging initialization.
//!
//! Logs go to stderr so stdout carries only accuracies and reports.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// `RUST_LOG` overrides the level chosen by `verbose`.
pub fn init(verbose: bool, json_format: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` config section, with CLI overrides.
pub fn init_from_config(
    config: &convirt_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let verbose = verbose_override || is_verbose_level(&config.logging.level);
    let json_format = json_logs_override || config.logging.format == "json";
    init(verbose, json_format);
}

fn is_verbose_level(level: &str) -> bool {
    matches!(level, "debug" | "trace")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_levels() {
        assert!(is_verbose_level("debug"));
        assert!(is_verbose_level("trace"));
        assert!(!is_verbose_level("info"));
        assert!(!is_verbose_level("warn"));
    }
}
