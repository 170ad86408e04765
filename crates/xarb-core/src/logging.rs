//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is always human-readable. The optional file output rotates
//! daily via `tracing-appender` and can be written as JSON lines, which keeps
//! spread analyses machine-readable for offline inspection.
//!
//! The filter comes from `RUST_LOG` when set, else from the explicit level.

use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Format of the rotating log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Install the global tracing subscriber. Call once at program start.
///
/// - `log_level`: default filter if `RUST_LOG` is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: log file prefix (e.g. `"xarb"`)
pub fn init_logging(
    log_level: &str,
    log_dir: Option<&str>,
    module_name: &str,
    file_format: LogFormat,
) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(true);

    let file_layer = log_dir.map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, module_name);
        let base = fmt::layer()
            .with_writer(appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true);
        match file_format {
            LogFormat::Text => base.boxed(),
            LogFormat::Json => base.json().boxed(),
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("tracing subscriber already installed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("xml".parse::<LogFormat>().unwrap_err().contains("xml"));
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
