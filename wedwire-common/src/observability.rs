//! Shared observability helpers for the binary and integration tests.
//!
//! [`init_logging`] installs one global `tracing` subscriber that writes to a
//! daily rolling file and, optionally, to `stderr`. Call it once near process
//! start; later calls are no-ops that hand back the resolved log file path.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

const LOG_DIR_ENV: &str = "WEDWIRE_LOG_DIR";

/// Output encoding for structured logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration passed to [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Logical name of the component (used for defaults and file names).
    pub app_name: &'static str,
    /// Optional explicit directory for log output. If `None`, we consult
    /// `WEDWIRE_LOG_DIR` and finally fall back to `~/.local/share/<app_name>`.
    pub log_dir: Option<PathBuf>,
    /// Whether to duplicate events to `stderr` in addition to the file sink.
    pub emit_stderr: bool,
    pub format: LogFormat,
    /// Filter applied when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "wedwire",
            log_dir: None,
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "info".to_string(),
        }
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Returns the concrete log file path for the current day.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }

    let dir = log_dir(config.app_name, config.log_dir.as_deref());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let prefix = format!("{}.log", config.app_name);
    let path = dir.join(format!("{prefix}.{}", Local::now().format("%Y-%m-%d")));
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(&dir, &prefix));
    let _ = LOG_GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Sinks are boxed so every format/stderr combination shares one registry type.
    let mut sinks: Vec<BoxedLayer> = Vec::with_capacity(2);
    match config.format {
        LogFormat::Text => {
            sinks.push(fmt::layer().with_writer(file_writer).with_ansi(false).boxed());
            if config.emit_stderr {
                sinks.push(fmt::layer().with_writer(std::io::stderr).boxed());
            }
        }
        LogFormat::Json => {
            sinks.push(fmt::layer().json().with_writer(file_writer).boxed());
            if config.emit_stderr {
                sinks.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
            }
        }
    }

    tracing_subscriber::registry()
        .with(sinks)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    let _ = LOG_PATH.set(path.clone());
    tracing::debug!(
        path = %path.display(),
        format = ?config.format,
        stderr = config.emit_stderr,
        "observability.init"
    );
    Ok(path)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Explicit directory, then `WEDWIRE_LOG_DIR`, then `~/.local/share/<app>`.
fn log_dir(app_name: &str, explicit: Option<&Path>) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(LOG_DIR_ENV).map(PathBuf::from));

    match (configured, home) {
        (Some(dir), Some(home)) => match dir.strip_prefix("~") {
            Ok(rest) => home.join(rest),
            Err(_) => dir,
        },
        (Some(dir), None) => dir,
        (None, Some(home)) => home.join(".local/share").join(app_name),
        (None, None) => PathBuf::from(app_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins_over_env() {
        temp_env::with_var(LOG_DIR_ENV, Some("/tmp/from-env"), || {
            let dir = log_dir("wedwire", Some(Path::new("/var/log/wedwire")));
            assert_eq!(dir, PathBuf::from("/var/log/wedwire"));
        });
    }

    #[test]
    fn tilde_expands_against_home() {
        temp_env::with_vars([("HOME", Some("/home/ops")), (LOG_DIR_ENV, None)], || {
            assert_eq!(
                log_dir("wedwire", Some(Path::new("~/logs"))),
                PathBuf::from("/home/ops/logs")
            );
            assert_eq!(
                log_dir("wedwire", Some(Path::new("logs/x"))),
                PathBuf::from("logs/x")
            );
            assert_eq!(
                log_dir("wedwire", None),
                PathBuf::from("/home/ops/.local/share/wedwire")
            );
        });
    }
}
