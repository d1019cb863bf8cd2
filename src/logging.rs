use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::app::{EventLevel, ProgressEvent, ProgressSink};
use crate::error::HarvestError;

/// Forwards progress events to the global `tracing` subscriber.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        let ProgressEvent {
            level,
            message,
            elapsed,
        } = event;
        match (level, elapsed) {
            (EventLevel::Info, Some(elapsed)) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{message}")
            }
            (EventLevel::Info, None) => tracing::info!("{message}"),
            (EventLevel::Warn, _) => tracing::warn!("{message}"),
            (EventLevel::Error, _) => tracing::error!("{message}"),
        }
    }
}

pub fn log_file_path(log_dir: &Utf8Path, timestamp: &str) -> Utf8PathBuf {
    log_dir.join(format!("{timestamp}_nps_in_genera.log"))
}

/// Installs the global subscriber writing to stderr and to a per-run log file.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(log_dir: &Utf8Path, timestamp: &str) -> Result<Utf8PathBuf, HarvestError> {
    fs::create_dir_all(log_dir.as_std_path())
        .map_err(|err| HarvestError::Logging(format!("create {log_dir}: {err}")))?;
    let path = log_file_path(log_dir, timestamp);
    let file = fs::File::create(path.as_std_path())
        .map_err(|err| HarvestError::Logging(format!("create {path}: {err}")))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Arc::new(file)))
        .try_init()
        .map_err(|err| HarvestError::Logging(err.to_string()))?;
    Ok(path)
}
