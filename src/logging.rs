use std::fs;

use anyhow::Context;
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LogConfig;

pub const LOG_FILE_NAME: &str = "homestock.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background file writer alive. Dropping it flushes pending lines.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER))
}

fn stdout_layer(config: &LogConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339());
    if config.json {
        layer.json().with_filter(filter(config)).boxed()
    } else {
        layer.with_filter(filter(config)).boxed()
    }
}

fn file_layer(config: &LogConfig) -> anyhow::Result<Option<(BoxedLayer, WorkerGuard)>> {
    let Some(dir) = config.dir.as_ref() else {
        return Ok(None);
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;

    let writer = FileRotate::new(
        dir.join(LOG_FILE_NAME),
        AppendCount::new(config.max_files.max(1)),
        ContentLimit::BytesSurpassed(config.max_size_bytes.max(1024)),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);
    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(non_blocking)
        .with_filter(filter(config))
        .boxed();
    Ok(Some((layer, guard)))
}

/// Install the global subscriber: stdout plus an optional rotating JSON file.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<LoggingGuard> {
    let _ = tracing_log::LogTracer::init();

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer(config)];
    let mut guard = None;
    if let Some((layer, file_guard)) = file_layer(config)? {
        layers.push(layer);
        guard = Some(file_guard);
    }

    if tracing_subscriber::registry().with(layers).try_init().is_err() {
        tracing::debug!(target: "homestock", event = "logging_already_initialized");
    }

    Ok(LoggingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_falls_back() {
        let config = LogConfig {
            filter: "[[not a filter".into(),
            ..LogConfig::default()
        };
        let rendered = filter(&config).to_string();
        assert!(rendered.contains("homestock=info"));
    }

    #[test]
    fn file_layer_creates_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("logs");
        let config = LogConfig {
            dir: Some(dir.clone()),
            ..LogConfig::default()
        };
        let built = file_layer(&config).expect("file layer");
        assert!(built.is_some());
        assert!(dir.is_dir());
    }
}
