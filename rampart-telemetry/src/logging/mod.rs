//! Structured logging.
//!
//! Stdout and file outputs share one `EnvFilter`; `RUST_LOG` takes precedence
//! over the configured level.

mod config;

pub use config::{LogConfig, LogDetail, LogFormat, LogOutput, Rotation};

use rampart_core::config::Validatable;
use rampart_core::error::ConfigError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Initializes the global subscriber.
///
/// The returned guards flush buffered file output when dropped and must be
/// held for the lifetime of the process.
///
/// # Example
///
/// ```no_run
/// use rampart_telemetry::logging::{init_logging, LogConfig};
///
/// let _guards = init_logging(&LogConfig::default()).expect("logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Vec<WorkerGuard>, LoggingError> {
    config
        .validate()
        .map_err(|e| LoggingError::InvalidConfig(e.to_string()))?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| LoggingError::InvalidConfig(e.to_string()))?;

    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer<_>> = Vec::new();

    for output in &config.outputs {
        match output {
            LogOutput::Stdout => layers.push(stdout_layer(config)),
            LogOutput::File {
                dir,
                prefix,
                rotation,
            } => {
                std::fs::create_dir_all(dir)?;
                let (layer, guard) = file_layer(config.detail, dir, prefix, *rotation);
                layers.push(layer);
                guards.push(guard);
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guards)
}

fn span_events(detail: LogDetail) -> FmtSpan {
    if detail.spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

fn stdout_layer<S>(config: &LogConfig) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let detail = config.detail;
    let base = fmt::layer()
        .with_target(true)
        .with_thread_ids(detail.thread_ids)
        .with_file(detail.source_location)
        .with_line_number(detail.source_location)
        .with_span_events(span_events(detail));

    match config.format {
        LogFormat::Json => base.json().flatten_event(true).boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    }
}

fn file_layer<S>(
    detail: LogDetail,
    dir: &str,
    prefix: &str,
    rotation: Rotation,
) -> (BoxedLayer<S>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = match rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        Rotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        Rotation::Never => tracing_appender::rolling::never(dir, prefix),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(detail.thread_ids)
        .with_file(detail.source_location)
        .with_line_number(detail.source_location)
        .with_span_events(span_events(detail))
        .json()
        .flatten_event(true)
        .boxed();

    (layer, guard)
}

impl Validatable for LogConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.outputs.is_empty() {
            return Err(ConfigError::invalid_value(
                "logging.outputs",
                "at least one output is required",
            ));
        }
        if EnvFilter::try_new(&self.level).is_err() {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!("'{}' is not a valid filter directive", self.level),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create log directory
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid logging configuration: {0}")]
    InvalidConfig(String),

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_outputs() {
        let config = LogConfig {
            outputs: Vec::new(),
            ..LogConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_directives() {
        let config = LogConfig {
            level: "info,rampart_trainer=debug".to_string(),
            ..LogConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_init_logging_rejects_invalid_config() {
        let config = LogConfig {
            outputs: Vec::new(),
            ..LogConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::InvalidConfig(_))
        ));
    }
}
