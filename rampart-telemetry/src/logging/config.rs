use serde::{Deserialize, Serialize};

/// `logging:` section.
///
/// ```yaml
/// logging:
///   level: info,rampart_risk=debug
///   format: pretty
///   detail: { thread_ids: true }
///   outputs:
///     - type: stdout
///     - type: file
///       dir: ./logs
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Stdout encoding. Files are always JSON.
    #[serde(default)]
    pub format: LogFormat,

    /// At least one is required
    #[serde(default = "default_outputs")]
    pub outputs: Vec<LogOutput>,

    /// Extra per-line metadata
    #[serde(default)]
    pub detail: LogDetail,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            outputs: default_outputs(),
            detail: LogDetail::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_outputs() -> Vec<LogOutput> {
    vec![LogOutput::Stdout]
}

fn default_prefix() -> String {
    "rampart.log".to_string()
}

/// Extra metadata attached to every line. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogDetail {
    /// Emitting thread id
    pub thread_ids: bool,
    /// Source file and line
    pub source_location: bool,
    /// Span open and close as their own lines
    pub spans: bool,
}

/// Stdout encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line, human oriented
    Pretty,
}

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output in the configured format
    Stdout,
    /// Rolling file in `dir`, named `<prefix>.<period>`
    File {
        /// Created if missing
        dir: String,
        /// File name before the period suffix
        #[serde(default = "default_prefix")]
        prefix: String,
        /// Rollover period
        #[serde(default)]
        rotation: Rotation,
    },
}

/// How often a file output starts a new file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    /// New file every hour
    Hourly,
    /// New file every day
    #[default]
    Daily,
    /// One file forever
    Never,
}
