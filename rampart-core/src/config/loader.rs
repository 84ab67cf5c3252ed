use crate::error::ConfigError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

use super::{Configurable, Validatable};

/// File syntax, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// `.yaml` or `.yml`
    #[default]
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// `None` for an unknown or missing extension. Case-insensitive.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }

    fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T, String> {
        match self {
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }

    fn render<T: Serialize>(self, value: &T) -> Result<String, String> {
        match self {
            Self::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
            Self::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        }
    }
}

/// Reads a config file, layers `<PREFIX>_*` environment overrides on top and
/// validates the result.
///
/// ```no_run
/// # use rampart_core::config::ConfigLoader;
/// # #[derive(serde::Deserialize)] struct Cfg;
/// # impl rampart_core::config::Validatable for Cfg {
/// #     fn validate(&self) -> Result<(), rampart_core::error::ConfigError> { Ok(()) }
/// # }
/// # impl rampart_core::config::Configurable for Cfg {
/// #     fn apply_env_overrides(&mut self, _: &str) {}
/// #     fn env_var_names(_: &str) -> Vec<String> { Vec::new() }
/// # }
/// let config: Cfg = ConfigLoader::new()
///     .with_env_prefix("RAMPART")
///     .load_validated("rampart.yaml")?;
/// # Ok::<(), rampart_core::error::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// A loader that applies no environment overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables overrides from variables named `<prefix>_...`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Parses `path` without overrides or validation.
    pub fn load_file<T, P>(&self, path: P) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::InvalidFormat {
            path: shown.clone(),
            reason: "expected a .yaml, .yml, .toml or .json extension".to_string(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: shown.clone(),
            reason: e.to_string(),
        })?;
        parse_from(&content, format, &shown)
    }

    /// Parses in-memory text.
    pub fn load_str<T>(&self, content: &str, format: ConfigFormat) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        parse_from(content, format, "<inline>")
    }

    /// [`load_file`](Self::load_file), then overrides, then validation.
    pub fn load_validated<T, P>(&self, path: P) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Validatable + Configurable,
        P: AsRef<Path>,
    {
        let mut config: T = self.load_file(path)?;
        if let Some(prefix) = self.env_prefix.as_deref() {
            config.apply_env_overrides(prefix);
        }
        config.validate()?;
        Ok(config)
    }

    /// Renders an effective configuration, e.g. for `--validate` output.
    pub fn serialize<T: Serialize>(config: &T, format: ConfigFormat) -> Result<String, ConfigError> {
        format.render(config).map_err(|reason| ConfigError::InvalidFormat {
            path: "<output>".to_string(),
            reason: format!("cannot write {}: {reason}", format.name()),
        })
    }
}

fn parse_from<T: DeserializeOwned>(
    content: &str,
    format: ConfigFormat,
    origin: &str,
) -> Result<T, ConfigError> {
    format.parse(content).map_err(|reason| ConfigError::InvalidFormat {
        path: origin.to_string(),
        reason: format!("{} {reason}", format.name()),
    })
}
