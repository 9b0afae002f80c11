use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// Include source file and line in log lines.
    pub src: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            src: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Root of the seeded `v2/repos/...` tree.
    pub data_dir: PathBuf,
    /// `None` (or 0) binds an ephemeral port.
    pub port: Option<u16>,
    /// Interface to bind; `address` in config files.
    #[serde(rename = "address", alias = "host")]
    pub host: String,
    pub logging: LoggingConfig,
}

impl RegistryConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            port: None,
            host: "127.0.0.1".to_string(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Loads the built-in defaults, overlaid by the JSON file at `path` if
    /// one is given.
    ///
    /// Keys missing from the file keep their default. A relative `dataDir` is
    /// taken relative to the directory holding the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self =
            serde_json::from_str(&raw).map_err(|source| RegistryError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        if config.data_dir.is_relative() && !config.data_dir.as_os_str().is_empty() {
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            config.data_dir = base.join(&config.data_dir);
        }
        Ok(config)
    }

    /// Checks the values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(RegistryError::InvalidConfig("dataDir must not be empty".into()));
        }
        if self.host.is_empty() {
            return Err(RegistryError::InvalidConfig("address must not be empty".into()));
        }
        tracing::Level::from_str(&self.logging.level).map_err(|_| {
            RegistryError::InvalidConfig(format!(
                "unknown logging.level {:?}",
                self.logging.level
            ))
        })?;
        Ok(())
    }

    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(0))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new("data").with_host("0.0.0.0").with_port(8080)
    }
}
