//! TOML configuration with CLI overrides.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub runtime: RuntimeSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            host: "localhost".to_string(),
            port: salix_common::protocol::DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    pub invoke_timeout_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        RuntimeSection {
            invoke_timeout_ms: 5000,
            tick_interval_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file falls back to the defaults so the
    /// server runs without any configuration on disk.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Config::default());
            }
            Err(e) => return Err(format!("cannot read {}: {e}", path.display())),
        };
        toml::from_str(&text).map_err(|e| format!("cannot parse {}: {e}", path.display()))
    }

    pub fn settings(&self) -> salix_common::CoordinatorSettings {
        salix_common::CoordinatorSettings {
            invoke_timeout: Duration::from_millis(self.runtime.invoke_timeout_ms),
            tick_interval: Duration::from_millis(self.runtime.tick_interval_ms),
        }
    }
}
