use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub(crate) const CONFIG_FILE_NAME: &str = "server.json";
pub(crate) const TICK_MS_ENV_VAR: &str = "ZONE_ENGINE_TICK_MS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) tick_ms: u64,
    /// Game ticks between zone pulses.
    pub(crate) ticks_per_zone_pulse: u32,
    /// Zone pulses that make one game minute of zone aging.
    pub(crate) zone_pulses_per_minute: u32,
    pub(crate) max_ticks_per_wake: u32,
    pub(crate) boot_reset: bool,
    pub(crate) exit_on_input_close: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            ticks_per_zone_pulse: 10,
            zone_pulses_per_minute: 60,
            max_ticks_per_wake: 5,
            boot_reset: true,
            exit_on_input_close: true,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{var}={value} is not a positive number of milliseconds")]
    InvalidEnv { var: &'static str, value: String },
}

impl ServerConfig {
    /// Defaults, overlaid by `<root>/server.json` when present, then by
    /// `ZONE_ENGINE_TICK_MS`.
    pub(crate) fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut config = match fs::read_to_string(&path) {
            Ok(raw) => Self::parse(&path, &raw)?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        if let Ok(raw) = std::env::var(TICK_MS_ENV_VAR) {
            config.tick_ms = parse_tick_ms(&raw)?;
        }
        Ok(config)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, Self>(&mut deserializer).map_err(|error| {
            let field = error.path().to_string();
            ConfigError::Parse {
                path: path.to_path_buf(),
                field: if field.is_empty() { ".".to_string() } else { field },
                source: error.into_inner(),
            }
        })
    }

    pub(crate) fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

fn parse_tick_ms(raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| ConfigError::InvalidEnv {
            var: TICK_MS_ENV_VAR,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().expect("temp");
        let config = ServerConfig::parse(&temp.path().join(CONFIG_FILE_NAME), "{}").expect("parse");
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let path = Path::new(CONFIG_FILE_NAME);
        let config =
            ServerConfig::parse(path, r#"{"tick_ms": 50, "boot_reset": false}"#).expect("parse");
        assert_eq!(config.tick_ms, 50);
        assert!(!config.boot_reset);
        assert_eq!(config.ticks_per_zone_pulse, 10);
    }

    #[test]
    fn bad_field_names_the_path() {
        let path = Path::new(CONFIG_FILE_NAME);
        let err = ServerConfig::parse(path, r#"{"tick_ms": "fast"}"#).expect_err("bad value");
        match err {
            ConfigError::Parse { field, .. } => assert_eq!(field, "tick_ms"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn tick_env_value_must_be_positive() {
        assert_eq!(parse_tick_ms(" 25 ").expect("valid"), 25);
        assert!(parse_tick_ms("0").is_err());
        assert!(parse_tick_ms("soon").is_err());
    }
}
