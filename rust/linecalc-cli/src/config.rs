//! `linecalc.toml` loading: the only settings a collaborator can pin ahead
//! of time are precision and the system timezone used to resolve bare
//! dates/times.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_NAME: &str = "linecalc.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("precision must be between 0 and 20, got {0}")]
    PrecisionOutOfRange(u32),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default)]
    pub system_timezone: Option<String>,
}

fn default_precision() -> u32 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            system_timezone: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from `./linecalc.toml` if `path` is `None` and
    /// that file exists, or the default config otherwise.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_NAME),
        };
        if path.is_none() && !resolved.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(&resolved).map_err(|source| ConfigError::Read {
            path: resolved.clone(),
            source,
        })?;
        let cfg: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: resolved.clone(),
            source,
        })?;
        if cfg.precision > 20 {
            return Err(ConfigError::PrecisionOutOfRange(cfg.precision));
        }
        Ok(cfg)
    }

    /// The timezone to hand `EvaluationContext`: the config value if set,
    /// else the OS timezone, else `"UTC"`.
    pub fn resolved_timezone(&self) -> String {
        self.system_timezone.clone().unwrap_or_else(|| {
            iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_full_precision() {
        let cfg = Config::default();
        assert_eq!(cfg.precision, 20);
        assert!(cfg.system_timezone.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.precision, 20);
    }

    #[test]
    fn rejects_out_of_range_precision() {
        let dir = std::env::temp_dir().join(format!("linecalc-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "precision = 99\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::PrecisionOutOfRange(99)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
