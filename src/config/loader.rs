use crate::config::schema::{EngineConfig, ValidationError};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file when no explicit path is given.
pub const CONFIG_ENV_VAR: &str = "STRATEGY_PATCHER_CONFIG";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read engine config from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse engine config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse engine config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid engine config ({}): {}", path.display(), source),
                None => write!(f, "invalid engine config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Resolve the engine config.
///
/// Priority order:
/// 1. Explicit path (the `--config` flag)
/// 2. `STRATEGY_PATCHER_CONFIG` environment variable
/// 3. Built-in defaults
pub fn resolve(explicit: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }

    match env::var_os(CONFIG_ENV_VAR) {
        Some(value) if !value.is_empty() => load_from_path(PathBuf::from(value)),
        _ => Ok(EngineConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = load_from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = load_from_str(
            r#"
[strategy]
base_classes = ["IStrategy", "BaseStrategy"]

[attrs]
whitelist = ["stoploss", "timeframe"]
"#,
        )
        .unwrap();

        assert_eq!(config.strategy.base_classes.len(), 2);
        assert_eq!(config.strategy.indicators_method, "populate_indicators");
        assert!(config.is_whitelisted("timeframe"));
        assert_eq!(config.params.mutable_keywords, vec!["default".to_string()]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_from_str("[params]\nmarker = \"X\"\n");
        assert!(matches!(result, Err(ConfigError::Toml { .. })));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let result = load_from_str("[attrs]\nwhitelist = []\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn load_from_path_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[attrs]\nwhitelist = []\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("engine.toml"));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[params]\nconstructor_marker = \"Param\"\n").unwrap();

        let config = resolve(Some(&path)).unwrap();
        assert_eq!(config.params.constructor_marker, "Param");
    }
}
