//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{LogFormat, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "CONFIG_PATH";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value `{value}` for {var}")]
    Env { var: &'static str, value: String },
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then process environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse a TOML config file without applying overrides or validation.
pub fn read_config_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply recognized environment variables on top of `config`.
///
/// Empty values are ignored so an exported-but-blank variable does not wipe a
/// value from the file.
pub fn apply_env_overrides<I>(config: &mut ProxyConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if value.trim().is_empty() {
            continue;
        }
        match key.as_str() {
            "PORT" => config.listener.port = parse_var("PORT", &value)?,
            "BIND_HOST" => config.listener.host = value,
            "UPSTREAM_URL" => config.upstream.url = value,
            "UPSTREAM_API_KEY" => config.upstream.api_key = value,
            "MAX_BODY_BYTES" => config.limits.max_body_bytes = parse_var("MAX_BODY_BYTES", &value)?,
            "UPSTREAM_TIMEOUT_MS" => {
                config.timeouts.upstream_ms = parse_var("UPSTREAM_TIMEOUT_MS", &value)?
            }
            "CLIENT_TIMEOUT_MS" => {
                config.timeouts.client_idle_ms = parse_var("CLIENT_TIMEOUT_MS", &value)?
            }
            "TELEMETRY_DB_PATH" => config.telemetry.db_path = value,
            "LOG_LEVEL" => config.observability.log_level = value,
            "LOG_FORMAT" => {
                config.observability.log_format = match value.to_ascii_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::Env { var: "LOG_FORMAT", value }),
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
