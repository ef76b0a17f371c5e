//! Runtime settings read from `DATA_SWEEPER_*` environment variables.
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_HOST: &str = "DATA_SWEEPER_HOST";
pub const ENV_PORT: &str = "DATA_SWEEPER_PORT";
pub const ENV_PREVIEW_ROWS: &str = "DATA_SWEEPER_PREVIEW_ROWS";
pub const ENV_MAX_UPLOAD_MB: &str = "DATA_SWEEPER_MAX_UPLOAD_MB";
pub const ENV_SESSION_TTL_SECS: &str = "DATA_SWEEPER_SESSION_TTL_SECS";
pub const ENV_MAX_SESSIONS: &str = "DATA_SWEEPER_MAX_SESSIONS";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {name}: {message}")]
    InvalidValue { name: &'static str, value: String, message: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Rows shown in each file preview
    pub preview_rows: usize,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
    /// Idle time after which a session is dropped, 0 keeps sessions forever
    pub session_ttl: Duration,
    /// Sessions kept at once, the least recently used go first; 0 means no limit
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_owned(),
            port: 8501,
            preview_rows: 5,
            max_upload_bytes: 200 * 1024 * 1024,
            session_ttl: Duration::from_secs(60 * 60),
            max_sessions: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a configuration from any variable source; unset variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let defaults = Config::default();
        let host = lookup(ENV_HOST)
            .map(|host| host.trim().to_owned())
            .filter(|host| !host.is_empty())
            .unwrap_or(defaults.host);
        let port = parse(&lookup, ENV_PORT)?.unwrap_or(defaults.port);
        let preview_rows = parse(&lookup, ENV_PREVIEW_ROWS)?.unwrap_or(defaults.preview_rows);
        let max_upload_bytes = match parse::<usize>(&lookup, ENV_MAX_UPLOAD_MB)? {
            Some(0) => Err(ConfigError::InvalidValue {
                name: ENV_MAX_UPLOAD_MB,
                value: "0".to_owned(),
                message: "must be at least 1".to_owned(),
            })?,
            Some(megabytes) => megabytes.saturating_mul(1024 * 1024),
            None => defaults.max_upload_bytes,
        };
        let session_ttl = parse(&lookup, ENV_SESSION_TTL_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);
        let max_sessions = parse(&lookup, ENV_MAX_SESSIONS)?.unwrap_or(defaults.max_sessions);
        Ok(Config {
            host,
            port,
            preview_rows,
            max_upload_bytes,
            session_ttl,
            max_sessions,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    lookup(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|error| ConfigError::InvalidValue {
                name,
                value: value.to_owned(),
                message: error.to_string(),
            })
        })
        .transpose()
}
