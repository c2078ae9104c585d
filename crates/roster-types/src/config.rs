//! Runtime configuration read from `ROSTER_*` environment variables.

use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "roster.db";
pub const DEFAULT_USER_TABLE: &str = "User";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ACTIVATION_URL: &str = "http://localhost:3000/users/activate";
pub const DEFAULT_EMAIL_SENDER: &str = "no-reply@localhost";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid port: {value:?}")]
    InvalidPort { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    /// Passed through as given, even when blank.
    pub user_table: String,
    pub host: String,
    pub port: u16,
    pub activation_url: String,
    pub email_sender: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let port = match lookup("ROSTER_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidPort {
                name: "ROSTER_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            db_path: var("ROSTER_DB_PATH", DEFAULT_DB_PATH).into(),
            user_table: var("ROSTER_USER_TABLE", DEFAULT_USER_TABLE),
            host: var("ROSTER_HOST", DEFAULT_HOST),
            port,
            activation_url: var("ROSTER_ACTIVATION_URL", DEFAULT_ACTIVATION_URL),
            email_sender: var("ROSTER_EMAIL_SENDER", DEFAULT_EMAIL_SENDER),
        })
    }
}
