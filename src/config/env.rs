use std::env;
use std::fmt::Display;
use std::str::FromStr;

use super::ServerConfig;
use super::merge::merge_config;
use super::utils::{parse_bool, parse_number};
use super::validation::validate_config;

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with defaults for
    /// everything except credentials. Also loads a `.env` file if present.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        validate_config(&config)?;
        Ok(config)
    }
}

/// Non-empty value of `name`.
pub(super) fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Parsed value of `name`, `None` when unset.
pub(super) fn env_parsed<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    env_string(name)
        .map(|raw| parse_number(name, &raw))
        .transpose()
}

pub(super) fn env_bool(name: &str) -> Result<Option<bool>, String> {
    env_string(name)
        .map(|raw| parse_bool(&raw).ok_or_else(|| format!("Invalid {name} value '{raw}'")))
        .transpose()
}
