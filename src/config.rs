use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::currency::DEFAULT_API_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub currency_api_url: String,
    pub base_currency: String,
    pub target_currency: String,
    pub http_timeout: Duration,
}

impl Config {
    /// Reads `VITESSE_*` variables, falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`], with variables resolved through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_path = match var("VITESSE_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => Self::default_db_path(),
        };
        let timeout_secs = match var("VITESSE_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid VITESSE_HTTP_TIMEOUT_SECS value: {raw}"))?,
            None => 10,
        };

        Ok(Self {
            database_path,
            currency_api_url: var("VITESSE_CURRENCY_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            base_currency: var("VITESSE_BASE_CURRENCY")
                .unwrap_or_else(|| "eur".to_string())
                .to_lowercase(),
            target_currency: var("VITESSE_TARGET_CURRENCY")
                .unwrap_or_else(|| "gbp".to_string())
                .to_lowercase(),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn default_db_path() -> PathBuf {
        // XDG data directory, or the working directory when there is no home
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "vitesse") {
            proj_dirs.data_dir().join("vitesse.db")
        } else {
            PathBuf::from("vitesse.db")
        }
    }
}
