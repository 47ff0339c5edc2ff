use crate::error::{AppError, Result};
use log::{info, warn};
use std::{env, fmt::Display, path::PathBuf, str::FromStr};

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    /// Unset means the embedded sled store holds users and searches.
    pub record_store_url: Option<String>,
    pub catalog_api_url: String,
    pub catalog_api_key: String,
    pub catalog_language: String,
    pub session_ttl_secs: i64,
    pub session_secret: Option<String>,
    pub bcrypt_cost: u32,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            bind_addr: try_load("BIND_ADDR", "127.0.0.1:8080")?,
            data_dir: try_load("DATA_DIR", "./data")?,
            record_store_url: optional("RECORD_STORE_URL"),
            catalog_api_url: try_load("CATALOG_API_URL", "https://api.themoviedb.org/3")?,
            catalog_api_key: required("CATALOG_API_KEY")?,
            catalog_language: try_load("CATALOG_LANGUAGE", "en-US")?,
            session_ttl_secs: try_load("SESSION_TTL_SECS", "604800")?,
            session_secret: optional("SESSION_SECRET"),
            bcrypt_cost: try_load("BCRYPT_COST", "12")?,
            http_timeout_secs: try_load("HTTP_TIMEOUT_SECS", "10")?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| AppError::Config(format!("{} must be set", key)))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let value = optional(key).unwrap_or_else(|| {
        info!("{} not set, using default: {}", key, default);
        default.to_owned()
    });
    value.parse().map_err(|err: T::Err| {
        warn!("Invalid {} value: {}", key, err);
        AppError::Config(format!("invalid {}: {}", key, err))
    })
}
