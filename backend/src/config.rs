use std::str::FromStr;

use anyhow::{Context as _, Result};

use crate::auth::DEFAULT_HASH_ROUNDS;

/// Connection settings that only make sense for a networked database server.
const SERVER_DB_KEYS: [&str; 4] = ["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD"];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub pool_size: u32,
    pub hash_rounds: u32,
}

impl Config {
    /// Reads the process environment, after merging in a `.env` file if
    /// one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => {
                let name = lookup("DB_NAME").unwrap_or_else(|| "co2meter".to_owned());
                format!("{name}.sqlite3")
            }
        };

        for key in SERVER_DB_KEYS {
            if lookup(key).is_some() {
                log::warn!("{key} is set but ignored, the database is a local SQLite file");
            }
        }

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse(&lookup, "PORT", 5000)?,
            cors_origin: lookup("CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_owned()),
            pool_size: parse(&lookup, "DB_POOL_SIZE", 8)?,
            hash_rounds: parse(&lookup, "PASSWORD_HASH_ROUNDS", DEFAULT_HASH_ROUNDS)?,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
