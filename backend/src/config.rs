use std::{env, fmt::Display, str::FromStr};
use thiserror::Error;
use tracing::{info, warn};
use shared::identity::IdentityPolicy;
use crate::utils::normalize_database_url;

const DEFAULT_MAX_CONNECTIONS: &str = "5";
const DEFAULT_ALLOWED_ORIGIN: &str = "*";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be set (use \"memory\" for a non-durable local store)")]
    Missing { key: &'static str },
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Memory,
    Postgres(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageTarget,
    pub admin_secret: Option<String>,
    pub identity: IdentityPolicy,
    pub allowed_origin: String,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` feeds it the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let storage = match lookup("DATABASE_URL").map(|url| url.trim().to_string()) {
            Some(url) if url == "memory" => {
                warn!("DATABASE_URL=memory, votes are kept in memory and lost on restart");
                StorageTarget::Memory
            }
            Some(url) if !url.is_empty() => StorageTarget::Postgres(normalize_database_url(&url)),
            _ => return Err(ConfigError::Missing { key: "DATABASE_URL" }),
        };

        let admin_secret = lookup("ADMIN_SECRET").filter(|s| !s.trim().is_empty());
        if admin_secret.is_none() {
            warn!("ADMIN_SECRET not set - the reset endpoint is disabled");
        }

        Ok(Self {
            storage,
            admin_secret,
            identity: parse_or_default(&lookup, "VOTER_IDENTITY", "client-token")?,
            allowed_origin: lookup("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string()),
            max_connections: parse_or_default(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        })
    }
}

fn parse_or_default<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}
