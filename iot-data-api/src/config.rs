//! Service configuration.
//!
//! `PROFILE=prod` reads everything from environment variables; any other
//! profile reads a TOML file (`$IOT_API_CONFIG`, default `config.toml`).
//! Keys map one to one: `database.host` in TOML is `DATABASE_HOST` in the
//! environment. The result is an immutable [`Config`] built once at startup.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

pub const PROFILE_ENV: &str = "PROFILE";
pub const CONFIG_PATH_ENV: &str = "IOT_API_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    Prod,
    #[default]
    Local,
}

impl Profile {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("prod") => Profile::Prod,
            _ => Profile::Local,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    pub readiness_timeout_ms: u64,
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Exact-match origin allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub profile: Profile,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cors: CorsConfig,
}

impl Config {
    /// Loads configuration from the source selected by `PROFILE`.
    pub fn load() -> Result<Self> {
        let profile = Profile::from_env_value(std::env::var(PROFILE_ENV).ok().as_deref());
        let raw = match profile {
            Profile::Prod => RawConfig::from_lookup(|key| std::env::var(key).ok())?,
            Profile::Local => {
                let path = std::env::var(CONFIG_PATH_ENV)
                    .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
                RawConfig::from_file(&path)?
            }
        };
        raw.into_config(profile)
    }
}

/// Unvalidated configuration as read from a file or the environment.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub database: RawDatabase,
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub cors: RawCors,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawDatabase {
    pub host: Option<String>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub sslmode: Option<String>,
    pub max_connections: Option<u32>,
    pub max_lifetime_secs: Option<u64>,
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawServer {
    pub port: Option<u16>,
    pub request_timeout_secs: Option<u64>,
    pub readiness_timeout_ms: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCors {
    pub allowed_origins: Option<Vec<String>>,
    pub max_age_secs: Option<u64>,
}

impl RawConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path, e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Builds a raw config from `SECTION_KEY` variables using `lookup`.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(RawConfig {
            database: RawDatabase {
                host: get("DATABASE_HOST"),
                name: get("DATABASE_NAME"),
                user: get("DATABASE_USER"),
                password: get("DATABASE_PASSWORD"),
                port: parse_var("DATABASE_PORT", get("DATABASE_PORT"))?,
                sslmode: get("DATABASE_SSLMODE"),
                max_connections: parse_var(
                    "DATABASE_MAX_CONNECTIONS",
                    get("DATABASE_MAX_CONNECTIONS"),
                )?,
                max_lifetime_secs: parse_var(
                    "DATABASE_MAX_LIFETIME_SECS",
                    get("DATABASE_MAX_LIFETIME_SECS"),
                )?,
                acquire_timeout_secs: parse_var(
                    "DATABASE_ACQUIRE_TIMEOUT_SECS",
                    get("DATABASE_ACQUIRE_TIMEOUT_SECS"),
                )?,
            },
            server: RawServer {
                port: parse_var("SERVER_PORT", get("SERVER_PORT"))?,
                request_timeout_secs: parse_var(
                    "SERVER_REQUEST_TIMEOUT_SECS",
                    get("SERVER_REQUEST_TIMEOUT_SECS"),
                )?,
                readiness_timeout_ms: parse_var(
                    "SERVER_READINESS_TIMEOUT_MS",
                    get("SERVER_READINESS_TIMEOUT_MS"),
                )?,
                shutdown_grace_secs: parse_var(
                    "SERVER_SHUTDOWN_GRACE_SECS",
                    get("SERVER_SHUTDOWN_GRACE_SECS"),
                )?,
            },
            cors: RawCors {
                allowed_origins: get("CORS_ALLOWED_ORIGINS").map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                }),
                max_age_secs: parse_var("CORS_MAX_AGE_SECS", get("CORS_MAX_AGE_SECS"))?,
            },
        })
    }

    /// Applies defaults and checks required fields.
    pub fn into_config(self, profile: Profile) -> Result<Config> {
        let db = self.database;

        let (host, name, user, password, port) =
            match (db.host, db.name, db.user, db.password, db.port) {
                (Some(host), Some(name), Some(user), Some(password), Some(port)) => {
                    (host, name, user, password, port)
                }
                (host, name, user, password, port) => {
                    let missing: Vec<&str> = [
                        ("database.host", host.is_none()),
                        ("database.name", name.is_none()),
                        ("database.user", user.is_none()),
                        ("database.password", password.is_none()),
                        ("database.port", port.is_none()),
                    ]
                    .iter()
                    .filter(|(_, absent)| *absent)
                    .map(|(key, _)| *key)
                    .collect();
                    return Err(Error::Config(format!(
                        "missing required settings: {}",
                        missing.join(", ")
                    )));
                }
            };

        let max_connections = db.max_connections.unwrap_or(25);
        if max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be positive".to_string(),
            ));
        }

        let ssl_mode = db.sslmode.unwrap_or_else(|| "disable".to_string());
        sqlx::postgres::PgSslMode::from_str(&ssl_mode)
            .map_err(|_| Error::Config(format!("invalid database.sslmode '{}'", ssl_mode)))?;

        let cors_defaults = CorsConfig::default();
        let allowed_origins = self
            .cors
            .allowed_origins
            .unwrap_or(cors_defaults.allowed_origins);
        if allowed_origins.iter().any(|origin| origin.contains('*')) {
            return Err(Error::Config(
                "cors.allowed_origins must list exact origins".to_string(),
            ));
        }

        Ok(Config {
            profile,
            database: DatabaseConfig {
                host,
                name,
                user,
                password,
                port,
                ssl_mode,
                max_connections,
                max_lifetime_secs: db.max_lifetime_secs.unwrap_or(300),
                acquire_timeout_secs: db.acquire_timeout_secs.unwrap_or(10),
            },
            server: ServerConfig {
                port: self.server.port.unwrap_or(8080),
                request_timeout_secs: self.server.request_timeout_secs.unwrap_or(30),
                readiness_timeout_ms: self.server.readiness_timeout_ms.unwrap_or(2000),
                shutdown_grace_secs: self.server.shutdown_grace_secs.unwrap_or(5),
            },
            cors: CorsConfig {
                allowed_origins,
                max_age_secs: self.cors.max_age_secs.unwrap_or(cors_defaults.max_age_secs),
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, v)))
        })
        .transpose()
}
