use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordPolicyConfig {
    pub min_length: usize,
    pub max_similarity: f64,
    pub reject_common: bool,
    pub reject_numeric: bool,
    pub reject_similar: bool,
    /// Replaces the built-in common password list when set.
    pub common_passwords_file: Option<String>,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_similarity: 0.7,
            reject_common: true,
            reject_numeric: true,
            reject_similar: true,
            common_passwords_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub password_policy: PasswordPolicyConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let store = match std::env::var("STORE_BACKEND") {
            Ok(v) => parse_backend(&v)?,
            Err(_) if database_url.is_some() => StoreBackend::Postgres,
            Err(_) => StoreBackend::Memory,
        };
        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when STORE_BACKEND=postgres");
        }

        let defaults = PasswordPolicyConfig::default();
        let password_policy = PasswordPolicyConfig {
            min_length: env_or("PASSWORD_MIN_LENGTH", defaults.min_length)?,
            max_similarity: env_or("PASSWORD_MAX_SIMILARITY", defaults.max_similarity)?,
            reject_common: env_or("PASSWORD_REJECT_COMMON", defaults.reject_common)?,
            reject_numeric: env_or("PASSWORD_REJECT_NUMERIC", defaults.reject_numeric)?,
            reject_similar: env_or("PASSWORD_REJECT_SIMILAR", defaults.reject_similar)?,
            common_passwords_file: std::env::var("COMMON_PASSWORDS_FILE").ok(),
        };

        Ok(Self {
            store,
            database_url,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080)?,
            password_policy,
        })
    }

    /// Configuration for tests and local runs without any environment.
    pub fn in_memory() -> Self {
        Self {
            store: StoreBackend::Memory,
            database_url: None,
            max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            password_policy: PasswordPolicyConfig::default(),
        }
    }
}

fn parse_backend(value: &str) -> anyhow::Result<StoreBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
        "memory" => Ok(StoreBackend::Memory),
        other => anyhow::bail!("unknown STORE_BACKEND {other:?}, expected postgres or memory"),
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {v:?}")),
        Err(_) => Ok(default),
    }
}
