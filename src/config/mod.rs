use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub bcrypt_cost: u32,
    pub cors_origin: Option<String>,
    pub relay_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "memory://".into(),
            redis_url: None,
            server_host: "0.0.0.0".into(),
            server_port: 5000,
            api_base_uri: "/api".into(),
            db_max_connections: 10,
            db_acquire_timeout_secs: 30,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            cors_origin: None,
            relay_buffer: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            redis_url: optional("REDIS_URL"),
            server_host: optional("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parsed("SERVER_PORT", defaults.server_port)?,
            api_base_uri: optional("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_acquire_timeout_secs: parsed(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.db_acquire_timeout_secs,
            )?,
            rate_limit_window_secs: parsed("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs)?,
            rate_limit_requests: parsed("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests)?,
            bcrypt_cost: parsed("BCRYPT_COST", defaults.bcrypt_cost)?,
            cors_origin: optional("CORS_ORIGIN"),
            relay_buffer: parsed("RELAY_BUFFER", defaults.relay_buffer)?,
        })
    }

    /// `memory://` 使用进程内存储，不连接数据库
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory:")
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
