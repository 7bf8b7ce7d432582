use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Period of the session clock. One tick adds one second of elapsed time.
    pub tick_interval_ms: u64,
    /// Live sessions are written back to the store every N ticks.
    pub flush_every_ticks: u64,
    /// Active sessions untouched for this long leave memory after a flush.
    pub idle_eviction_secs: u64,
}

pub const DEFAULT_IDLE_EVICTION_SECS: u64 = 30 * 60;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            flush_every_ticks: 30,
            idle_eviction_secs: DEFAULT_IDLE_EVICTION_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub sync: SyncConfig,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then a local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml + APP__* overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "treasurehunt".to_string());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if env == "prod" => {
                return Err(config::ConfigError::NotFound(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            tick_interval_ms: read_u64(&settings, "sync.tick_interval_ms", "SYNC_TICK_INTERVAL_MS")
                .unwrap_or(defaults.tick_interval_ms),
            flush_every_ticks: read_u64(
                &settings,
                "sync.flush_every_ticks",
                "SYNC_FLUSH_EVERY_TICKS",
            )
            .unwrap_or(defaults.flush_every_ticks),
            idle_eviction_secs: read_u64(
                &settings,
                "sync.idle_eviction_secs",
                "SYNC_IDLE_EVICTION_SECS",
            )
            .unwrap_or(defaults.idle_eviction_secs),
        };

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            bind_addr,
            sync,
        })
    }
}

fn read_u64(settings: &config::Config, key: &str, env_key: &str) -> Option<u64> {
    settings
        .get_int(key)
        .ok()
        .and_then(|value| u64::try_from(value).ok())
        .or_else(|| env::var(env_key).ok().and_then(|v| v.parse::<u64>().ok()))
        .filter(|value| *value > 0)
}
