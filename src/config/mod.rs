use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORAGE_ROOT: &str = "./storage";
const DEFAULT_PUBLIC_STORAGE_URL: &str = "http://localhost:3001/storage";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub storage_root: PathBuf,
    pub public_storage_url: String,
    pub request_timeout: Duration,
    pub session_ttl: chrono::Duration,
    pub cors_allowed_origins: Vec<String>,
    /// `RUST_ENV=production`; enables HSTS.
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            ),
            bind_addr: lookup("BIND_ADDR")
                .and_then(|raw| parse_logged("BIND_ADDR", &raw))
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))),
            storage_root: lookup("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            public_storage_url: lookup("PUBLIC_STORAGE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_STORAGE_URL.to_string()),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            session_ttl: session_ttl(&lookup),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| cors::DEFAULT_ALLOWED_ORIGINS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            production: lookup("RUST_ENV")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("production")),
        }
    }
}

fn parse_logged<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Config: invalid value '{}' for {}, using default", raw, key);
            None
        }
    }
}

/// `SESSION_TTL_HOURS` must be positive and representable as a duration.
fn session_ttl(lookup: &impl Fn(&str) -> Option<String>) -> chrono::Duration {
    let default = chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS);
    let Some(hours) = lookup("SESSION_TTL_HOURS")
        .and_then(|raw| parse_logged::<i64>("SESSION_TTL_HOURS", &raw))
    else {
        return default;
    };
    match chrono::Duration::try_hours(hours).filter(|_| hours > 0) {
        Some(ttl) => ttl,
        None => {
            tracing::warn!(
                "Config: SESSION_TTL_HOURS must be a positive number of hours, got {}, using default",
                hours
            );
            default
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|raw| parse_logged(key, &raw))
        .unwrap_or(default)
}
