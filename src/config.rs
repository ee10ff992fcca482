use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Portal host used when `COES_BASE_URL` is not set
pub const DEFAULT_BASE_URL: &str = "https://www.coes.org.pe";

/// Timeout for the three generation-meter requests
pub const METERS_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for the executed-demand request
pub const DEMAND_TIMEOUT: Duration = Duration::from_secs(90);

/// Connection and retry settings for the portal session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub base_url: String,
    /// Idle keep-alive sockets kept per host for reuse. This does not cap
    /// concurrent connections; requests are sequential anyway.
    pub pool_max_idle: usize,
    /// Extra attempts after a transport failure
    pub max_retries: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            pool_max_idle: 15,
            max_retries: 3,
        }
    }
}

impl PortalConfig {
    /// Read the configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            base_url: lookup("COES_BASE_URL").unwrap_or(defaults.base_url),
            pool_max_idle: parse_or("COES_POOL_MAX_IDLE", &lookup, defaults.pool_max_idle),
            max_retries: parse_or("COES_MAX_RETRIES", &lookup, defaults.max_retries),
        }
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: FromStr + Display + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}
