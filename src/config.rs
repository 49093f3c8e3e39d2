use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub secret_key: Option<String>,
    pub cors_origin: String,
    pub mirror: MirrorConfig,
}

/// Connection settings for the remote table store. Either credential missing
/// leaves the mirror disabled.
#[derive(Clone, Debug, Default)]
pub struct MirrorConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub queue_capacity: usize,
}

impl MirrorConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.url.as_deref(), self.key.as_deref()) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some((url, key))
            }
            _ => None,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self {
            bind_addr: try_load("BIND_ADDR", "0.0.0.0:8000"),
            database_url: try_load("DATABASE_URL", "sqlite://vetclinic.sqlite3?mode=rwc"),
            secret_key: optional("SECRET_KEY"),
            cors_origin: try_load("CORS_ORIGIN", "http://localhost:3000"),
            mirror: MirrorConfig::load(),
        }
    }
}

impl MirrorConfig {
    pub fn load() -> Self {
        Self {
            url: optional("SUPABASE_URL"),
            key: optional("SUPABASE_KEY"),
            max_attempts: try_load("MIRROR_MAX_ATTEMPTS", "3"),
            retry_backoff: Duration::from_millis(try_load("MIRROR_RETRY_BACKOFF_MS", "500")),
            queue_capacity: try_load("MIRROR_QUEUE_CAPACITY", "1024"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror(url: Option<&str>, key: Option<&str>) -> MirrorConfig {
        MirrorConfig {
            url: url.map(str::to_string),
            key: key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn credentials_need_both_values() {
        assert!(mirror(None, None).credentials().is_none());
        assert!(mirror(Some("https://x.supabase.co"), None).credentials().is_none());
        assert!(mirror(None, Some("anon")).credentials().is_none());
        assert!(mirror(Some("  "), Some("anon")).credentials().is_none());
        assert_eq!(
            mirror(Some("https://x.supabase.co"), Some("anon")).credentials(),
            Some(("https://x.supabase.co", "anon"))
        );
    }
}
