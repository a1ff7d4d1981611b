use once_cell::sync::Lazy;
use std::{env, time::Duration};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";

/// Holds all tunables, read-once from ENV with fallbacks.
pub struct Settings {
    pub request_timeout: Duration,
    pub health_check_interval: Duration,
    pub playlist_cache_ttl: Duration,
    pub schedule_cache_ttl: Duration,
    pub user_agent: String,
}

impl Settings {
    fn from_env() -> Self {
        // optionally load .env
        let _ = dotenvy::dotenv();

        // helper to parse seconds into Duration
        fn parse_secs(var: &str, default_secs: u64) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(default_secs))
        }

        Settings {
            request_timeout: parse_secs("CINEMA_REQUEST_TIMEOUT_SECS", 5),
            health_check_interval: parse_secs("CINEMA_HEALTH_INTERVAL_SECS", 30),
            playlist_cache_ttl: parse_secs("CINEMA_PLAYLIST_TTL_SECS", 60 * 60),
            schedule_cache_ttl: parse_secs("CINEMA_SCHEDULE_TTL_SECS", 5 * 60),
            user_agent: env::var("CINEMA_USER_AGENT")
                .ok()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

/// Global settings instance
pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
