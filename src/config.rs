use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Interval between SSE keep-alive comment lines.
    pub heartbeat_interval: Duration,
    /// Maximum time a long-poll request is held open before it resolves no-op.
    pub poll_hold: Duration,
    /// Delay between a stream going dead and its sink leaving the registry.
    pub sink_close_grace: Duration,
    /// Event keys to pre-register at startup (comma separated).
    pub seed_event_keys: Vec<String>,
}

impl Config {
    fn parse_keys(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let heartbeat_secs: u64 = env::var("HEARTBEAT_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let poll_hold_secs: u64 = env::var("POLL_HOLD_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        let sink_close_grace_ms: u64 = env::var("SINK_CLOSE_GRACE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let seed_event_keys = env::var("SEED_EVENT_KEYS")
            .map(|v| Self::parse_keys(&v))
            .unwrap_or_default();

        if heartbeat_secs == 0 {
            return Err(AppError::Config(
                "HEARTBEAT_INTERVAL_SECS must be positive".into(),
            ));
        }
        if poll_hold_secs == 0 {
            return Err(AppError::Config("POLL_HOLD_SECS must be positive".into()));
        }

        Ok(Self {
            port,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            poll_hold: Duration::from_secs(poll_hold_secs),
            sink_close_grace: Duration::from_millis(sink_close_grace_ms),
            seed_event_keys,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            heartbeat_interval: Duration::from_secs(30),
            poll_hold: Duration::from_secs(60),
            sink_close_grace: Duration::from_millis(1000),
            seed_event_keys: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keys_splits_and_trims() {
        let keys = Config::parse_keys(" EVT01 , evt02,,DEMO ");
        assert_eq!(keys, vec!["EVT01", "evt02", "DEMO"]);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.poll_hold, Duration::from_secs(60));
        assert_eq!(cfg.sink_close_grace, Duration::from_millis(1000));
    }
}
