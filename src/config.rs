//! Application-level configuration loading, including session timings and the card batch size.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BINGO_BACK_CONFIG_PATH";

const DEFAULT_COUNTDOWN_SECONDS: u32 = 30;
const DEFAULT_JOIN_CUTOFF_SECONDS: u32 = 10;
const DEFAULT_COUNTDOWN_TICK_MS: u64 = 1_000;
const DEFAULT_CALL_INTERVAL_MS: u64 = 3_000;
const DEFAULT_CARD_BATCH_SIZE: usize = 400;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 120;
const DEFAULT_RETAINED_ENDED_SESSIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Countdown value a fresh session starts with.
    pub countdown_seconds: u32,
    /// Joins are refused once the countdown drops below this value.
    pub join_cutoff_seconds: u32,
    /// Period of the countdown scheduler.
    pub countdown_tick: Duration,
    /// Period of the number-call scheduler.
    pub call_interval: Duration,
    /// Number of cards generated at startup; card codes range over `1..=card_batch_size`.
    pub card_batch_size: usize,
    /// Period of the background reconciliation loop.
    pub reconcile_interval: Duration,
    /// How many ended sessions stay queryable in the registry.
    pub retained_ended_sessions: usize,
    /// Scan every card for a win after each draw instead of waiting for claims.
    pub auto_detect_winner: bool,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        countdown = app_config.countdown_seconds,
                        cards = app_config.card_batch_size,
                        "loaded session settings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    countdown_seconds: Option<u32>,
    join_cutoff_seconds: Option<u32>,
    countdown_tick_ms: Option<u64>,
    call_interval_ms: Option<u64>,
    card_batch_size: Option<usize>,
    reconcile_interval_secs: Option<u64>,
    retained_ended_sessions: Option<usize>,
    auto_detect_winner: Option<bool>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            countdown_seconds: value.countdown_seconds.unwrap_or(DEFAULT_COUNTDOWN_SECONDS),
            join_cutoff_seconds: value
                .join_cutoff_seconds
                .unwrap_or(DEFAULT_JOIN_CUTOFF_SECONDS),
            countdown_tick: Duration::from_millis(
                value
                    .countdown_tick_ms
                    .filter(|ms| *ms > 0)
                    .unwrap_or(DEFAULT_COUNTDOWN_TICK_MS),
            ),
            call_interval: Duration::from_millis(
                value
                    .call_interval_ms
                    .filter(|ms| *ms > 0)
                    .unwrap_or(DEFAULT_CALL_INTERVAL_MS),
            ),
            card_batch_size: value
                .card_batch_size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_CARD_BATCH_SIZE),
            reconcile_interval: Duration::from_secs(
                value
                    .reconcile_interval_secs
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
            ),
            retained_ended_sessions: value
                .retained_ended_sessions
                .unwrap_or(DEFAULT_RETAINED_ENDED_SESSIONS),
            auto_detect_winner: value.auto_detect_winner.unwrap_or(false),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_round_rules() {
        let config = AppConfig::default();
        assert_eq!(config.countdown_seconds, 30);
        assert_eq!(config.join_cutoff_seconds, 10);
        assert_eq!(config.countdown_tick, Duration::from_secs(1));
        assert_eq!(config.call_interval, Duration::from_secs(3));
        assert_eq!(config.card_batch_size, 400);
        assert!(!config.auto_detect_winner);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "countdown_seconds": 5, "call_interval_ms": 0 }"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.countdown_seconds, 5);
        // zero periods would spin the schedulers
        assert_eq!(config.call_interval, Duration::from_secs(3));
        assert_eq!(config.card_batch_size, 400);
    }
}
