use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RESULT_DELAY_MS: u64 = 1500;
pub const DEFAULT_FETCH_RETRIES: u32 = 1;
pub const DEFAULT_PROGRESS_PATH: &str = "lyriclab_progress.json";

/// Which number is credited to user progress when a run settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditPolicy {
    /// The runner's accumulated question points, reveal penalty included.
    #[default]
    LiveScore,
    /// The `points` of the reconciled result (remote or local fallback).
    ReconciledPoints,
}

impl FromStr for CreditPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live_score" | "live" => Ok(CreditPolicy::LiveScore),
            "reconciled_points" | "reconciled" => Ok(CreditPolicy::ReconciledPoints),
            other => Err(format!("Unknown credit policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(url(message = "API base URL must be a valid URL"))]
    pub api_base_url: String,
    #[validate(range(min = 1, max = 300, message = "Request timeout must be 1-300 seconds"))]
    pub request_timeout_secs: u64,
    #[validate(range(max = 60000, message = "Result delay must not exceed 60 seconds"))]
    pub result_delay_ms: u64,
    #[validate(range(max = 5, message = "At most 5 fetch retries are allowed"))]
    pub fetch_retries: u32,
    pub credit_policy: CreditPolicy,
    pub progress_path: PathBuf,
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            result_delay_ms: DEFAULT_RESULT_DELAY_MS,
            fetch_retries: DEFAULT_FETCH_RETRIES,
            credit_policy: CreditPolicy::LiveScore,
            progress_path: PathBuf::from(DEFAULT_PROGRESS_PATH),
            offline: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Local .env is optional
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let api_base_url = settings
            .get_string("api.base_url")
            .or_else(|_| env::var("LYRICLAB_API_URL"))
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let request_timeout_secs = settings
            .get_int("api.timeout_secs")
            .ok()
            .map(|v| v.max(0) as u64)
            .or_else(|| parse_env("LYRICLAB_API_TIMEOUT_SECS"))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let result_delay_ms = settings
            .get_int("challenge.result_delay_ms")
            .ok()
            .map(|v| v.max(0) as u64)
            .unwrap_or(DEFAULT_RESULT_DELAY_MS);

        let fetch_retries = settings
            .get_int("api.fetch_retries")
            .ok()
            .map(|v| v.max(0) as u32)
            .unwrap_or(DEFAULT_FETCH_RETRIES);

        let credit_policy = match settings.get_string("challenge.credit_policy") {
            Ok(raw) => raw.parse().map_err(config::ConfigError::Message)?,
            Err(_) => CreditPolicy::default(),
        };

        let progress_path = settings
            .get_string("progress.path")
            .or_else(|_| env::var("LYRICLAB_PROGRESS_PATH"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROGRESS_PATH));

        let offline = settings.get_bool("api.offline").unwrap_or(false);

        let config = Config {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            request_timeout_secs,
            result_delay_ms,
            fetch_retries,
            credit_policy,
            progress_path,
            offline,
        };

        config
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn result_delay(&self) -> Duration {
        Duration::from_millis(self.result_delay_ms)
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_policy_parses_aliases() {
        assert_eq!("live_score".parse(), Ok(CreditPolicy::LiveScore));
        assert_eq!("Reconciled".parse(), Ok(CreditPolicy::ReconciledPoints));
        assert!("double".parse::<CreditPolicy>().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.result_delay(), Duration::from_millis(1500));
    }
}
