use std::{env, str::FromStr, time::Duration};

use url::Url;

use super::env::{
    ApiConfig, AppConfig, BatchConfig, ConfigError, DirectoryConfig, DisplayConfig, FetchConfig,
    LoggingConfig, TaskConfig,
};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("CLASSIFIER_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = Url::parse(raw_url.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or(ConfigError::Invalid {
                key: "CLASSIFIER_API_URL",
                value: raw_url.clone(),
            })?;

        let api = ApiConfig {
            base_url,
            request_timeout: Duration::from_millis(parse_or(&lookup, "REQUEST_TIMEOUT_MS", 30_000)),
        };

        let fetch = FetchConfig {
            page_size: parse_or(&lookup, "PAGE_SIZE", 10u64).max(1),
            refetch_interval: Duration::from_millis(
                parse_or(&lookup, "REFETCH_INTERVAL_MS", 5_000u64).max(100),
            ),
            stale_time: Duration::from_millis(parse_or(&lookup, "STALE_TIME_MS", 3_000)),
            retries: parse_or(&lookup, "FETCH_RETRIES", 3),
            retry_delay: Duration::from_millis(parse_or(&lookup, "FETCH_RETRY_DELAY_MS", 1_000)),
            server_side_filter: parse_bool(&lookup, "SERVER_SIDE_FILTER"),
        };

        let tasks = TaskConfig {
            poll_interval: Duration::from_millis(
                parse_or(&lookup, "TASK_POLL_INTERVAL_MS", 3_000u64).max(100),
            ),
            timeout: Duration::from_secs(parse_or(&lookup, "TASK_TIMEOUT_SECS", 600)),
        };

        let batch = BatchConfig {
            total_emails: parse_or(&lookup, "BATCH_TOTAL_EMAILS", 100u64).max(1),
            batch_size: parse_or(&lookup, "BATCH_SIZE", 10u64).max(1),
        };

        let display = DisplayConfig {
            timezone: lookup("DASHBOARD_TIMEZONE").unwrap_or_else(|| "UTC".to_string()),
        };

        let directories = DirectoryConfig {
            logs_dir: lookup("LOGS_DIR").unwrap_or_else(|| "logs".to_string()),
        };

        let logging = LoggingConfig {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        Ok(Self {
            api,
            fetch,
            tasks,
            batch,
            display,
            directories,
            logging,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool<F>(lookup: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
