use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub fetch: FetchConfig,
    pub tasks: TaskConfig,
    pub batch: BatchConfig,
    pub display: DisplayConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub page_size: u64,
    pub refetch_interval: Duration,
    pub stale_time: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub server_side_filter: bool,
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub total_emails: u64,
    pub batch_size: u64,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
