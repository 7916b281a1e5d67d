use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.trendyol.com/sapigw";
pub const DEFAULT_API_VERSION: &str = "v2";

/// Connection settings for the supplier API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
    pub api_version: String,
    pub timeout: Duration,
    pub retry_base_delay: Duration,
    pub max_retry_attempts: u32,
}

/// Timer periods driven by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub refresh_interval: Duration,
    pub max_refresh_interval: Duration,
    pub live_tick_interval: Duration,
    pub health_check_interval: Duration,
    pub cache_sweep_interval: Duration,
    pub error_analysis_interval: Duration,
    pub reconnect_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceConfig {
    pub cache_ttl: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
    pub error_log_capacity: usize,
    pub error_pattern_window: Duration,
    pub error_pattern_threshold: usize,
    pub sync_batch_size: usize,
    pub sync_parallelism: usize,
    pub sync_max_attempts: u32,
}

/// Hosting identifiers. Only reported at startup; unset values keep placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub api_base_url: String,
    pub storage_account: String,
    pub container_name: String,
    pub function_app_url: String,
    pub key_vault_url: String,
}

impl DeploymentConfig {
    /// Names of identifiers still holding their placeholder value.
    pub fn placeholders(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.api_base_url.contains("your-app") {
            out.push("AZURE_API_BASE_URL");
        }
        if self.storage_account == "your-storage-account" {
            out.push("AZURE_STORAGE_ACCOUNT");
        }
        if self.function_app_url.contains("your-function-app") {
            out.push("AZURE_FUNCTION_URL");
        }
        if self.key_vault_url.contains("your-keyvault") {
            out.push("AZURE_KEYVAULT_URL");
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub api: ApiConfig,
    pub schedule: ScheduleConfig,
    pub resilience: ResilienceConfig,
    pub deployment: DeploymentConfig,
    pub data_dir: PathBuf,
    pub output: OutputMode,
}

/// Where rendered dashboard updates go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// JSON-RPC notifications on stdout.
    JsonLines,
    /// Log lines only.
    Log,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup; unset or unparsable keys use defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secs = |key: &str, default: u64| Duration::from_secs(parse_or(&lookup, key, default));
        let millis = |key: &str, default: u64| Duration::from_millis(parse_or(&lookup, key, default));

        let data_dir = lookup("TRENDSYNC_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(crate::db::trendsync_data_dir);

        Self {
            api: ApiConfig {
                base_url: text("TRENDYOL_API_BASE_URL", DEFAULT_BASE_URL)
                    .trim_end_matches('/')
                    .to_string(),
                api_version: text("TRENDYOL_API_VERSION", DEFAULT_API_VERSION),
                timeout: millis("TRENDSYNC_API_TIMEOUT_MS", 30_000),
                retry_base_delay: millis("TRENDSYNC_RETRY_DELAY_MS", 2_000),
                max_retry_attempts: parse_or(&lookup, "TRENDSYNC_MAX_RETRIES", 3),
            },
            schedule: ScheduleConfig {
                refresh_interval: secs("TRENDSYNC_REFRESH_SECS", 30),
                max_refresh_interval: secs("TRENDSYNC_MAX_REFRESH_SECS", 300),
                live_tick_interval: secs("TRENDSYNC_LIVE_TICK_SECS", 10),
                health_check_interval: secs("TRENDSYNC_HEALTH_CHECK_SECS", 120),
                cache_sweep_interval: secs("TRENDSYNC_CACHE_SWEEP_SECS", 300),
                error_analysis_interval: secs("TRENDSYNC_ERROR_ANALYSIS_SECS", 60),
                reconnect_interval: secs("TRENDSYNC_RECONNECT_SECS", 60),
            },
            resilience: ResilienceConfig {
                cache_ttl: secs("TRENDSYNC_CACHE_TTL_SECS", 300),
                breaker_threshold: parse_or(&lookup, "TRENDSYNC_BREAKER_THRESHOLD", 5),
                breaker_cooldown: secs("TRENDSYNC_BREAKER_COOLDOWN_SECS", 30),
                error_log_capacity: parse_or(&lookup, "TRENDSYNC_ERROR_LOG_CAPACITY", 100),
                error_pattern_window: secs("TRENDSYNC_ERROR_WINDOW_SECS", 3_600),
                error_pattern_threshold: parse_or(&lookup, "TRENDSYNC_ERROR_PATTERN_THRESHOLD", 5),
                sync_batch_size: parse_or(&lookup, "TRENDSYNC_SYNC_BATCH_SIZE", 50),
                sync_parallelism: parse_or(&lookup, "TRENDSYNC_SYNC_PARALLELISM", 3),
                sync_max_attempts: parse_or(&lookup, "TRENDSYNC_SYNC_MAX_ATTEMPTS", 3),
            },
            deployment: DeploymentConfig {
                api_base_url: text("AZURE_API_BASE_URL", "https://your-app.azurewebsites.net/api"),
                storage_account: text("AZURE_STORAGE_ACCOUNT", "your-storage-account"),
                container_name: text("AZURE_CONTAINER_NAME", "trendyol-data"),
                function_app_url: text(
                    "AZURE_FUNCTION_URL",
                    "https://your-function-app.azurewebsites.net",
                ),
                key_vault_url: text("AZURE_KEYVAULT_URL", "https://your-keyvault.vault.azure.net"),
            },
            data_dir,
            output: match text("TRENDSYNC_OUTPUT", "json").as_str() {
                "log" => OutputMode::Log,
                _ => OutputMode::JsonLines,
            },
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("state").join("trendsync.sqlite")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "Unparsable config value, using default");
                default
            }
        },
        _ => default,
    }
}
