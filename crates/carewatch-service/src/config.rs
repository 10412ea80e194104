use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Full database URL for the alert store,
    /// e.g. `sqlite:///data/carewatch.db?mode=rwc`.
    #[serde(default = "default_db_url")]
    pub db_url: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub task_linkage: TaskLinkageConfig,
}

/// Bounded exponential backoff for upstream reads (rule catalog, metric
/// history). Delay doubles per attempt starting at `base_delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLinkageConfig {
    /// Endpoint of the external task system; task linkage is disabled
    /// when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_task_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_db_url() -> String {
    "sqlite://data/carewatch.db?mode=rwc".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_task_timeout_secs() -> u64 {
    10
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for TaskLinkageConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_task_timeout_secs(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            retry: RetryConfig::default(),
            task_linkage: TaskLinkageConfig::default(),
        }
    }
}
