//! Worker configuration.

use std::time::Duration;

use clap::Parser;

use physiq_core::WorkerId;

use crate::clients::{Provider, StageConfig};
use crate::retry::RetryPolicy;

/// Command-line arguments, each with an environment fallback.
#[derive(Debug, Parser)]
#[command(name = "physiq-worker", version, about = "physiq analysis worker")]
pub struct Args {
    /// Task store database URL.
    #[arg(long, env = "PHYSIQ_DATABASE_URL", default_value = "sqlite://physiq.db")]
    pub database_url: String,

    /// Stable worker id. Tasks left `processing` under this id are failed on start-up.
    #[arg(long, env = "PHYSIQ_WORKER_ID")]
    pub worker_id: Option<String>,

    /// Number of tasks processed at once.
    #[arg(long, env = "PHYSIQ_WORKER_CONCURRENCY", default_value_t = 1)]
    pub concurrency: usize,

    /// Delay between polls of an empty queue, in milliseconds.
    #[arg(long, env = "PHYSIQ_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Time in-flight tasks may keep running after a shutdown signal.
    #[arg(long, env = "PHYSIQ_SHUTDOWN_GRACE_SECS", default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    #[arg(long, env = "PHYSIQ_STAGE_ONE_PROVIDER", value_enum, default_value = "ollama")]
    pub stage_one_provider: Provider,

    #[arg(long, env = "PHYSIQ_STAGE_ONE_URL", default_value = "http://localhost:11434")]
    pub stage_one_url: String,

    #[arg(long, env = "PHYSIQ_STAGE_ONE_MODEL", default_value = "llava")]
    pub stage_one_model: String,

    #[arg(long, env = "PHYSIQ_STAGE_ONE_API_KEY")]
    pub stage_one_api_key: Option<String>,

    /// Deadline for one stage one attempt, in seconds.
    #[arg(long, env = "PHYSIQ_STAGE_ONE_TIMEOUT_SECS", default_value_t = 120)]
    pub stage_one_timeout_secs: u64,

    #[arg(long, env = "PHYSIQ_STAGE_TWO_PROVIDER", value_enum, default_value = "openai")]
    pub stage_two_provider: Provider,

    #[arg(long, env = "PHYSIQ_STAGE_TWO_URL", default_value = "https://api.openai.com/v1")]
    pub stage_two_url: String,

    #[arg(long, env = "PHYSIQ_STAGE_TWO_MODEL", default_value = "gpt-4o-mini")]
    pub stage_two_model: String,

    #[arg(long, env = "PHYSIQ_STAGE_TWO_API_KEY")]
    pub stage_two_api_key: Option<String>,

    /// Deadline for one stage two attempt, in seconds.
    #[arg(long, env = "PHYSIQ_STAGE_TWO_TIMEOUT_SECS", default_value_t = 60)]
    pub stage_two_timeout_secs: u64,

    /// Retries per stage call for transient failures (0 disables retrying).
    #[arg(long, env = "PHYSIQ_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    #[arg(long, env = "PHYSIQ_RETRY_INITIAL_DELAY_MS", default_value_t = 1000)]
    pub retry_initial_delay_ms: u64,

    #[arg(long, env = "PHYSIQ_RETRY_MAX_DELAY_MS", default_value_t = 30_000)]
    pub retry_max_delay_ms: u64,

    /// POST every completed analysis to this URL.
    #[arg(long, env = "PHYSIQ_COMPLETION_WEBHOOK_URL")]
    pub completion_webhook_url: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PHYSIQ_LOG_JSON")]
    pub log_json: bool,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    /// Worker ID.
    pub worker_id: WorkerId,

    /// Maximum concurrent tasks.
    pub concurrency: usize,

    pub poll_interval: Duration,

    pub shutdown_grace: Duration,

    pub stage_one: StageConfig,

    pub stage_two: StageConfig,

    pub retry: RetryPolicy,

    pub completion_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://physiq.db".to_string(),
            worker_id: WorkerId::generate(),
            concurrency: 1,
            poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
            stage_one: StageConfig {
                provider: Provider::Ollama,
                base_url: "http://localhost:11434".to_string(),
                model: "llava".to_string(),
                api_key: None,
                timeout: Duration::from_secs(120),
            },
            stage_two: StageConfig {
                provider: Provider::Openai,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                timeout: Duration::from_secs(60),
            },
            retry: RetryPolicy::default(),
            completion_webhook_url: None,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            database_url: args.database_url,
            worker_id: args
                .worker_id
                .map(WorkerId::new)
                .unwrap_or_else(WorkerId::generate),
            concurrency: args.concurrency.max(1),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
            stage_one: StageConfig {
                provider: args.stage_one_provider,
                base_url: args.stage_one_url,
                model: args.stage_one_model,
                api_key: args.stage_one_api_key,
                timeout: Duration::from_secs(args.stage_one_timeout_secs),
            },
            stage_two: StageConfig {
                provider: args.stage_two_provider,
                base_url: args.stage_two_url,
                model: args.stage_two_model,
                api_key: args.stage_two_api_key,
                timeout: Duration::from_secs(args.stage_two_timeout_secs),
            },
            retry: RetryPolicy::exponential(
                args.max_retries,
                Duration::from_millis(args.retry_initial_delay_ms),
                Duration::from_millis(args.retry_max_delay_ms),
            ),
            completion_webhook_url: args.completion_webhook_url,
        }
    }
}
