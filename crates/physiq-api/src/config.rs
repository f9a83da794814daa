//! API server configuration.

use clap::Parser;

/// Command-line arguments, each with an environment fallback.
#[derive(Debug, Parser)]
#[command(name = "physiq-api", version, about = "physiq analysis API server")]
pub struct Args {
    /// HTTP bind address.
    #[arg(long, env = "PHYSIQ_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Task store database URL.
    #[arg(long, env = "PHYSIQ_DATABASE_URL", default_value = "sqlite://physiq.db")]
    pub database_url: String,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "PHYSIQ_MAX_BODY_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PHYSIQ_LOG_JSON")]
    pub log_json: bool,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub bind_addr: String,

    pub database_url: String,

    /// Request body limit. Image payloads arrive base64 encoded inline.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://physiq.db".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind_addr,
            database_url: args.database_url,
            max_body_bytes: args.max_body_bytes,
        }
    }
}
