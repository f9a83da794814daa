//! physiq worker
//!
//! Claims analysis tasks from the shared store, runs the two chained stage
//! calls, sanitizes their output and writes the result back.

pub mod clients;
pub mod config;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod sink;
pub mod worker;

pub use config::{Args, Config};
pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
pub use worker::Worker;
