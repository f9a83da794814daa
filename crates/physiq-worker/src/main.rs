//! physiq Worker Daemon

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use physiq_store::{SqliteTaskStore, TaskStore};
use physiq_worker::sink::{LogSink, WebhookSink};
use physiq_worker::{clients, Args, Config, Pipeline, Worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    let config = Config::from(args);
    info!(
        worker_id = %config.worker_id,
        database = %config.database_url,
        concurrency = config.concurrency,
        stage_one = %config.stage_one.base_url,
        stage_two = %config.stage_two.base_url,
        "Starting physiq worker"
    );

    let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::connect(&config.database_url).await?);

    let mut pipeline = Pipeline::new(
        store.clone(),
        clients::build(&config.stage_one)?,
        clients::build(&config.stage_two)?,
    )
    .with_timeouts(config.stage_one.timeout, config.stage_two.timeout)
    .with_retry(config.retry.clone())
    .with_sink(Arc::new(LogSink));
    if let Some(url) = &config.completion_webhook_url {
        info!(url = %url, "Completion webhook enabled");
        pipeline = pipeline.with_sink(Arc::new(WebhookSink::new(url.clone())?));
    }

    let worker = Worker::new(config.worker_id.clone(), store, pipeline)
        .concurrency(config.concurrency)
        .poll_interval(config.poll_interval)
        .shutdown_grace(config.shutdown_grace);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    worker.run(shutdown).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
