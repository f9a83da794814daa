//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use tracing::warn;

use physiq_core::TaskStatus;

use crate::state::AppState;

/// Collect all metrics and format as Prometheus text.
pub async fn collect_metrics(state: &AppState) -> String {
    let mut output = String::new();

    writeln!(output, "# HELP physiq_up Whether the API server is running").ok();
    writeln!(output, "# TYPE physiq_up gauge").ok();
    writeln!(output, "physiq_up 1").ok();

    collect_task_metrics(state, &mut output).await;

    output
}

/// Task counts by status, read from the shared store.
async fn collect_task_metrics(state: &AppState, output: &mut String) {
    let counts = match state.tasks.counts().await {
        Ok(counts) => counts,
        Err(e) => {
            warn!(error = %e, "Failed to count tasks for metrics");
            return;
        }
    };

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP physiq_tasks Number of analysis tasks by status"
    )
    .ok();
    writeln!(output, "# TYPE physiq_tasks gauge").ok();
    for status in TaskStatus::ALL {
        writeln!(
            output,
            "physiq_tasks{{status=\"{}\"}} {}",
            status,
            counts.get(status)
        )
        .ok();
    }
}
