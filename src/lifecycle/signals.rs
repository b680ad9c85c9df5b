//! OS signal handling.
//!
//! # Responsibilities
//! - Turn Ctrl+C into a global stop of every run in progress
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Every Ctrl+C is another global stop; the process exits once the
//!   launch it interrupted has unwound

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::engine::context::EngineContext;

/// Spawn a task that stops all operations on every Ctrl+C.
pub fn spawn_stop_on_ctrl_c(ctx: Arc<EngineContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                return;
            }
            let cancelled = ctx.stop_all();
            tracing::info!(cancelled, "Stop signal received");
        }
    })
}
