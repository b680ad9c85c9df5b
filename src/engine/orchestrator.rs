//! Run orchestration.
//!
//! # Modes
//! ```text
//! Single     one run, cap 1
//! Multi      fan_out single runs side by side
//! RetryOnly  one run with the configured cap; success stops everything
//! Combined   min(fan_out, cap) retry runs; first success stops the rest
//! ```
//!
//! Runs share one task and are polled together with `join_all`.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::context::EngineContext;
use crate::observability::status::StatusMessage;
use crate::resilience::retries::{RetryController, RetryPolicy, RunReport, TerminalState};
use crate::transport::dispatcher::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Single,
    Multi,
    RetryOnly,
    Combined,
}

impl RunMode {
    /// Mode selected by the two persisted toggles.
    pub fn from_toggles(multi: bool, retrymax: bool) -> Self {
        match (multi, retrymax) {
            (false, false) => RunMode::Single,
            (true, false) => RunMode::Multi,
            (false, true) => RunMode::RetryOnly,
            (true, true) => RunMode::Combined,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Single => "Single",
            RunMode::Multi => "Multi",
            RunMode::RetryOnly => "Retrymax",
            RunMode::Combined => "Multi + Retrymax",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("payload is empty")]
    EmptyPayload,
}

/// What a launch did.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub mode: RunMode,
    pub runs: Vec<RunReport>,
}

impl LaunchReport {
    pub fn succeeded(&self) -> bool {
        self.runs.iter().any(|r| r.terminal == TerminalState::Success)
    }
}

/// Launches runs in the selected mode.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
}

impl Orchestrator {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    fn ctx(&self) -> &Arc<EngineContext> {
        self.dispatcher.context()
    }

    /// Mode selected by the persisted toggles.
    pub fn current_mode(&self) -> RunMode {
        self.ctx()
            .settings
            .read(|s| RunMode::from_toggles(s.multi_on, s.retrymax_on))
    }

    /// Launch `payload` in `mode` and wait for every run to finish.
    pub async fn launch(&self, mode: RunMode, payload: &str) -> Result<LaunchReport, LaunchError> {
        let ctx = self.ctx();
        let payload = payload.trim();
        if payload.is_empty() {
            ctx.show(StatusMessage::warning("⚠️ Paste a payload first"));
            return Err(LaunchError::EmptyPayload);
        }

        let fan_out = ctx.config.retry.fan_out.max(1);
        tracing::info!(mode = mode.label(), fallback = ctx.fallback_mode_label(), "Launching");

        let runs = match mode {
            RunMode::Single => {
                ctx.show(StatusMessage::info("⏳ Sending single request..."));
                vec![self.single(payload, "single".to_string()).await]
            }
            RunMode::Multi => {
                ctx.show(StatusMessage::info(format!("🚀 Sending {} requests...", fan_out)));
                join_all((1..=fan_out).map(|i| self.single(payload, format!("#{}", i)))).await
            }
            RunMode::RetryOnly => {
                ctx.show(StatusMessage::info("🔄 Retrymax mode running..."));
                vec![self.retrying(payload, "retrymax".to_string()).await]
            }
            RunMode::Combined => {
                let cap = ctx
                    .config
                    .retry
                    .max_attempts
                    .map_or(usize::MAX, |cap| cap as usize);
                let count = fan_out.min(cap);
                ctx.show(StatusMessage::info(format!(
                    "🔁 Multi + Retrymax mode running ({} runs)...",
                    count
                )));

                let mut pending = Vec::with_capacity(count);
                for i in 1..=count {
                    if ctx.is_stopped() {
                        break;
                    }
                    pending.push(self.retrying(payload, format!("#{}", i)));
                }
                join_all(pending).await
            }
        };

        Ok(LaunchReport { mode, runs })
    }

    async fn single(&self, payload: &str, label: String) -> RunReport {
        let policy = RetryPolicy::single(&self.ctx().config.retry);
        let report = RetryController::new(self.dispatcher.clone(), policy, label)
            .run(payload, |_| {})
            .await;

        let ctx = self.ctx();
        match report.terminal {
            TerminalState::Success => ctx.show(StatusMessage::success(format!(
                "✅ Success {} [{}]",
                report.label, report.last_status
            ))),
            TerminalState::Cancelled => {}
            _ => ctx.show(StatusMessage::error(format!(
                "❌ Failed {} [{}]",
                report.label, report.last_status
            ))),
        }
        report
    }

    async fn retrying(&self, payload: &str, label: String) -> RunReport {
        let policy = RetryPolicy::from_config(&self.ctx().config.retry);
        let ctx = self.ctx().clone();
        RetryController::new(self.dispatcher.clone(), policy, label)
            .run(payload, move |_| {
                ctx.stop_all();
                ctx.show(StatusMessage::success("✅ Success. Aborting all."));
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_toggles() {
        assert_eq!(RunMode::from_toggles(false, false), RunMode::Single);
        assert_eq!(RunMode::from_toggles(true, false), RunMode::Multi);
        assert_eq!(RunMode::from_toggles(false, true), RunMode::RetryOnly);
        assert_eq!(RunMode::from_toggles(true, true), RunMode::Combined);
        assert_eq!(RunMode::Combined.label(), "Multi + Retrymax");
    }
}
