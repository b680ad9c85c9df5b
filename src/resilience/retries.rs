//! Retry logic.
//!
//! # Responsibilities
//! - Drive one run: dispatch, inspect, wait, dispatch again
//! - Stop on success, on a non-retryable status, at the retry cap, or on
//!   cancellation
//! - Keep the run's own token and its pending wait in the registry so a
//!   global stop reaches them
//!
//! # State Machine
//! ```text
//! Running ──ok──────────────→ Done(Success)
//!    │    ──non-retryable───→ Done(StoppedNoRetry)
//!    │    ──cap reached─────→ Done(Exhausted)
//!    │    ──stopped─────────→ Done(Cancelled)
//!    └──retryable──→ RetryWait ──elapsed──→ Running
//!                              ──cancelled─→ Done(Cancelled)
//! ```
//!
//! # Design Decisions
//! - Transport failures (no response) are always retryable
//! - A success that lands while a stop is in progress never fires the
//!   success callback

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::classify::Classification;
use crate::config::RetryConfig;
use crate::engine::context::EngineContext;
use crate::observability::journal::AttemptId;
use crate::observability::metrics;
use crate::observability::status::StatusMessage;
use crate::resilience::delays::format_delay_list;
use crate::transport::dispatcher::{DispatchResult, Dispatcher};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Success,
    StoppedNoRetry,
    Exhausted,
    Cancelled,
}

impl TerminalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalState::Success => "success",
            TerminalState::StoppedNoRetry => "stopped_no_retry",
            TerminalState::Exhausted => "exhausted",
            TerminalState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    RetryWait,
    Done(TerminalState),
}

/// When to give up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed dispatches allowed before the run is exhausted; None is unbounded.
    pub max_attempts: Option<u32>,
    /// Statuses that end the run immediately.
    pub no_retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            no_retry_statuses: config.no_retry_statuses.clone(),
        }
    }

    /// One dispatch, no retries.
    pub fn single(config: &RetryConfig) -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::from_config(config)
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        !self.no_retry_statuses.contains(&status)
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|cap| failures >= cap)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub label: String,
    pub terminal: TerminalState,
    pub dispatches: u32,
    /// Failed dispatches counted toward the cap.
    pub retries: u32,
    /// Status of the last dispatch; 0 when it got no response.
    pub last_status: u16,
    pub attempts: Vec<AttemptId>,
    pub classification: Option<Classification>,
}

/// Retry state machine for one run.
pub struct RetryController {
    dispatcher: Arc<Dispatcher>,
    ctx: Arc<EngineContext>,
    policy: RetryPolicy,
    run_id: Uuid,
    label: String,
    token: CancellationToken,
}

impl RetryController {
    pub fn new(dispatcher: Arc<Dispatcher>, policy: RetryPolicy, label: impl Into<String>) -> Self {
        let ctx = dispatcher.context().clone();
        Self {
            dispatcher,
            ctx,
            policy,
            run_id: Uuid::new_v4(),
            label: label.into(),
            token: CancellationToken::new(),
        }
    }

    /// Drive the run to a terminal state. `on_success` fires at most once,
    /// with the successful status.
    pub async fn run<F>(self, payload: &str, on_success: F) -> RunReport
    where
        F: FnOnce(u16) + Send,
    {
        let span = tracing::info_span!("run", run_id = %self.run_id, label = %self.label);
        self.drive(payload, on_success).instrument(span).await
    }

    async fn drive<F>(self, payload: &str, on_success: F) -> RunReport
    where
        F: FnOnce(u16) + Send,
    {
        let handle = self.ctx.registry.register(Arc::new(self.token.clone()));
        let mut on_success = Some(on_success);
        let mut report = RunReport {
            run_id: self.run_id,
            label: self.label.clone(),
            terminal: TerminalState::Cancelled,
            dispatches: 0,
            retries: 0,
            last_status: 0,
            attempts: Vec::new(),
            classification: None,
        };

        let mut state = RunState::Running;
        let terminal = loop {
            state = match state {
                RunState::Done(terminal) => break terminal,
                RunState::Running if self.is_cancelled() => RunState::Done(TerminalState::Cancelled),
                RunState::Running => {
                    report.dispatches += 1;
                    let result = self
                        .dispatcher
                        .dispatch(payload, Some(self.run_id), &self.token)
                        .await;
                    report.last_status = result.status_code;
                    report.attempts.extend_from_slice(&result.attempts);
                    report.classification = result.classification.clone();
                    self.inspect(&result, &mut report, &mut on_success)
                }
                RunState::RetryWait => self.wait_before_retry(&report).await,
            };
        };

        self.ctx.registry.deregister(handle);
        metrics::record_run(terminal);
        tracing::info!(
            terminal = terminal.as_str(),
            dispatches = report.dispatches,
            retries = report.retries,
            last_status = report.last_status,
            "Run finished"
        );
        report.terminal = terminal;
        report
    }

    fn inspect<F>(&self, result: &DispatchResult, report: &mut RunReport, on_success: &mut Option<F>) -> RunState
    where
        F: FnOnce(u16),
    {
        let status = result.status_code;

        if result.ok {
            if self.is_cancelled() {
                tracing::info!(status, "Success ignored, stop in progress");
                return RunState::Done(TerminalState::Cancelled);
            }
            self.ctx
                .show(StatusMessage::success(format!("✅ HTTP {} Success", status)));
            if let Some(callback) = on_success.take() {
                callback(status);
            }
            return RunState::Done(TerminalState::Success);
        }

        if !self.policy.is_retryable(status) {
            self.ctx
                .show(StatusMessage::warning(format!("⛔ No retry on HTTP {}", status)));
            return RunState::Done(TerminalState::StoppedNoRetry);
        }

        report.retries += 1;
        if self.policy.is_exhausted(report.retries) {
            if self.policy.max_attempts != Some(1) {
                self.ctx.show(StatusMessage::error(format!(
                    "❌ Retry run failed all {} attempts.",
                    report.retries
                )));
            }
            return RunState::Done(TerminalState::Exhausted);
        }
        if self.is_cancelled() {
            return RunState::Done(TerminalState::Cancelled);
        }
        RunState::RetryWait
    }

    async fn wait_before_retry(&self, report: &RunReport) -> RunState {
        let wait = self.ctx.delays.next_wait();
        metrics::record_retry();
        self.ctx.show(StatusMessage::warning(format!(
            "⚠️ Retry {} failed (HTTP {}). Retrying in {}s…",
            report.retries,
            report.last_status,
            format_delay_list(&[wait.duration().as_secs_f64()])
        )));
        tracing::debug!(
            retries = report.retries,
            delay_ms = wait.duration().as_millis() as u64,
            "Waiting before retry"
        );

        let handle = self.ctx.registry.register(Arc::new(wait.clone()));
        tokio::select! {
            _ = wait.wait() => {}
            _ = self.token.cancelled() => {
                wait.try_cancel();
            }
        }
        self.ctx.registry.deregister(handle);

        if self.is_cancelled() {
            RunState::Done(TerminalState::Cancelled)
        } else {
            RunState::Running
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.ctx.is_stopped()
    }
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("run_id", &self.run_id)
            .field("label", &self.label)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: Some(3),
            no_retry_statuses: vec![401, 429, 403],
            fan_out: 5,
        }
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&config());
        assert!(!policy.is_retryable(401));
        assert!(!policy.is_retryable(429));
        assert!(policy.is_retryable(500));
        assert!(policy.is_retryable(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn test_single_policy() {
        let policy = RetryPolicy::single(&config());
        assert!(policy.is_exhausted(1));
        assert_eq!(policy.no_retry_statuses, vec![401, 429, 403]);
    }

    #[test]
    fn test_unbounded_policy() {
        let policy = RetryPolicy {
            max_attempts: None,
            no_retry_statuses: Vec::new(),
        };
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_terminal_labels() {
        assert_eq!(TerminalState::StoppedNoRetry.as_str(), "stopped_no_retry");
        assert_eq!(
            serde_json::to_string(&TerminalState::Exhausted).unwrap(),
            "\"exhausted\""
        );
    }
}
