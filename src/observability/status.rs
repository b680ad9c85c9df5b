//! Status messages for an external UI.
//!
//! Every state transition worth surfacing becomes a [`StatusMessage`]: text,
//! a severity (which maps to a display color) and how long it should stay up.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default time a status stays visible.
pub const DEFAULT_CLEAR_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Display color as a hex string.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Info => "#3498db",
            Severity::Success => "#2ecc71",
            Severity::Warning => "#f39c12",
            Severity::Error => "#e74c3c",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub severity: Severity,
    /// None keeps the message until replaced.
    pub clear_after: Option<Duration>,
}

impl StatusMessage {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity,
            clear_after: Some(DEFAULT_CLEAR_AFTER),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(Severity::Success, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    pub fn sticky(mut self) -> Self {
        self.clear_after = None;
        self
    }
}

/// Receiver of status messages.
pub trait StatusSink: Send + Sync {
    fn show(&self, message: StatusMessage);
}

/// Writes status messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn show(&self, message: StatusMessage) {
        match message.severity {
            Severity::Info | Severity::Success => {
                tracing::info!(color = message.severity.color(), "{}", message.text)
            }
            Severity::Warning => tracing::warn!(color = message.severity.color(), "{}", message.text),
            Severity::Error => tracing::error!(color = message.severity.color(), "{}", message.text),
        }
    }
}

/// Keeps every message; handy for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    messages: Mutex<Vec<StatusMessage>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<StatusMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// True when any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|m| m.text.contains(needle))
    }
}

impl StatusSink for RecordingStatusSink {
    fn show(&self, message: StatusMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}
