//! Attempt journal.
//!
//! # Responsibilities
//! - Record every request attempt at dispatch start
//! - Finalize each attempt exactly once with its outcome, classification
//!   and follow-up result
//! - Feed start/finalize events to any number of subscribers (a UI)
//! - Bounded history with JSON export

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::classify::Classification;
use crate::config::JournalConfig;
use crate::transport::types::{AttemptOutcome, TransportKind};

/// Identifier of a recorded attempt.
pub type AttemptId = u64;

/// Result of the follow-up GET issued after a success or redirect signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowUpResult {
    pub url: String,
    /// None when neither transport got a response.
    pub status: Option<u16>,
    pub body_preview: String,
}

impl FollowUpResult {
    pub fn is_confirmed(&self) -> bool {
        self.status == Some(200)
    }
}

/// One request attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub run_id: Option<Uuid>,
    /// Milliseconds since the epoch at dispatch start.
    pub started_at_ms: u64,
    pub method: String,
    pub url: String,
    pub request_body: String,
    pub transport: TransportKind,
    pub outcome: AttemptOutcome,
    /// 0 when no response was received.
    pub status_code: u16,
    pub elapsed_ms: u64,
    pub headers_text: Option<String>,
    pub final_url: Option<String>,
    pub response_body: String,
    /// Diagnostic for failed or noteworthy attempts.
    pub note: Option<String>,
    pub classification: Option<Classification>,
    pub follow_up: Option<FollowUpResult>,
}

/// Metadata known when an attempt starts.
#[derive(Debug, Clone)]
pub struct AttemptStart {
    pub run_id: Option<Uuid>,
    pub method: String,
    pub url: String,
    pub request_body: String,
    pub transport: TransportKind,
}

/// Everything known once an attempt settles.
#[derive(Debug, Clone, Default)]
pub struct AttemptFinish {
    pub ok: bool,
    pub status_code: u16,
    pub elapsed: Duration,
    pub headers_text: Option<String>,
    pub final_url: Option<String>,
    pub response_body: String,
    pub note: Option<String>,
    pub classification: Option<Classification>,
    pub follow_up: Option<FollowUpResult>,
}

#[derive(Debug, Clone)]
pub enum JournalEvent {
    Started(AttemptRecord),
    Finalized(AttemptRecord),
    Cleared,
}

/// Bounded, observable history of attempts.
pub struct AttemptJournal {
    limit: usize,
    body_preview: usize,
    next_id: AtomicU64,
    entries: Mutex<VecDeque<AttemptRecord>>,
    feed: broadcast::Sender<JournalEvent>,
}

impl AttemptJournal {
    pub fn new(config: &JournalConfig) -> Self {
        let (feed, _) = broadcast::channel(256);
        Self {
            limit: config.limit.max(1),
            body_preview: config.body_preview,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(VecDeque::new()),
            feed,
        }
    }

    /// Subscribe to start/finalize events.
    pub fn subscribe(&self) -> broadcast::Receiver<JournalEvent> {
        self.feed.subscribe()
    }

    /// Record a new pending attempt.
    pub fn start(&self, start: AttemptStart) -> AttemptId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = AttemptRecord {
            id,
            run_id: start.run_id,
            started_at_ms: now_ms(),
            method: start.method,
            url: start.url,
            request_body: preview(&start.request_body, self.body_preview),
            transport: start.transport,
            outcome: AttemptOutcome::Pending,
            status_code: 0,
            elapsed_ms: 0,
            headers_text: None,
            final_url: None,
            response_body: String::new(),
            note: None,
            classification: None,
            follow_up: None,
        };

        {
            let mut entries = self.lock();
            entries.push_back(record.clone());
            while entries.len() > self.limit {
                entries.pop_front();
            }
        }
        let _ = self.feed.send(JournalEvent::Started(record));
        id
    }

    /// Settle a pending attempt. Returns None if it was already finalized
    /// (or has been evicted), leaving the stored record untouched.
    pub fn finalize(&self, id: AttemptId, finish: AttemptFinish) -> Option<AttemptRecord> {
        let record = {
            let mut entries = self.lock();
            let entry = entries
                .iter_mut()
                .find(|r| r.id == id && r.outcome == AttemptOutcome::Pending);
            let Some(entry) = entry else {
                tracing::warn!(attempt = id, "Ignoring finalize of settled or unknown attempt");
                return None;
            };

            entry.outcome = if finish.ok {
                AttemptOutcome::Ok
            } else {
                AttemptOutcome::Failed
            };
            entry.status_code = finish.status_code;
            entry.elapsed_ms = finish.elapsed.as_millis() as u64;
            entry.headers_text = finish.headers_text;
            entry.final_url = finish.final_url;
            entry.response_body = preview(&finish.response_body, self.body_preview);
            entry.note = finish.note;
            entry.classification = finish.classification;
            entry.follow_up = finish.follow_up;
            entry.clone()
        };
        let _ = self.feed.send(JournalEvent::Finalized(record.clone()));
        Some(record)
    }

    pub fn get(&self, id: AttemptId) -> Option<AttemptRecord> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<AttemptRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
        let _ = self.feed.send(JournalEvent::Cleared);
    }

    /// All retained attempts as pretty JSON.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AttemptRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AttemptJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptJournal")
            .field("limit", &self.limit)
            .field("len", &self.len())
            .finish()
    }
}

/// First `limit` characters, with a note of how many were cut.
pub fn preview(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit).collect();
    format!("{}\n…({} more chars)", head, total - limit)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
