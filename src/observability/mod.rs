//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engine components produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → status.rs (user-facing status messages)
//!     → journal.rs (per-attempt records for display/export)
//! ```
//!
//! # Design Decisions
//! - The engine never depends on anything a status or journal consumer returns
//! - Run IDs flow through spans and attempt records

pub mod journal;
pub mod logging;
pub mod metrics;
pub mod status;

pub use journal::{AttemptJournal, AttemptRecord, FollowUpResult, JournalEvent};
pub use status::{LogStatusSink, RecordingStatusSink, Severity, StatusMessage, StatusSink};
