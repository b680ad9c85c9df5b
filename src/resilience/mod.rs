//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Run:
//!     → retries.rs (state machine: dispatch, inspect, wait, repeat)
//!     → delays.rs (draw the next wait from the live candidate set)
//!     → cancel.rs (cancellable waits and handles)
//!     → registry.rs (in-flight count, live handles, global stop)
//! ```
//!
//! # Design Decisions
//! - Every cancellable piece registers itself; a global stop reaches all
//! - The stop flag clears itself shortly after the latest stop

pub mod cancel;
pub mod delays;
pub mod registry;
pub mod retries;

pub use cancel::{Cancel, CancellableDelay, DelayOutcome};
pub use delays::{DelayError, DelayProvider};
pub use registry::{InFlightGuard, Registry};
pub use retries::{RetryController, RetryPolicy, RunReport, RunState, TerminalState};
