//! Engine subsystem.
//!
//! # Data Flow
//! ```text
//! launch(mode, payload)
//!     → orchestrator.rs (pick mode, fan out runs)
//!     → resilience::retries (one state machine per run)
//!     → transport::dispatcher (one dispatch per attempt)
//!     → context.rs (shared registry, delays, settings, journal)
//! ```

pub mod context;
pub mod orchestrator;

pub use context::{ContextError, EngineContext};
pub use orchestrator::{LaunchError, LaunchReport, Orchestrator, RunMode};
