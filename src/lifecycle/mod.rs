//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Load settings → Build context → Launch
//!
//! Signals (signals.rs):
//!     SIGINT → Global stop
//! ```

pub mod signals;

pub use signals::spawn_stop_on_ctrl_c;
