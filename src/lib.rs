//! Payment-confirmation relay library

pub mod classify;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod settings;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{EngineContext, Orchestrator, RunMode};
pub use transport::Dispatcher;
