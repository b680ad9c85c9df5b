//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → shared via Arc<EngineContext> to all components
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; user-editable values (delays, toggles)
//!   live in the settings store instead
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ClassifierConfig;
pub use schema::EndpointConfig;
pub use schema::EngineConfig;
pub use schema::JournalConfig;
pub use schema::RetryConfig;
pub use schema::TransportConfig;
