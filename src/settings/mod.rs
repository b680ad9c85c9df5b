//! Durable settings subsystem.
//!
//! Holds the user-editable state that outlives a process: delay candidates,
//! mode toggles, running counters and the last verified transaction.

pub mod store;

pub use store::{PanelPosition, PersistedSettings, SettingsError, SettingsStore};
