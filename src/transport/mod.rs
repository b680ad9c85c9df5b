//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → client.rs (Transport trait, reqwest transport)
//!     → follow.rs (confirmation GET)
//!     → types.rs (requests, responses, errors)
//! ```

pub mod client;
pub mod dispatcher;
pub mod follow;
pub mod types;

pub use client::{HttpTransport, Transport};
pub use dispatcher::{DispatchResult, Dispatcher};
pub use types::{OutboundRequest, RawResponse, TransportError, TransportKind};
