//! Transport types and error definitions.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Content type of the payment-confirmation POST.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Which mechanism carried an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Same-origin transport, tried first.
    Primary,
    /// Cross-origin fallback.
    Secondary,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Primary => "primary",
            TransportKind::Secondary => "secondary",
        }
    }
}

/// A request handed to a transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutboundRequest {
    /// Form-encoded POST carrying the raw payload.
    pub fn form_post(url: impl Into<String>, payload: &str) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body: Some(payload.to_string()),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// What came back when a response was received at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Response headers as `name: value` lines.
    pub headers_text: Option<String>,
    /// URL the response was finally served from, when it differs from the request.
    pub final_url: Option<String>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Transport-level failures: no response was received.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Connection, DNS, TLS or protocol failure.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the allotted time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Aborted through a cancellation handle.
    #[error("request cancelled")]
    Cancelled,

    /// The transport mechanism is not available.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// `ok` as the engine defines it: 2xx/3xx, 302 included.
pub fn is_ok_status(status: u16) -> bool {
    (200..400).contains(&status) || status == 302
}

/// Outcome of a recorded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Pending,
    Ok,
    Failed,
}
