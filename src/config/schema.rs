//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the payment relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Service origins and paths.
    pub endpoints: EndpointConfig,

    /// Transport timeouts and fallback policy.
    pub transport: TransportConfig,

    /// Retry cap and short-circuit statuses.
    pub retry: RetryConfig,

    /// Initial delay candidates (overridden by persisted settings).
    pub delays: DelayConfig,

    /// Transaction identifier extraction.
    pub classifier: ClassifierConfig,

    /// Attempt journal limits.
    pub journal: JournalConfig,

    /// Durable settings file.
    pub settings: SettingsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Service origins and paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Origin used by the primary transport (e.g., "https://payment.example.com").
    pub same_origin_base: String,

    /// Origin used by the secondary transport.
    pub cross_origin_base: String,

    /// Path of the payment-confirmation endpoint.
    pub api_path: String,

    /// Follow-up GET path; `{TRAN_ID}` is replaced by the encoded identifier.
    pub follow_path_template: String,

    /// Issue the follow-up GET after a success or redirect signal.
    pub follow_enabled: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            same_origin_base: "https://payment.ivacbd.com".to_string(),
            cross_origin_base: "https://api-payment.ivacbd.com".to_string(),
            api_path: "/api/payment/appointment/process".to_string(),
            follow_path_template: "/payment-response/{TRAN_ID}".to_string(),
            follow_enabled: true,
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Secondary transport timeout in seconds.
    pub fallback_timeout_secs: u64,

    /// Follow-up GET timeout on the secondary transport in seconds.
    pub follow_timeout_secs: u64,

    /// Optional primary transport timeout in seconds (none = wait indefinitely).
    pub primary_timeout_secs: Option<u64>,

    /// Follow HTTP redirects inside the transports. When off, a 302 and its
    /// `Location` header reach the classifier untouched.
    pub follow_redirects: bool,

    /// User-Agent sent by both transports.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            fallback_timeout_secs: 30,
            follow_timeout_secs: 15,
            primary_timeout_secs: None,
            follow_redirects: false,
            user_agent: concat!("payment-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum dispatches per run; absent means unbounded.
    pub max_attempts: Option<u32>,

    /// Statuses that end a run without another attempt.
    pub no_retry_statuses: Vec<u16>,

    /// Number of concurrent runs in Multi and Combined modes.
    pub fan_out: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            no_retry_statuses: vec![401, 429, 403],
            fan_out: 5,
        }
    }
}

/// Delay candidates in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DelayConfig {
    pub candidates_secs: Vec<f64>,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            candidates_secs: vec![10.0, 11.0, 12.0, 13.0, 9.0, 14.0, 15.0, 9.0],
        }
    }
}

/// Classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Alphabetic prefix of transaction identifiers (matched case-insensitively).
    pub id_prefix: String,

    /// Form/query field carrying the transaction identifier.
    pub id_field: String,

    /// Form/query field carrying the VALID/FAILED verdict.
    pub status_field: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            id_prefix: "SBIMU".to_string(),
            id_field: "tran_id".to_string(),
            status_field: "status".to_string(),
        }
    }
}

/// Attempt journal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Maximum attempts retained in memory.
    pub limit: usize,

    /// Characters of request/response body kept in previews.
    pub body_preview: usize,

    /// Characters of follow-up body attached to an attempt.
    pub follow_preview: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            limit: 200,
            body_preview: 1200,
            follow_preview: 2000,
        }
    }
}

/// Durable settings configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Path of the JSON settings file; none keeps settings in memory only.
    pub path: Option<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: Some("payment_relay_state.json".to_string()),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
