//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that origins parse as URLs and paths are rooted
//! - Validate value ranges (timeouts > 0, delays positive, fan-out > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use url::Url;

use crate::config::schema::EngineConfig;
use crate::resilience::delays::is_valid_delay;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate an engine configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, base) in [
        ("endpoints.same_origin_base", &config.endpoints.same_origin_base),
        ("endpoints.cross_origin_base", &config.endpoints.cross_origin_base),
    ] {
        match Url::parse(base) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                field,
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
        }
    }

    if !config.endpoints.api_path.starts_with('/') {
        errors.push(ValidationError::new("endpoints.api_path", "must start with '/'"));
    }
    if config.endpoints.follow_enabled
        && !config.endpoints.follow_path_template.contains("{TRAN_ID}")
    {
        errors.push(ValidationError::new(
            "endpoints.follow_path_template",
            "must contain the {TRAN_ID} placeholder",
        ));
    }

    if config.transport.fallback_timeout_secs == 0 {
        errors.push(ValidationError::new("transport.fallback_timeout_secs", "must be > 0"));
    }
    if config.transport.follow_timeout_secs == 0 {
        errors.push(ValidationError::new("transport.follow_timeout_secs", "must be > 0"));
    }
    if config.transport.primary_timeout_secs == Some(0) {
        errors.push(ValidationError::new("transport.primary_timeout_secs", "must be > 0"));
    }

    if config.retry.max_attempts == Some(0) {
        errors.push(ValidationError::new("retry.max_attempts", "must be >= 1 when set"));
    }
    if config.retry.fan_out == 0 {
        errors.push(ValidationError::new("retry.fan_out", "must be > 0"));
    }
    if config.retry.no_retry_statuses.iter().any(|s| !(100..=599).contains(s)) {
        errors.push(ValidationError::new(
            "retry.no_retry_statuses",
            "status codes must be within 100..=599",
        ));
    }

    let delays = &config.delays.candidates_secs;
    if delays.is_empty() {
        errors.push(ValidationError::new("delays.candidates_secs", "must not be empty"));
    } else if delays.iter().any(|d| !is_valid_delay(*d)) {
        errors.push(ValidationError::new(
            "delays.candidates_secs",
            "every candidate must be a positive number of seconds in Duration range",
        ));
    }

    let prefix = &config.classifier.id_prefix;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        errors.push(ValidationError::new(
            "classifier.id_prefix",
            "must be a non-empty alphabetic prefix",
        ));
    }
    if config.classifier.id_field.is_empty() {
        errors.push(ValidationError::new("classifier.id_field", "must not be empty"));
    }

    if config.journal.limit == 0 {
        errors.push(ValidationError::new("journal.limit", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
