//! Response classification.
//!
//! # Data Flow
//! ```text
//! finalized attempt {status, headers, body, request body, final URL}
//!     → RequestBody → FinalUrl → RedirectLocation → BodyScan
//!     → first strategy that finds an id wins
//!     → Classification {tran_id?, validity, source}
//! ```
//!
//! # Design Decisions
//! - Strategy order is fixed; it decides precedence when several inputs
//!   carry an id
//! - Validity is independent of the transport's `ok` verdict (a 302 can
//!   carry `status=FAILED`)

pub mod extractors;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ClassifierConfig;
use extractors::{BodyScan, Extractor, FinalUrl, RedirectLocation, RequestBody};

/// Verdict carried by the status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    Valid,
    Failed,
    Unknown,
}

impl Validity {
    /// VALID → valid, FAILED → failed (case-insensitive), anything else unknown.
    pub fn from_status(status: Option<&str>) -> Self {
        match status {
            Some(s) if s.eq_ignore_ascii_case("VALID") => Validity::Valid,
            Some(s) if s.eq_ignore_ascii_case("FAILED") => Validity::Failed,
            _ => Validity::Unknown,
        }
    }

    /// Tri-state as an optional boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Validity::Valid => Some(true),
            Validity::Failed => Some(false),
            Validity::Unknown => None,
        }
    }
}

/// Which input yielded the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionSource {
    Request,
    FinalUrl,
    RedirectLocation,
    Body,
    None,
}

/// Result of classifying one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tran_id: Option<String>,
    /// Raw status value, uppercased.
    pub status: Option<String>,
    pub validity: Validity,
    pub source: ExtractionSource,
    /// Decoded redirect target, when the id came from it.
    pub location: Option<String>,
}

impl Classification {
    pub fn not_found() -> Self {
        Self {
            tran_id: None,
            status: None,
            validity: Validity::Unknown,
            source: ExtractionSource::None,
            location: None,
        }
    }

    fn found(tran_id: String, status: Option<String>, source: ExtractionSource) -> Self {
        let status = status.map(|s| s.to_ascii_uppercase());
        Self {
            validity: Validity::from_status(status.as_deref()),
            tran_id: Some(tran_id),
            status,
            source,
            location: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.tran_id.is_some()
    }
}

/// Everything the classifier looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyInput<'a> {
    pub status_code: u16,
    pub headers_text: &'a str,
    pub body: &'a str,
    pub request_body: &'a str,
    pub final_url: &'a str,
}

/// Compiled patterns and field names shared by the strategies.
#[derive(Debug, Clone)]
pub struct Patterns {
    pub id_field: String,
    pub status_field: String,
    id: Regex,
    status_token: Regex,
    base: Option<Url>,
}

impl Patterns {
    /// `base` resolves relative URLs (final URLs, redirect locations).
    pub fn new(config: &ClassifierConfig, base: Option<Url>) -> Result<Self, regex::Error> {
        Ok(Self {
            id_field: config.id_field.clone(),
            status_field: config.status_field.clone(),
            id: Regex::new(&format!(r"(?i){}\d+", regex::escape(&config.id_prefix)))?,
            status_token: Regex::new(r"(?i)status=(VALID|FAILED)")?,
            base,
        })
    }

    fn find_id(&self, text: &str) -> Option<String> {
        self.id.find(text).map(|m| m.as_str().to_string())
    }

    fn resolve(&self, text: &str) -> Option<Url> {
        match &self.base {
            Some(base) => base.join(text).ok(),
            None => Url::parse(text).ok(),
        }
    }
}

/// Ordered chain of extraction strategies.
pub struct Classifier {
    patterns: Patterns,
    chain: Vec<Box<dyn Extractor>>,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig, base: Option<Url>) -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: Patterns::new(config, base)?,
            chain: vec![
                Box::new(RequestBody),
                Box::new(FinalUrl),
                Box::new(RedirectLocation),
                Box::new(BodyScan),
            ],
        })
    }

    /// Run the chain; the first strategy that finds an id wins.
    pub fn classify(&self, input: &ClassifyInput<'_>) -> Classification {
        for extractor in &self.chain {
            if let Some(found) = extractor.extract(input, &self.patterns) {
                tracing::debug!(
                    source = ?extractor.source(),
                    tran_id = ?found.tran_id,
                    validity = ?found.validity,
                    "Classified attempt"
                );
                return found;
            }
        }
        Classification::not_found()
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("patterns", &self.patterns)
            .field("strategies", &self.chain.len())
            .finish()
    }
}
