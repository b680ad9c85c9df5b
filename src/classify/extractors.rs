//! Extraction strategies, in precedence order.
//!
//! Each strategy either finds a transaction id or declines. Malformed input
//! (undecodable location, unparsable URL) is a decline, never an error.

use std::collections::HashMap;
use url::{form_urlencoded, Url};

use crate::classify::{Classification, ClassifyInput, ExtractionSource, Patterns};

/// One step of the classification chain.
pub trait Extractor: Send + Sync {
    fn source(&self) -> ExtractionSource;

    fn extract(&self, input: &ClassifyInput<'_>, patterns: &Patterns) -> Option<Classification>;
}

/// Form fields of the request body, then an id pattern anywhere in it.
pub struct RequestBody;

impl Extractor for RequestBody {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::Request
    }

    fn extract(&self, input: &ClassifyInput<'_>, patterns: &Patterns) -> Option<Classification> {
        if input.request_body.is_empty() {
            return None;
        }
        let pairs: Vec<(String, String)> = form_urlencoded::parse(input.request_body.as_bytes())
            .into_owned()
            .collect();
        let tran_id = field(&pairs, &patterns.id_field)
            .or_else(|| patterns.find_id(input.request_body))?;
        let status = field(&pairs, &patterns.status_field);
        Some(Classification::found(tran_id, status, self.source()))
    }
}

/// Query parameters of the URL the response was finally served from.
pub struct FinalUrl;

impl Extractor for FinalUrl {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::FinalUrl
    }

    fn extract(&self, input: &ClassifyInput<'_>, patterns: &Patterns) -> Option<Classification> {
        if input.final_url.is_empty() {
            return None;
        }
        let url = patterns.resolve(input.final_url)?;
        let pairs = query_pairs(&url);
        let tran_id = field(&pairs, &patterns.id_field)
            .or_else(|| patterns.find_id(input.final_url))?;
        let status = field(&pairs, &patterns.status_field);
        Some(Classification::found(tran_id, status, self.source()))
    }
}

/// Query parameters of a 302's `Location` header.
pub struct RedirectLocation;

impl Extractor for RedirectLocation {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::RedirectLocation
    }

    fn extract(&self, input: &ClassifyInput<'_>, patterns: &Patterns) -> Option<Classification> {
        if input.status_code != 302 || input.headers_text.is_empty() {
            return None;
        }
        let headers = parse_headers(input.headers_text);
        let location = headers.get("location")?;
        let decoded = urlencoding::decode(location).ok()?.into_owned();
        let url = patterns.resolve(&decoded)?;
        let pairs = query_pairs(&url);
        let tran_id = field(&pairs, &patterns.id_field).or_else(|| patterns.find_id(&decoded))?;
        let status = field(&pairs, &patterns.status_field);

        let mut classification = Classification::found(tran_id, status, self.source());
        classification.location = Some(url.to_string());
        Some(classification)
    }
}

/// Id pattern and `status=VALID|FAILED` anywhere in the response body.
pub struct BodyScan;

impl Extractor for BodyScan {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::Body
    }

    fn extract(&self, input: &ClassifyInput<'_>, patterns: &Patterns) -> Option<Classification> {
        let tran_id = patterns.find_id(input.body)?;
        let status = patterns
            .status_token
            .captures(input.body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        Some(Classification::found(tran_id, status, self.source()))
    }
}

/// Parse `name: value` lines into a map keyed by lowercase name.
pub fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn query_pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs().into_owned().collect()
}

fn field(pairs: &[(String, String)], name: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers("Content-Type: text/html\r\nLocation:  /x?a=b:c \r\nbogus\r\n");
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(headers.get("location").map(String::as_str), Some("/x?a=b:c"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_field_skips_empty_values() {
        let pairs = vec![
            ("tran_id".to_string(), String::new()),
            ("tran_id".to_string(), "SBIMU1".to_string()),
        ];
        assert_eq!(field(&pairs, "tran_id").as_deref(), Some("SBIMU1"));
        assert_eq!(field(&pairs, "status"), None);
    }
}
