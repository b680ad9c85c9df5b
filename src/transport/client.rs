//! HTTP transports.
//!
//! # Responsibilities
//! - Send one request and report the raw response
//! - Keep a cookie store so credentials ride along
//! - Abort promptly when the attempt's cancellation token fires

use async_trait::async_trait;
use reqwest::redirect::Policy;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::transport::types::{OutboundRequest, RawResponse, TransportError};

/// One request-sending mechanism.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`; an `Err` means no response was received.
    async fn send(
        &self,
        request: &OutboundRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Build a transport with an optional whole-request timeout.
    pub fn new(config: &TransportConfig, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let redirect = if config.follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(redirect)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Same-origin transport.
    pub fn primary(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::new(config, config.primary_timeout_secs.map(Duration::from_secs))
    }

    /// Cross-origin fallback transport.
    pub fn secondary(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::new(config, Some(Duration::from_secs(config.fallback_timeout_secs)))
    }

    fn map_error(&self, error: reqwest::Error) -> TransportError {
        match self.timeout {
            Some(timeout) if error.is_timeout() => TransportError::Timeout(timeout),
            _ => TransportError::Network(error.to_string()),
        }
    }

    async fn exchange(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let headers_text = format_headers(response.headers());
        let final_url = Some(response.url().to_string()).filter(|url| *url != request.url);
        // An unreadable body still counts as a received response.
        let body = response.text().await.unwrap_or_default();

        Ok(RawResponse {
            status,
            body,
            headers_text: Some(headers_text).filter(|text| !text.is_empty()),
            final_url,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &OutboundRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.exchange(request) => result,
        }
    }
}

fn format_headers(headers: &reqwest::header::HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_reports_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(header("content-type", crate::transport::types::FORM_CONTENT_TYPE))
            .and(body_string("a=1"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/done?tran_id=SBIMU7")
                    .set_body_string("moved"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::primary(&TransportConfig::default()).unwrap();
        let request = OutboundRequest::form_post(format!("{}/api", server.uri()), "a=1");
        let response = transport.send(&request, &CancellationToken::new()).await.unwrap();

        assert_eq!(response.status, 302);
        assert_eq!(response.body, "moved");
        assert!(response
            .headers_text
            .unwrap()
            .contains("location: /done?tran_id=SBIMU7"));
        assert_eq!(response.final_url, None);
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let transport = HttpTransport::primary(&TransportConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport
            .send(&OutboundRequest::get(server.uri()), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Cancelled);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let transport = HttpTransport::primary(&TransportConfig::default()).unwrap();
        let err = transport
            .send(&OutboundRequest::get("http://127.0.0.1:9/"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }
}
