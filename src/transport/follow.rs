//! Follow-up confirmation GET.
//!
//! After an attempt yields a transaction id together with a success or
//! redirect signal, the confirmation page is fetched so its outcome is
//! attached to the attempt record.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::observability::journal::{preview, FollowUpResult};
use crate::transport::client::Transport;
use crate::transport::types::{OutboundRequest, TransportError};

/// Fetches a confirmation page over primary, then secondary.
pub struct FollowUp {
    primary: Arc<dyn Transport>,
    secondary: Option<Arc<dyn Transport>>,
    timeout: Duration,
    preview: usize,
}

impl FollowUp {
    pub fn new(
        primary: Arc<dyn Transport>,
        secondary: Option<Arc<dyn Transport>>,
        timeout: Duration,
        preview: usize,
    ) -> Self {
        Self {
            primary,
            secondary,
            timeout,
            preview,
        }
    }

    /// GET `url`. Never fails: a lost follow-up is recorded as a result
    /// without a status.
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FollowUpResult {
        let request = OutboundRequest::get(url);

        let error = match self.send(self.primary.as_ref(), &request, cancel).await {
            Ok(result) => return result,
            Err(error) => error,
        };

        let cancelled = error == TransportError::Cancelled;
        let error = match &self.secondary {
            Some(secondary) if !cancelled => {
                match self.send(secondary.as_ref(), &request, cancel).await {
                    Ok(result) => return result,
                    Err(error) => error,
                }
            }
            _ => error,
        };

        tracing::debug!(url, error = %error, "Follow-up GET failed");
        FollowUpResult {
            url: url.to_string(),
            status: None,
            body_preview: error.to_string(),
        }
    }

    async fn send(
        &self,
        transport: &dyn Transport,
        request: &OutboundRequest,
        cancel: &CancellationToken,
    ) -> Result<FollowUpResult, TransportError> {
        let response = tokio::time::timeout(self.timeout, transport.send(request, cancel))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        Ok(FollowUpResult {
            url: request.url.clone(),
            status: Some(response.status),
            body_preview: preview(&response.body, self.preview),
        })
    }
}

/// True when the confirmation page carries the word VALID on its own.
pub fn mentions_valid(body: &str) -> bool {
    body.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("VALID"))
}
