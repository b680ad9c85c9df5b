//! Dual-transport dispatch.
//!
//! # Data Flow
//! ```text
//! payload
//!     → primary POST (same origin)
//!         response  → settle: classify, counters, follow-up → result
//!         no response
//!             → fallback disabled → failed result
//!             → secondary POST (cross origin, bounded) → settle / failed result
//! ```
//!
//! # Design Decisions
//! - Every attempt is journaled at start and finalized exactly once
//! - An attempt counts toward in-flight only while its transport runs
//! - A cancelled primary never falls back

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::extractors::parse_headers;
use crate::classify::{Classification, ClassifyInput, ExtractionSource, Validity};
use crate::engine::context::EngineContext;
use crate::observability::journal::{AttemptFinish, AttemptId, AttemptStart, FollowUpResult};
use crate::observability::metrics;
use crate::observability::status::StatusMessage;
use crate::transport::client::{HttpTransport, Transport};
use crate::transport::follow::{mentions_valid, FollowUp};
use crate::transport::types::{is_ok_status, OutboundRequest, RawResponse, TransportError, TransportKind};

/// Outcome of one dispatch, whichever transport produced it.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub ok: bool,
    /// 0 when no transport produced a response.
    pub status_code: u16,
    pub body: String,
    pub final_url: Option<String>,
    pub headers_text: Option<String>,
    pub transport: TransportKind,
    /// Journal ids of every attempt this dispatch made, in order.
    pub attempts: Vec<AttemptId>,
    pub classification: Option<Classification>,
    pub follow_up: Option<FollowUpResult>,
    pub error: Option<TransportError>,
    pub note: Option<String>,
}

impl DispatchResult {
    fn failure(transport: TransportKind, error: TransportError, note: Option<String>) -> Self {
        Self {
            ok: false,
            status_code: 0,
            body: error.to_string(),
            final_url: None,
            headers_text: None,
            transport,
            attempts: Vec::new(),
            classification: None,
            follow_up: None,
            error: Some(error),
            note,
        }
    }
}

/// Sends payloads over the primary transport, falling back to the secondary.
pub struct Dispatcher {
    ctx: Arc<EngineContext>,
    primary: Arc<dyn Transport>,
    secondary: Option<Arc<dyn Transport>>,
    follow: FollowUp,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<EngineContext>,
        primary: Arc<dyn Transport>,
        secondary: Option<Arc<dyn Transport>>,
    ) -> Self {
        let follow = FollowUp::new(
            primary.clone(),
            secondary.clone(),
            Duration::from_secs(ctx.config.transport.follow_timeout_secs),
            ctx.config.journal.follow_preview,
        );
        Self {
            ctx,
            primary,
            secondary,
            follow,
        }
    }

    /// Dispatcher over reqwest transports built from the configuration.
    pub fn from_config(ctx: Arc<EngineContext>) -> Result<Self, TransportError> {
        let primary: Arc<dyn Transport> = Arc::new(HttpTransport::primary(&ctx.config.transport)?);
        let secondary: Option<Arc<dyn Transport>> =
            match HttpTransport::secondary(&ctx.config.transport) {
                Ok(transport) => Some(Arc::new(transport)),
                Err(e) => {
                    tracing::warn!(error = %e, "Secondary transport unavailable");
                    None
                }
            };
        Ok(Self::new(ctx, primary, secondary))
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Send `payload`, falling back once when the primary gets no response.
    pub async fn dispatch(
        &self,
        payload: &str,
        run_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let mut attempts = Vec::with_capacity(2);

        let request = OutboundRequest::form_post(self.ctx.primary_url(), payload);
        let primary = self
            .attempt(TransportKind::Primary, self.primary.as_ref(), &request, run_id, cancel, None, &mut attempts)
            .await;
        let error = match primary {
            Ok(mut result) => {
                result.attempts = attempts;
                return result;
            }
            Err(error) => error,
        };

        let mut result = if error == TransportError::Cancelled {
            DispatchResult::failure(TransportKind::Primary, error, None)
        } else if !self.ctx.fallback_allowed() {
            self.ctx.show(StatusMessage::warning(
                "⚠️ Primary transport failed and fallback is disabled",
            ));
            DispatchResult::failure(
                TransportKind::Primary,
                error,
                Some("fallback disabled".to_string()),
            )
        } else {
            self.fall_back(payload, run_id, cancel, &mut attempts).await
        };
        result.attempts = attempts;
        result
    }

    async fn fall_back(
        &self,
        payload: &str,
        run_id: Option<Uuid>,
        cancel: &CancellationToken,
        attempts: &mut Vec<AttemptId>,
    ) -> DispatchResult {
        let request = OutboundRequest::form_post(self.ctx.fallback_url(), payload);

        let Some(secondary) = &self.secondary else {
            let error = TransportError::Unavailable("no secondary transport".to_string());
            let id = self.journal_start(TransportKind::Secondary, &request, run_id);
            attempts.push(id);
            self.settle_failure(id, TransportKind::Secondary, &error, Duration::ZERO);
            return DispatchResult::failure(
                TransportKind::Secondary,
                error,
                Some("secondary transport unavailable".to_string()),
            );
        };

        let limit = Duration::from_secs(self.ctx.config.transport.fallback_timeout_secs);
        match self
            .attempt(TransportKind::Secondary, secondary.as_ref(), &request, run_id, cancel, Some(limit), attempts)
            .await
        {
            Ok(result) => result,
            Err(error) => DispatchResult::failure(TransportKind::Secondary, error, None),
        }
    }

    /// One journaled attempt over one transport. `Err` means no response.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        kind: TransportKind,
        transport: &dyn Transport,
        request: &OutboundRequest,
        run_id: Option<Uuid>,
        cancel: &CancellationToken,
        limit: Option<Duration>,
        attempts: &mut Vec<AttemptId>,
    ) -> Result<DispatchResult, TransportError> {
        let ctx = &self.ctx;
        let id = self.journal_start(kind, request, run_id);
        attempts.push(id);

        let guard = ctx.registry.begin_operation();
        let aborter = cancel.child_token();
        let handle = ctx.registry.register(Arc::new(aborter.clone()));
        let started = Instant::now();

        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, transport.send(request, &aborter))
                .await
                .unwrap_or(Err(TransportError::Timeout(limit))),
            None => transport.send(request, &aborter).await,
        };

        let elapsed = started.elapsed();
        ctx.registry.deregister(handle);
        guard.finish();

        match outcome {
            Ok(response) => Ok(self.settle_response(id, kind, request, response, elapsed, cancel).await),
            Err(error) => {
                self.settle_failure(id, kind, &error, elapsed);
                Err(error)
            }
        }
    }

    fn journal_start(&self, kind: TransportKind, request: &OutboundRequest, run_id: Option<Uuid>) -> AttemptId {
        let id = self.ctx.journal.start(AttemptStart {
            run_id,
            method: request.method.to_string(),
            url: request.url.clone(),
            request_body: request.body.clone().unwrap_or_default(),
            transport: kind,
        });
        if self.ctx.mirror_enabled() {
            tracing::info!(attempt = id, transport = kind.as_str(), method = %request.method, url = %request.url, "START");
        }
        id
    }

    fn settle_failure(&self, id: AttemptId, kind: TransportKind, error: &TransportError, elapsed: Duration) {
        metrics::record_attempt(kind, 0, false, elapsed);
        self.ctx.journal.finalize(
            id,
            AttemptFinish {
                ok: false,
                status_code: 0,
                elapsed,
                response_body: error.to_string(),
                note: Some(format!("{} transport: {}", kind.as_str(), error)),
                ..Default::default()
            },
        );
        if self.ctx.mirror_enabled() {
            tracing::warn!(attempt = id, transport = kind.as_str(), error = %error, "FAIL");
        }
        if *error == TransportError::Cancelled {
            self.ctx
                .show(StatusMessage::info(format!("⏹️ {} attempt cancelled", kind.as_str())));
        } else {
            self.ctx.show(StatusMessage::error(format!(
                "❌ {} transport failed: {}",
                kind.as_str(),
                error
            )));
        }
    }

    async fn settle_response(
        &self,
        id: AttemptId,
        kind: TransportKind,
        request: &OutboundRequest,
        response: RawResponse,
        elapsed: Duration,
        cancel: &CancellationToken,
    ) -> DispatchResult {
        let ctx = &self.ctx;
        let status = response.status;
        let ok = is_ok_status(status);
        metrics::record_attempt(kind, status, ok, elapsed);

        let headers_text = response.headers_text.as_deref().unwrap_or("");
        let final_url = response.final_url.as_deref().unwrap_or("");
        let classification = ctx.classifier.classify(&ClassifyInput {
            status_code: status,
            headers_text,
            body: &response.body,
            request_body: request.body.as_deref().unwrap_or(""),
            final_url,
        });

        let redirected = had_redirect(status, headers_text, final_url, &ctx.config.endpoints.api_path);
        if redirected {
            ctx.settings.bump_redirects();
        }
        if status == 200 {
            ctx.settings.bump_ok();
        }

        let eligible = ctx.config.endpoints.follow_enabled && (status == 200 || status == 302 || redirected);
        let mut note = None;
        let mut follow_up = None;

        let message = match classification.tran_id.as_deref() {
            Some(tran_id) => {
                if classification.validity == Validity::Valid {
                    ctx.settings.record_last_verified(tran_id);
                }
                if eligible && !ctx.is_stopped() && !cancel.is_cancelled() {
                    let url = match (&classification.source, &classification.location) {
                        (ExtractionSource::RedirectLocation, Some(location)) => location.clone(),
                        _ => ctx.follow_url(tran_id),
                    };
                    let result = self.follow.fetch(&url, cancel).await;
                    if result.is_confirmed() {
                        ctx.settings.bump_ok();
                        if mentions_valid(&result.body_preview) {
                            ctx.settings.record_last_verified(tran_id);
                        }
                    }
                    follow_up = Some(result);
                }
                match classification.validity {
                    Validity::Failed => StatusMessage::warning(format!(
                        "Result for {}: {}",
                        tran_id,
                        classification.status.as_deref().unwrap_or("UNKNOWN")
                    )),
                    _ => StatusMessage::success(format!("✅ CONFIRMED: {}", tran_id)),
                }
            }
            None if eligible => {
                note = Some("TRAN_ID not found".to_string());
                StatusMessage::warning(format!("⚠️ TRAN_ID not found [HTTP {}]", status))
            }
            None if ok => StatusMessage::success(format!(
                "HTTP {} via {} ({} ms)",
                status,
                kind.as_str(),
                elapsed.as_millis()
            )),
            None => StatusMessage::error(format!(
                "HTTP {} via {} ({} ms)",
                status,
                kind.as_str(),
                elapsed.as_millis()
            )),
        };
        ctx.show(message);

        ctx.journal.finalize(
            id,
            AttemptFinish {
                ok,
                status_code: status,
                elapsed,
                headers_text: response.headers_text.clone(),
                final_url: response.final_url.clone(),
                response_body: response.body.clone(),
                note: note.clone(),
                classification: Some(classification.clone()),
                follow_up: follow_up.clone(),
            },
        );
        if ctx.mirror_enabled() {
            tracing::info!(
                attempt = id,
                transport = kind.as_str(),
                status,
                ok,
                elapsed_ms = elapsed.as_millis() as u64,
                tran_id = ?classification.tran_id,
                "{}",
                if ok { "DONE" } else { "FAIL" }
            );
        }

        DispatchResult {
            ok,
            status_code: status,
            body: response.body,
            final_url: response.final_url,
            headers_text: response.headers_text,
            transport: kind,
            attempts: Vec::new(),
            classification: Some(classification),
            follow_up,
            error: None,
            note,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("secondary", &self.secondary.is_some())
            .finish()
    }
}

/// A 302, a `Location` header, or a final URL off the API path.
pub fn had_redirect(status: u16, headers_text: &str, final_url: &str, api_path: &str) -> bool {
    status == 302
        || parse_headers(headers_text).contains_key("location")
        || (!final_url.is_empty() && !final_url.contains(api_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const API: &str = "/api/payment/appointment/process";

    #[test]
    fn test_had_redirect() {
        assert!(had_redirect(302, "", "", API));
        assert!(had_redirect(200, "Location: /x", "", API));
        assert!(had_redirect(200, "", "https://a/payment-response/1", API));
        assert!(!had_redirect(200, "content-type: text/html", "", API));
        assert!(!had_redirect(200, "", "https://a/api/payment/appointment/process", API));
    }
}
