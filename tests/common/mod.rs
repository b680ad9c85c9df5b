//! Shared utilities for engine integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::Method;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use payment_relay::engine::{EngineContext, Orchestrator};
use payment_relay::observability::RecordingStatusSink;
use payment_relay::settings::SettingsStore;
use payment_relay::transport::{Dispatcher, OutboundRequest, RawResponse, Transport, TransportError};
use payment_relay::EngineConfig;

/// What a scripted transport does with one POST.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(RawResponse),
    Fail(TransportError),
    /// Respond after a delay unless cancelled first.
    After(Duration, RawResponse),
    /// Respond after a delay, ignoring cancellation.
    Stubborn(Duration, RawResponse),
    /// Never respond; only cancellation ends it.
    Hang,
}

/// Transport that answers POSTs from a script and GETs with a fixed page.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    otherwise: Reply,
    follow: RawResponse,
    posts: AtomicUsize,
    gets: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Reply>, otherwise: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            otherwise,
            follow: RawResponse::new(404, "not found"),
            posts: AtomicUsize::new(0),
            gets: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(Vec::new(), reply)
    }

    pub fn follow_with(mut self, response: RawResponse) -> Self {
        self.follow = response;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    pub fn get_urls(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &OutboundRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        if request.method == Method::GET {
            self.gets.lock().unwrap().push(request.url.clone());
            return Ok(self.follow.clone());
        }

        self.posts.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());

        match reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(error) => Err(error),
            Reply::After(delay, response) => tokio::select! {
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(response),
            },
            Reply::Stubborn(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Reply::Hang => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
        }
    }
}

pub fn response(status: u16, body: &str) -> RawResponse {
    RawResponse::new(status, body)
}

pub fn redirect(location: &str) -> RawResponse {
    RawResponse {
        status: 302,
        body: String::new(),
        headers_text: Some(format!("location: {}", location)),
        final_url: None,
    }
}

pub fn network_error() -> Reply {
    Reply::Fail(TransportError::Network("connection refused".into()))
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.endpoints.same_origin_base = "https://pay.test".into();
    config.endpoints.cross_origin_base = "https://api-pay.test".into();
    config.settings.path = None;
    config
}

pub struct Harness {
    pub ctx: Arc<EngineContext>,
    pub sink: Arc<RecordingStatusSink>,
    pub dispatcher: Arc<Dispatcher>,
    pub orchestrator: Orchestrator,
}

pub fn harness(
    config: EngineConfig,
    primary: Arc<ScriptedTransport>,
    secondary: Option<Arc<ScriptedTransport>>,
) -> Harness {
    let sink = Arc::new(RecordingStatusSink::new());
    let ctx = EngineContext::new(config, SettingsStore::in_memory(), sink.clone()).unwrap();
    let secondary = secondary.map(|s| s as Arc<dyn Transport>);
    let dispatcher = Arc::new(Dispatcher::new(ctx.clone(), primary, secondary));
    Harness {
        ctx,
        sink,
        orchestrator: Orchestrator::new(dispatcher.clone()),
        dispatcher,
    }
}
