//! Shared engine state.
//!
//! One `EngineContext` is built at startup and handed (as `Arc`) to every
//! component. It owns the registry, delay candidates, settings, journal and
//! classifier; nothing in the engine reaches for globals.

use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::observability::journal::AttemptJournal;
use crate::observability::status::{StatusMessage, StatusSink};
use crate::resilience::delays::{DelayError, DelayProvider};
use crate::resilience::registry::Registry;
use crate::settings::SettingsStore;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid same-origin base URL: {0}")]
    Base(#[from] url::ParseError),

    #[error("invalid transaction id pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Process-wide state of the relay.
pub struct EngineContext {
    pub config: EngineConfig,
    pub registry: Registry,
    pub delays: DelayProvider,
    pub settings: Arc<SettingsStore>,
    pub journal: AttemptJournal,
    pub classifier: Classifier,
    status: Arc<dyn StatusSink>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        settings: SettingsStore,
        status: Arc<dyn StatusSink>,
    ) -> Result<Arc<Self>, ContextError> {
        let base = Url::parse(&config.endpoints.same_origin_base)?;
        let classifier = Classifier::new(&config.classifier, Some(base))?;
        let settings = Arc::new(settings);
        let delays = DelayProvider::new(&config.delays.candidates_secs, settings.clone());
        let journal = AttemptJournal::new(&config.journal);

        Ok(Arc::new(Self {
            config,
            registry: Registry::new(),
            delays,
            settings,
            journal,
            classifier,
            status,
        }))
    }

    /// Surface a status message.
    pub fn show(&self, message: StatusMessage) {
        self.status.show(message);
    }

    pub fn is_stopped(&self) -> bool {
        self.registry.is_stopped()
    }

    /// Cancel every operation and retry.
    pub fn stop_all(&self) -> usize {
        let cancelled = self.registry.stop_all();
        self.show(StatusMessage::error("🛑 All operations and retries cancelled"));
        cancelled
    }

    pub fn fallback_allowed(&self) -> bool {
        self.settings.read(|s| s.allow_fallback)
    }

    pub fn set_fallback_allowed(&self, allowed: bool) {
        self.settings.update(|s| s.allow_fallback = allowed);
    }

    /// Short label of the transport policy.
    pub fn fallback_mode_label(&self) -> &'static str {
        if self.fallback_allowed() {
            "Fetch+Fallback"
        } else {
            "Fetch-only"
        }
    }

    pub fn mirror_enabled(&self) -> bool {
        self.settings.read(|s| s.mirror)
    }

    /// Apply a comma-separated delay edit, warning on invalid input.
    pub fn edit_delays(&self, text: &str) -> Result<Arc<Vec<f64>>, DelayError> {
        match self.delays.apply_edit(text) {
            Ok(delays) => {
                self.show(StatusMessage::info(format!(
                    "Retry delays set to {}s",
                    crate::resilience::delays::format_delay_list(&delays)
                )));
                Ok(delays)
            }
            Err(e) => {
                self.show(StatusMessage::warning(
                    "⚠️ Invalid delays. Use comma-separated positive numbers",
                ));
                Err(e)
            }
        }
    }

    /// Clear the journal, zero the counters and forget the last verified id.
    pub fn reset_totals(&self) {
        self.journal.clear();
        self.settings.reset_totals();
        self.show(StatusMessage::success("🧹 Log cleared and totals reset"));
    }

    /// URL of the payment endpoint on the same origin.
    pub fn primary_url(&self) -> String {
        join_url(&self.config.endpoints.same_origin_base, &self.config.endpoints.api_path)
    }

    /// URL of the payment endpoint on the fallback origin.
    pub fn fallback_url(&self) -> String {
        join_url(&self.config.endpoints.cross_origin_base, &self.config.endpoints.api_path)
    }

    /// Follow-up URL for a transaction id.
    pub fn follow_url(&self, tran_id: &str) -> String {
        let path = self
            .config
            .endpoints
            .follow_path_template
            .replace("{TRAN_ID}", &urlencoding::encode(tran_id));
        join_url(&self.config.endpoints.same_origin_base, &path)
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("registry", &self.registry)
            .field("delays", &self.delays)
            .field("journal", &self.journal)
            .finish()
    }
}

/// Join a base and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
