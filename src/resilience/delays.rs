//! Retry delay candidates.
//!
//! A non-empty set of positive durations (seconds). One is drawn at random
//! for every retry, always from the set current at that instant.

use arc_swap::ArcSwap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::cancel::CancellableDelay;
use crate::settings::SettingsStore;

/// Used when a stored candidate is somehow unusable.
const FALLBACK_DELAY_SECS: f64 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum DelayError {
    /// The edit contained no positive number.
    #[error("invalid delay list '{input}': expected comma-separated positive numbers")]
    InvalidInput { input: String },
}

/// A positive number of seconds that fits in a `Duration`.
pub fn is_valid_delay(secs: f64) -> bool {
    secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

/// Parse a comma-separated list, keeping only valid delays.
pub fn parse_delay_list(text: &str) -> Vec<f64> {
    text.split(',')
        .filter_map(|token| token.trim().parse::<f64>().ok())
        .filter(|value| is_valid_delay(*value))
        .collect()
}

/// Render candidates the way they are edited.
pub fn format_delay_list(candidates: &[f64]) -> String {
    candidates
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Holds the candidate set and persists edits.
pub struct DelayProvider {
    candidates: ArcSwap<Vec<f64>>,
    store: Arc<SettingsStore>,
}

impl DelayProvider {
    /// Start from persisted candidates when present, otherwise from `defaults`.
    pub fn new(defaults: &[f64], store: Arc<SettingsStore>) -> Self {
        let persisted = store.read(|s| s.delays.clone());
        let mut initial: Vec<f64> = if persisted.is_empty() {
            defaults.to_vec()
        } else {
            persisted
        };
        initial.retain(|value| is_valid_delay(*value));
        if initial.is_empty() {
            initial.push(FALLBACK_DELAY_SECS);
        }

        Self {
            candidates: ArcSwap::from_pointee(initial),
            store,
        }
    }

    /// Snapshot of the current candidates.
    pub fn current(&self) -> Arc<Vec<f64>> {
        self.candidates.load_full()
    }

    /// Replace the candidates from user text.
    ///
    /// An edit that yields no positive number is rejected and the previous
    /// set is kept.
    pub fn apply_edit(&self, text: &str) -> Result<Arc<Vec<f64>>, DelayError> {
        let parsed = parse_delay_list(text);
        if parsed.is_empty() {
            tracing::warn!(input = %text, "Rejected delay list edit");
            return Err(DelayError::InvalidInput {
                input: text.to_string(),
            });
        }

        let parsed = Arc::new(parsed);
        self.candidates.store(parsed.clone());
        self.store.update(|s| s.delays = parsed.to_vec());
        tracing::info!(delays = %format_delay_list(&parsed), "Delay candidates updated");
        Ok(parsed)
    }

    /// Draw one candidate uniformly at random.
    pub fn draw(&self) -> Duration {
        let candidates = self.candidates.load();
        let secs = if candidates.is_empty() {
            FALLBACK_DELAY_SECS
        } else {
            let index = rand::thread_rng().gen_range(0..candidates.len());
            candidates[index]
        };
        Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|_| secs > 0.0)
            .unwrap_or(Duration::from_secs(FALLBACK_DELAY_SECS as u64))
    }

    /// A cancellable wait for a freshly drawn duration.
    pub fn next_wait(&self) -> CancellableDelay {
        CancellableDelay::new(self.draw())
    }
}

impl std::fmt::Debug for DelayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayProvider")
            .field("candidates", &self.current())
            .finish()
    }
}
