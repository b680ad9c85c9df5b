//! Cancellation handles.
//!
//! Every cancellable operation (transport aborter, run controller, retry
//! wait) is held by the registry as an `Arc<dyn Cancel>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A single idempotent cancel operation.
pub trait Cancel: Send + Sync {
    /// Cancel the operation. Calling this more than once has no further effect.
    fn cancel(&self);
}

impl Cancel for CancellationToken {
    fn cancel(&self) {
        CancellationToken::cancel(self);
    }
}

/// How a [`CancellableDelay`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    Elapsed,
    Cancelled,
}

/// A real-time wait that can be resolved early.
///
/// Clones share state, so one clone can sit in the registry while another
/// is awaited.
#[derive(Debug, Clone)]
pub struct CancellableDelay {
    duration: Duration,
    token: CancellationToken,
    resolved: Arc<AtomicBool>,
}

impl CancellableDelay {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            token: CancellationToken::new(),
            resolved: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Wait until the duration elapses or the delay is cancelled.
    pub async fn wait(&self) -> DelayOutcome {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => DelayOutcome::Cancelled,
            _ = tokio::time::sleep(self.duration) => {
                self.resolved.store(true, Ordering::SeqCst);
                DelayOutcome::Elapsed
            }
        }
    }

    /// Resolve the delay now. Returns false when it had already resolved.
    pub fn try_cancel(&self) -> bool {
        if self.resolved.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// True once the delay elapsed or was cancelled.
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }
}

impl Cancel for CancellableDelay {
    fn cancel(&self) {
        self.try_cancel();
    }
}
