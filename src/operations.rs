//! Cooperative cancellation (spec §4.10).
//!
//! A process-wide registry maps a client-provided `operation_id` to a
//! cancel token. Handlers register on entry and release on exit; a
//! separate cancel endpoint flips the token's flag if the id is known.
//! Cancel-aware callees race their in-flight I/O against the token
//! (Design Notes §9: "Model as a context/cancel token passed through
//! every I/O call; race the I/O future against the token").

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{RagError, Result};

/// A single cancellable operation's signal. Cheap to clone; all clones
/// share the same underlying flag.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn fire(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Races `fut` against this token. Returns `OperationCancelled` if the
    /// token fires first, otherwise the future's own result.
    pub async fn race<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(RagError::OperationCancelled);
        }
        tokio::select! {
            biased;
            _ = self.notify.notified(), if !self.is_cancelled() => {
                Err(RagError::OperationCancelled)
            }
            result = fut => result,
        }
    }

    /// Checkpoint called between units of work in a loop (embedding
    /// batches, contextualization per chunk).
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RagError::OperationCancelled)
        } else {
            Ok(())
        }
    }
}

/// Process-wide registry of in-flight operations.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    inner: Arc<Mutex<HashMap<String, CancelToken>>>,
}

/// RAII guard returned by `register`; releases the operation id when
/// dropped, covering both normal returns and early `?` exits.
pub struct OperationGuard {
    registry: OperationRegistry,
    operation_id: String,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.registry.release(&self.operation_id);
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `operation_id` for the lifetime of the returned guard,
    /// returning the token cancel-aware callees should race their I/O
    /// against.
    pub fn register(&self, operation_id: &str) -> (CancelToken, OperationGuard) {
        let token = CancelToken::new();
        self.inner
            .lock()
            .insert(operation_id.to_string(), token.clone());
        (
            token,
            OperationGuard {
                registry: self.clone(),
                operation_id: operation_id.to_string(),
            },
        )
    }

    fn release(&self, operation_id: &str) {
        self.inner.lock().remove(operation_id);
    }

    /// Sets the cancel flag for `operation_id` if it is currently
    /// tracked. Returns `false` without error for an unknown id.
    pub fn cancel(&self, operation_id: &str) -> bool {
        match self.inner.lock().get(operation_id) {
            Some(token) => {
                token.fire();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_unknown_id_returns_false() {
        let registry = OperationRegistry::new();
        assert!(!registry.cancel("missing"));
    }

    #[tokio::test]
    async fn cancel_before_resolution_wins_the_race() {
        let registry = OperationRegistry::new();
        let (token, _guard) = registry.register("op-1");

        let fut = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, RagError>(42)
        };

        let race = token.race(fut);
        registry.cancel("op-1");

        let result = race.await;
        assert!(matches!(result, Err(RagError::OperationCancelled)));
    }

    #[tokio::test]
    async fn release_on_guard_drop_makes_id_unknown() {
        let registry = OperationRegistry::new();
        {
            let (_token, _guard) = registry.register("op-2");
        }
        assert!(!registry.cancel("op-2"));
    }
}
