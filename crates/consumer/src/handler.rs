//! Handler contract for consumed events.

use std::sync::Arc;

use async_trait::async_trait;
use broker::EventEnvelope;
use tracing::warn;

use crate::HandlerError;

/// Processes events delivered by the consumer loop.
///
/// Delivery is at-least-once: the same event id may arrive more than once, so
/// implementations must be idempotent.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler, used in logs.
    fn name(&self) -> &'static str;

    /// Handles one event received on `topic`.
    async fn handle(&self, topic: &str, event: &EventEnvelope) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T: EventHandler + ?Sized> EventHandler for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn handle(&self, topic: &str, event: &EventEnvelope) -> Result<(), HandlerError> {
        (**self).handle(topic, event).await
    }
}

/// Runs several handlers for every event.
///
/// Every registered handler sees every event, even when an earlier one fails.
/// The set fails if any member failed.
#[derive(Default)]
pub struct HandlerSet {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Handlers run in registration order.
    pub fn register(&mut self, handler: Box<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.register(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl EventHandler for HandlerSet {
    fn name(&self) -> &'static str {
        "HandlerSet"
    }

    async fn handle(&self, topic: &str, event: &EventEnvelope) -> Result<(), HandlerError> {
        let mut failures = Vec::new();
        for handler in &self.handlers {
            if let Err(e) = handler.handle(topic, event).await {
                warn!(handler = handler.name(), error = %e, "Handler in set failed");
                failures.push(format!("{}: {e}", handler.name()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::Failed(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &'static str {
            "Counting"
        }

        async fn handle(&self, _topic: &str, _event: &EventEnvelope) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(HandlerError::failed("boom"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn every_handler_runs_even_after_a_failure() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let set = HandlerSet::new()
            .with(Counting {
                calls: first.clone(),
                fail: true,
            })
            .with(Counting {
                calls: second.clone(),
                fail: false,
            });

        let event = EventEnvelope::new("T", serde_json::json!({}));
        let result = set.handle("t", &event).await;

        assert!(matches!(result, Err(HandlerError::Failed(ref m)) if m.contains("boom")));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_set_succeeds() {
        let set = HandlerSet::new();
        assert!(set.is_empty());
        let event = EventEnvelope::new("T", serde_json::json!({}));
        assert!(set.handle("t", &event).await.is_ok());
    }
}
