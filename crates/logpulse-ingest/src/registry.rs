//! Per-kind callback registry.

use futures_util::future::BoxFuture;
use logpulse_types::{EventKind, IngestEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// A registered event consumer.
pub type EventCallback = Arc<dyn Fn(IngestEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callbacks attached to a source, keyed by event kind.
///
/// Uses `std::sync::RwLock` because every lock acquisition is a brief map
/// operation; callbacks are cloned out and awaited after the guard drops.
#[derive(Clone, Default)]
pub struct ConsumerRegistry {
    callbacks: Arc<RwLock<HashMap<EventKind, Vec<EventCallback>>>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback for `kind`.
    pub fn register<F, Fut>(&self, kind: EventKind, callback: F)
    where
        F: Fn(IngestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: EventCallback =
            Arc::new(move |event: IngestEvent| -> BoxFuture<'static, ()> {
                Box::pin(callback(event))
            });
        let mut callbacks = match self.callbacks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        callbacks.entry(kind).or_default().push(boxed);
    }

    /// Number of callbacks registered for `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        let callbacks = match self.callbacks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        callbacks.get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every callback registered for the event's kind, one after
    /// another, and returns how many ran.
    pub async fn dispatch(&self, event: IngestEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<EventCallback> = {
            let callbacks = match self.callbacks.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            callbacks.get(&kind).cloned().unwrap_or_default()
        };

        if targets.is_empty() {
            tracing::debug!(kind = %kind, "no consumers registered; event discarded");
            return 0;
        }

        for callback in &targets {
            callback(event.clone()).await;
        }
        targets.len()
    }
}
