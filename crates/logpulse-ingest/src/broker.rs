//! Message-broker ingestion.
//!
//! One consumer task runs per topic. Each task connects, polls with a
//! bounded timeout, decodes every message into domain events and hands them
//! to the registered callbacks in arrival order. Connection and poll
//! failures are logged and retried after a fixed backoff, indefinitely.
//!
//! Offsets are committed by the broker client on its own schedule, not after
//! callbacks finish: a message polled just before a crash may never reach the
//! store.

use futures_util::future::BoxFuture;
use logpulse_types::EventKind;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::decode::decode_message;
use crate::registry::ConsumerRegistry;
use crate::worker::{requested, sleep_or_shutdown, Shutdown, Workers};

/// Errors reported by a broker client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Could not create or subscribe a consumer.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// An established consumer failed while polling.
    #[error("broker poll failed: {0}")]
    Poll(String),
}

/// Creates topic consumers. Implemented per broker technology.
pub trait BrokerConnector: Send + Sync + 'static {
    /// Connects a consumer in `group_id` subscribed to `topic`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Connect` if the broker cannot be reached.
    fn connect(&self, topic: &str, group_id: &str) -> Result<Box<dyn TopicConsumer>, BrokerError>;
}

/// A connected consumer for a single topic.
pub trait TopicConsumer: Send {
    /// Waits up to `timeout` for messages and returns their raw payloads.
    ///
    /// An empty batch means nothing arrived in time.
    fn poll(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Vec<Vec<u8>>, BrokerError>>;
}

/// Fills a poll batch for consumers that receive one message at a time.
///
/// `next` yields the payload of the next message, or `None` for a message
/// without one. Collection stops after `max` payloads or once `timeout` has
/// elapsed. A receive error ends the batch: payloads already collected are
/// returned so they still reach the callbacks, and the error is only
/// reported when nothing was collected.
///
/// # Errors
///
/// Returns the receive error if it occurs before any payload is collected.
pub async fn collect_batch<F, Fut>(
    timeout: Duration,
    max: usize,
    mut next: F,
) -> Result<Vec<Vec<u8>>, BrokerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<Vec<u8>>, BrokerError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut batch = Vec::new();

    while batch.len() < max {
        let received = match tokio::time::timeout_at(deadline, next()).await {
            Ok(received) => received,
            Err(_) => break,
        };
        match received {
            Ok(Some(payload)) => batch.push(payload),
            Ok(None) => {}
            Err(e) if batch.is_empty() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    collected = batch.len(),
                    "receive failed mid-batch; delivering collected messages"
                );
                break;
            }
        }
    }

    Ok(batch)
}

/// Topic names, one per event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub logs: String,
    pub classifications: String,
    pub anomaly_params: String,
}

impl Topics {
    pub fn for_kind(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Log => &self.logs,
            EventKind::Classification => &self.classifications,
            EventKind::AnomalyParam => &self.anomaly_params,
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            logs: "logs".to_string(),
            classifications: "classifications".to_string(),
            anomaly_params: "anomaly_params".to_string(),
        }
    }
}

/// Tunables for [`BrokerSource`].
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub topics: Topics,
    /// Base consumer group; each topic consumes as `<group>-<kind>`.
    pub consumer_group: String,
    pub poll_timeout: Duration,
    /// Fixed delay before reconnecting after a failure.
    pub backoff: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            topics: Topics::default(),
            consumer_group: "dashboard-backend".to_string(),
            poll_timeout: Duration::from_millis(1_000),
            backoff: Duration::from_secs(5),
        }
    }
}

/// Ingestion source backed by a message broker.
pub struct BrokerSource {
    connector: Arc<dyn BrokerConnector>,
    settings: BrokerSettings,
    registry: ConsumerRegistry,
    workers: Workers,
}

impl BrokerSource {
    pub fn new(connector: Arc<dyn BrokerConnector>, settings: BrokerSettings) -> Self {
        Self {
            connector,
            settings,
            registry: ConsumerRegistry::new(),
            workers: Workers::new(),
        }
    }

    pub fn registry(&self) -> &ConsumerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    /// Spawns one consumer task per topic.
    pub fn start(&mut self) {
        if self.workers.is_running() {
            return;
        }

        for kind in EventKind::ALL {
            let task = TopicTask {
                kind,
                topic: self.settings.topics.for_kind(kind).to_string(),
                group_id: format!("{}-{}", self.settings.consumer_group, kind.as_str()),
                poll_timeout: self.settings.poll_timeout,
                backoff: self.settings.backoff,
                connector: self.connector.clone(),
                registry: self.registry.clone(),
            };
            let shutdown = self.workers.shutdown_signal();
            self.workers.spawn(task.run(shutdown));
        }

        tracing::info!(
            group = %self.settings.consumer_group,
            "started broker ingestion"
        );
    }

    /// Stops every consumer task and waits for them to exit.
    pub async fn stop(&mut self) {
        if !self.workers.is_running() {
            return;
        }
        self.workers.stop().await;
        tracing::info!("stopped broker ingestion");
    }
}

struct TopicTask {
    kind: EventKind,
    topic: String,
    group_id: String,
    poll_timeout: Duration,
    backoff: Duration,
    connector: Arc<dyn BrokerConnector>,
    registry: ConsumerRegistry,
}

impl TopicTask {
    async fn run(self, mut shutdown: Shutdown) {
        while !*shutdown.borrow() {
            let mut consumer = match self.connector.connect(&self.topic, &self.group_id) {
                Ok(consumer) => consumer,
                Err(e) => {
                    tracing::error!(
                        topic = %self.topic,
                        error = %e,
                        backoff_secs = self.backoff.as_secs_f64(),
                        "failed to connect topic consumer; retrying"
                    );
                    if sleep_or_shutdown(&mut shutdown, self.backoff).await {
                        break;
                    }
                    continue;
                }
            };

            tracing::info!(topic = %self.topic, group = %self.group_id, "started consuming");

            match self.consume(consumer.as_mut(), &mut shutdown).await {
                None => break,
                Some(e) => {
                    tracing::error!(
                        topic = %self.topic,
                        error = %e,
                        backoff_secs = self.backoff.as_secs_f64(),
                        "topic consumer failed; reconnecting"
                    );
                    drop(consumer);
                    if sleep_or_shutdown(&mut shutdown, self.backoff).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(topic = %self.topic, "stopped consuming");
    }

    /// Polls until shutdown (`None`) or a consumer failure (`Some`).
    async fn consume(
        &self,
        consumer: &mut dyn TopicConsumer,
        shutdown: &mut Shutdown,
    ) -> Option<BrokerError> {
        loop {
            let polled = tokio::select! {
                () = requested(shutdown) => return None,
                polled = consumer.poll(self.poll_timeout) => polled,
            };

            let payloads = match polled {
                Ok(payloads) => payloads,
                Err(e) => return Some(e),
            };

            for payload in payloads {
                match decode_message(self.kind, &payload) {
                    Ok(events) => {
                        for event in events {
                            self.registry.dispatch(event).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(topic = %self.topic, error = %e, "skipping malformed message");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    type Step = Result<Option<Vec<u8>>, BrokerError>;

    /// Replays `steps` one message at a time, then waits forever.
    struct ScriptedConsumer {
        steps: VecDeque<Step>,
    }

    impl ScriptedConsumer {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                steps: steps.into_iter().collect(),
            }
        }
    }

    impl TopicConsumer for ScriptedConsumer {
        fn poll(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Vec<Vec<u8>>, BrokerError>> {
            let steps = &mut self.steps;
            Box::pin(collect_batch(timeout, 10, move || {
                let step = steps.pop_front();
                async move {
                    match step {
                        Some(step) => step,
                        None => std::future::pending().await,
                    }
                }
            }))
        }
    }

    fn payload(text: &str) -> Step {
        Ok(Some(text.as_bytes().to_vec()))
    }

    fn failure() -> Step {
        Err(BrokerError::Poll("broker transport failure".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn error_after_payloads_keeps_the_batch() {
        let mut consumer = ScriptedConsumer::new([payload("a"), payload("b"), failure()]);

        let batch = consumer.poll(Duration::from_secs(1)).await.expect("partial batch");
        assert_eq!(batch, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn error_before_any_payload_is_reported() {
        let mut consumer = ScriptedConsumer::new([failure(), payload("late")]);

        let err = consumer.poll(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, BrokerError::Poll(_)));

        let batch = consumer.poll(Duration::from_secs(1)).await.expect("next poll");
        assert_eq!(batch, vec![b"late".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_stops_at_max_or_timeout() {
        let steps = (0..12).map(|n| payload(&n.to_string()));
        let mut consumer = ScriptedConsumer::new(steps.chain([Ok(None)]));

        let first = consumer.poll(Duration::from_secs(1)).await.expect("full batch");
        assert_eq!(first.len(), 10);

        let started = tokio::time::Instant::now();
        let second = consumer.poll(Duration::from_secs(1)).await.expect("timed out batch");
        assert_eq!(second, vec![b"10".to_vec(), b"11".to_vec()]);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
