//! Ingestion sources for the logpulse pipeline.
//!
//! An ingestion source produces typed [`IngestEvent`]s and hands each one to
//! the callbacks registered for its [`EventKind`]. Two sources share that
//! contract:
//!
//! - [`BrokerSource`] consumes one message-bus topic per event kind, decoding
//!   each message and reconnecting with a fixed backoff when the broker is
//!   unreachable.
//! - [`SyntheticSource`] generates randomized but schema-valid telemetry on a
//!   fixed interval, for running the pipeline without a broker.
//!
//! [`IngestionSource`] wraps whichever variant configuration selected, so the
//! rest of the process never branches on the mode again.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut source = IngestionSource::Synthetic(SyntheticSource::new(Duration::from_secs(5), None));
//! source.register_consumer(EventKind::Log, move |event| {
//!     let router = router.clone();
//!     async move { router.handle(event).await; }
//! });
//! source.start();
//! // ...
//! source.stop().await;
//! ```

mod broker;
mod decode;
#[cfg(feature = "kafka")]
mod kafka;
mod registry;
mod synthetic;
mod worker;

pub use broker::{
    collect_batch, BrokerConnector, BrokerError, BrokerSettings, BrokerSource, TopicConsumer,
    Topics,
};
pub use decode::{decode_message, DecodeError};
#[cfg(feature = "kafka")]
pub use kafka::KafkaConnector;
pub use registry::{ConsumerRegistry, EventCallback};
pub use synthetic::{Generator, SyntheticSource, Tick};

use logpulse_types::{EventKind, IngestEvent};
use std::future::Future;

/// The active ingestion source, selected once at startup.
pub enum IngestionSource {
    /// Consumes telemetry from a message broker.
    Broker(BrokerSource),
    /// Generates synthetic telemetry.
    Synthetic(SyntheticSource),
}

impl IngestionSource {
    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Broker(_) => "broker",
            Self::Synthetic(_) => "synthetic",
        }
    }

    /// Returns the callback registry shared by this source's tasks.
    pub fn registry(&self) -> &ConsumerRegistry {
        match self {
            Self::Broker(source) => source.registry(),
            Self::Synthetic(source) => source.registry(),
        }
    }

    /// Attaches `callback` to every event of `kind` this source produces.
    ///
    /// Several callbacks may be registered per kind; each one is invoked once
    /// per event, in registration order.
    pub fn register_consumer<F, Fut>(&self, kind: EventKind, callback: F)
    where
        F: Fn(IngestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry().register(kind, callback);
    }

    /// Begins asynchronous production. Calling `start` on a running source
    /// does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        match self {
            Self::Broker(source) => source.start(),
            Self::Synthetic(source) => source.start(),
        }
    }

    /// Requests shutdown and waits for every production task to exit.
    ///
    /// No callback fires after `stop` returns.
    pub async fn stop(&mut self) {
        match self {
            Self::Broker(source) => source.stop().await,
            Self::Synthetic(source) => source.stop().await,
        }
    }

    /// Whether production tasks are currently running.
    pub fn is_running(&self) -> bool {
        match self {
            Self::Broker(source) => source.is_running(),
            Self::Synthetic(source) => source.is_running(),
        }
    }
}
