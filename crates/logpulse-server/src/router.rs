//! Persist-then-publish routing of ingested events.

use logpulse_ingest::IngestionSource;
use logpulse_store::EventStore;
use logpulse_types::{EventKind, IngestEvent};
use std::sync::Arc;

use crate::hub::{ChannelHubs, PublishReport};

/// What happened to one routed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Stored, then offered to the channel's subscribers.
    Published(PublishReport),
    /// Not stored and therefore not broadcast.
    Dropped,
}

/// The only path from an ingestion source to the broadcast hubs.
///
/// Each event is saved first; only the stored record (with its identifier
/// and timestamp) is published. When the save fails the event is logged and
/// dropped, with no retry.
#[derive(Clone)]
pub struct EventRouter {
    store: Arc<dyn EventStore>,
    hubs: ChannelHubs,
}

impl EventRouter {
    pub fn new(store: Arc<dyn EventStore>, hubs: ChannelHubs) -> Self {
        Self { store, hubs }
    }

    pub fn hubs(&self) -> &ChannelHubs {
        &self.hubs
    }

    pub async fn handle(&self, event: IngestEvent) -> RouteOutcome {
        let kind = event.kind();
        let store = self.store.clone();

        let saved = match tokio::task::spawn_blocking(move || store.save(&event)).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!(channel = %kind, error = %e, "persistence task failed; event dropped");
                return RouteOutcome::Dropped;
            }
        };

        match saved {
            Ok(record) => {
                let report = self.hubs.publish(&record);
                tracing::debug!(
                    channel = %kind,
                    id = record.id(),
                    delivered = report.delivered(),
                    "published record"
                );
                RouteOutcome::Published(report)
            }
            Err(e) => {
                tracing::error!(channel = %kind, error = %e, "failed to persist event; dropped");
                RouteOutcome::Dropped
            }
        }
    }

    /// Registers this router as a consumer of every event kind `source`
    /// produces.
    pub fn attach(&self, source: &IngestionSource) {
        for kind in EventKind::ALL {
            let router = self.clone();
            source.register_consumer(kind, move |event| {
                let router = router.clone();
                async move {
                    router.handle(event).await;
                }
            });
        }
    }
}
