//! Per-channel live fan-out of persisted records.

use chrono::{DateTime, Utc};
use logpulse_types::{AnomalyParamRecord, ClassificationRecord, EventKind, LogRecord, StoredRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Opaque identity of a registered subscriber.
pub type SubscriberId = Uuid;

struct SubscriberEntry<T> {
    sender: mpsc::Sender<T>,
    connected_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

/// A subscriber's end of the hub: its identity and private delivery queue.
///
/// Dropping a `Subscriber` closes its queue; the hub removes the entry on its
/// next publish pass if it was not unregistered first.
pub struct Subscriber<T> {
    id: SubscriberId,
    connected_at: DateTime<Utc>,
    receiver: mpsc::Receiver<T>,
}

impl<T> Subscriber<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Waits for the next record. `None` once the hub has dropped this
    /// subscriber and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Takes the next queued record without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

/// Result of offering one record to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The record was queued.
    Delivered,
    /// The queue was at capacity; this record was dropped for this
    /// subscriber only.
    Full,
    /// The queue's receiver is gone; the subscriber was removed.
    Closed,
}

/// Per-subscriber outcomes of a single [`BroadcastHub::publish`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub outcomes: Vec<(SubscriberId, Delivery)>,
}

impl PublishReport {
    fn count(&self, wanted: Delivery) -> usize {
        self.outcomes.iter().filter(|(_, d)| *d == wanted).count()
    }

    pub fn delivered(&self) -> usize {
        self.count(Delivery::Delivered)
    }

    pub fn dropped(&self) -> usize {
        self.count(Delivery::Full)
    }

    /// Subscribers removed because their queue was closed.
    pub fn removed(&self) -> Vec<SubscriberId> {
        self.outcomes
            .iter()
            .filter(|(_, d)| *d == Delivery::Closed)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn outcome(&self, id: SubscriberId) -> Option<Delivery> {
        self.outcomes
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, d)| *d)
    }
}

/// Snapshot of one live subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// The live subscriber registry of one channel.
///
/// Cloning is cheap and every clone shares the same registry. Uses
/// `std::sync::RwLock`: each acquisition is a short map operation or a pass
/// of non-blocking `try_send` calls, never held across an `.await`.
pub struct BroadcastHub<T> {
    channel: EventKind,
    capacity: usize,
    subscribers: Arc<RwLock<HashMap<SubscriberId, SubscriberEntry<T>>>>,
}

impl<T> Clone for BroadcastHub<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel,
            capacity: self.capacity,
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BroadcastHub<T> {
    /// Creates an empty hub whose subscribers each queue at most `capacity`
    /// undelivered records.
    pub fn new(channel: EventKind, capacity: usize) -> Self {
        Self {
            channel,
            capacity: capacity.max(1),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn channel(&self) -> EventKind {
        self.channel
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriberId, SubscriberEntry<T>>> {
        match self.subscribers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriberId, SubscriberEntry<T>>> {
        match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adds a new subscriber with an empty queue.
    pub fn register(&self) -> Subscriber<T> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        let now = Utc::now();

        let active = {
            let mut subscribers = self.write();
            subscribers.insert(
                id,
                SubscriberEntry {
                    sender,
                    connected_at: now,
                    last_activity: now,
                },
            );
            subscribers.len()
        };

        tracing::info!(channel = %self.channel, subscriber_id = %id, active, "subscriber registered");

        Subscriber {
            id,
            connected_at: now,
            receiver,
        }
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, active) = {
            let mut subscribers = self.write();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            tracing::info!(channel = %self.channel, subscriber_id = %id, active, "subscriber unregistered");
        }
        removed
    }

    /// Offers `record` to every registered subscriber without waiting.
    ///
    /// The whole pass runs under one registry lock, so a concurrent
    /// `register` lands either entirely before or entirely after it.
    /// Subscribers whose queue is closed are removed once the pass ends.
    pub fn publish(&self, record: &T) -> PublishReport {
        let mut report = PublishReport::default();
        let mut subscribers = self.write();
        let now = Utc::now();

        for (id, entry) in subscribers.iter_mut() {
            let delivery = match entry.sender.try_send(record.clone()) {
                Ok(()) => {
                    entry.last_activity = now;
                    Delivery::Delivered
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        subscriber_id = %id,
                        capacity = self.capacity,
                        "dropping broadcast record for slow subscriber"
                    );
                    Delivery::Full
                }
                Err(TrySendError::Closed(_)) => Delivery::Closed,
            };
            report.outcomes.push((*id, delivery));
        }

        for id in report.removed() {
            subscribers.remove(&id);
            tracing::info!(
                channel = %self.channel,
                subscriber_id = %id,
                "removed subscriber with closed queue"
            );
        }

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.read().contains_key(&id)
    }

    /// Live subscribers, oldest connection first.
    pub fn subscribers(&self) -> Vec<SubscriberInfo> {
        let mut infos: Vec<SubscriberInfo> = self
            .read()
            .iter()
            .map(|(id, entry)| SubscriberInfo {
                id: *id,
                connected_at: entry.connected_at,
                last_activity: entry.last_activity,
            })
            .collect();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }
}

/// One hub per channel, created at startup and shared by the router and
/// every stream handler.
#[derive(Clone)]
pub struct ChannelHubs {
    pub logs: BroadcastHub<LogRecord>,
    pub classifications: BroadcastHub<ClassificationRecord>,
    pub anomalies: BroadcastHub<AnomalyParamRecord>,
}

impl ChannelHubs {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            logs: BroadcastHub::new(EventKind::Log, queue_capacity),
            classifications: BroadcastHub::new(EventKind::Classification, queue_capacity),
            anomalies: BroadcastHub::new(EventKind::AnomalyParam, queue_capacity),
        }
    }

    /// Publishes a persisted record on the hub of its channel.
    pub fn publish(&self, record: &StoredRecord) -> PublishReport {
        match record {
            StoredRecord::Log(r) => self.logs.publish(r),
            StoredRecord::Classification(r) => self.classifications.publish(r),
            StoredRecord::AnomalyParam(r) => self.anomalies.publish(r),
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Log => self.logs.subscriber_count(),
            EventKind::Classification => self.classifications.subscriber_count(),
            EventKind::AnomalyParam => self.anomalies.subscriber_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpulse_types::ClassificationType;

    fn anomaly(id: i64) -> AnomalyParamRecord {
        AnomalyParamRecord {
            id,
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
            param_value: "Corrupted block: blk_123".to_string(),
            classification_type: ClassificationType::Anomaly,
        }
    }

    fn log(id: i64) -> LogRecord {
        LogRecord {
            id,
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
            message: format!("line {id}"),
            log_level: "INFO".to_string(),
            hdfs_date: None,
            hdfs_time: None,
            thread_id: None,
            hdfs_component: None,
            block_id: None,
        }
    }

    #[test]
    fn every_subscriber_receives_one_copy() {
        let hub = BroadcastHub::new(EventKind::AnomalyParam, 8);
        let mut subs: Vec<_> = (0..3).map(|_| hub.register()).collect();

        let report = hub.publish(&anomaly(42));

        assert_eq!(report.delivered(), 3);
        for sub in &mut subs {
            assert_eq!(sub.try_recv(), Some(anomaly(42)));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[test]
    fn publish_with_no_subscribers_is_empty() {
        let hub: BroadcastHub<LogRecord> = BroadcastHub::new(EventKind::Log, 8);
        assert_eq!(hub.publish(&log(1)), PublishReport::default());
    }

    #[test]
    fn queues_preserve_publish_order() {
        let hub = BroadcastHub::new(EventKind::Log, 8);
        let mut first = hub.register();
        let mut second = hub.register();

        for id in 1..=5 {
            hub.publish(&log(id));
        }

        for sub in [&mut first, &mut second] {
            let ids: Vec<i64> = std::iter::from_fn(|| sub.try_recv()).map(|r| r.id).collect();
            assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn unregistered_subscriber_sees_nothing() {
        let hub = BroadcastHub::new(EventKind::Log, 8);
        let mut first = hub.register();
        let mut second = hub.register();

        assert!(hub.unregister(first.id()));
        assert!(!hub.unregister(first.id()));
        assert_eq!(hub.subscriber_count(), 1);

        let report = hub.publish(&log(7));

        assert_eq!(report.outcome(first.id()), None);
        assert_eq!(report.outcome(second.id()), Some(Delivery::Delivered));
        assert_eq!(first.try_recv(), None);
        assert_eq!(second.try_recv(), Some(log(7)));
    }

    #[test]
    fn closed_subscriber_is_removed_without_affecting_others() {
        let hub = BroadcastHub::new(EventKind::Log, 8);
        let gone = hub.register();
        let gone_id = gone.id();
        let mut kept = hub.register();
        drop(gone);

        let report = hub.publish(&log(1));

        assert_eq!(report.removed(), vec![gone_id]);
        assert_eq!(report.delivered(), 1);
        assert!(!hub.contains(gone_id));
        assert_eq!(kept.try_recv(), Some(log(1)));
    }

    #[test]
    fn full_queue_drops_new_records_but_keeps_subscriber() {
        let hub = BroadcastHub::new(EventKind::Log, 2);
        let mut slow = hub.register();

        hub.publish(&log(1));
        hub.publish(&log(2));
        let report = hub.publish(&log(3));

        assert_eq!(report.outcome(slow.id()), Some(Delivery::Full));
        assert!(hub.contains(slow.id()));
        let ids: Vec<i64> = std::iter::from_fn(|| slow.try_recv()).map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);

        hub.publish(&log(4));
        assert_eq!(slow.try_recv().map(|r| r.id), Some(4));
    }

    #[test]
    fn late_subscriber_gets_no_replay() {
        let hub = BroadcastHub::new(EventKind::Log, 8);
        hub.publish(&log(1));
        let mut late = hub.register();
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn channel_hubs_route_by_kind() {
        let hubs = ChannelHubs::new(8);
        let mut logs = hubs.logs.register();
        let mut anomalies = hubs.anomalies.register();

        let report = hubs.publish(&StoredRecord::AnomalyParam(anomaly(9)));

        assert_eq!(report.delivered(), 1);
        assert_eq!(anomalies.try_recv(), Some(anomaly(9)));
        assert_eq!(logs.try_recv(), None);
        assert_eq!(hubs.subscriber_count(EventKind::Log), 1);
    }
}
