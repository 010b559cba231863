//! Kafka implementation of [`BrokerConnector`].

use futures_util::future::BoxFuture;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::time::Duration;

use crate::broker::{collect_batch, BrokerConnector, BrokerError, TopicConsumer};

/// Upper bound on messages returned by one poll.
const MAX_BATCH: usize = 10;

/// Connects auto-committing Kafka consumers that start from the latest offset.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    bootstrap_servers: String,
}

impl KafkaConnector {
    /// `bootstrap_servers` is a comma-separated `host:port` list.
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
        }
    }
}

impl BrokerConnector for KafkaConnector {
    fn connect(&self, topic: &str, group_id: &str) -> Result<Box<dyn TopicConsumer>, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Connect(format!("subscribe to {topic}: {e}")))?;

        Ok(Box::new(KafkaTopicConsumer { consumer }))
    }
}

struct KafkaTopicConsumer {
    consumer: StreamConsumer,
}

impl TopicConsumer for KafkaTopicConsumer {
    fn poll(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Vec<Vec<u8>>, BrokerError>> {
        let consumer = &self.consumer;
        Box::pin(collect_batch(timeout, MAX_BATCH, move || async move {
            consumer
                .recv()
                .await
                .map(|message| message.payload().map(<[u8]>::to_vec))
                .map_err(|e| BrokerError::Poll(e.to_string()))
        }))
    }
}
