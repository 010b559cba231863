use futures_util::future::BoxFuture;
use logpulse_ingest::{
    BrokerConnector, BrokerError, BrokerSettings, BrokerSource, IngestionSource, SyntheticSource,
    TopicConsumer, Topics,
};
use logpulse_types::{EventKind, IngestEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type Feed = Result<Vec<u8>, BrokerError>;

/// In-process broker: each topic is an unbounded queue of payloads or errors.
struct ScriptedBroker {
    feeds: HashMap<String, Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Feed>>>>,
    failing_connects: Mutex<HashMap<String, usize>>,
    connects: Mutex<HashMap<String, usize>>,
}

impl ScriptedBroker {
    fn new(topics: &Topics) -> (Arc<Self>, HashMap<String, mpsc::UnboundedSender<Feed>>) {
        let mut feeds = HashMap::new();
        let mut senders = HashMap::new();
        for kind in EventKind::ALL {
            let topic = topics.for_kind(kind).to_string();
            let (tx, rx) = mpsc::unbounded_channel();
            feeds.insert(topic.clone(), Arc::new(tokio::sync::Mutex::new(rx)));
            senders.insert(topic, tx);
        }
        let broker = Arc::new(Self {
            feeds,
            failing_connects: Mutex::new(HashMap::new()),
            connects: Mutex::new(HashMap::new()),
        });
        (broker, senders)
    }

    fn fail_next_connects(&self, topic: &str, times: usize) {
        self.failing_connects
            .lock()
            .unwrap()
            .insert(topic.to_string(), times);
    }

    fn connects(&self, topic: &str) -> usize {
        self.connects.lock().unwrap().get(topic).copied().unwrap_or(0)
    }
}

impl BrokerConnector for ScriptedBroker {
    fn connect(&self, topic: &str, _group_id: &str) -> Result<Box<dyn TopicConsumer>, BrokerError> {
        *self.connects.lock().unwrap().entry(topic.to_string()).or_default() += 1;

        let mut failing = self.failing_connects.lock().unwrap();
        if let Some(remaining) = failing.get_mut(topic) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrokerError::Connect("broker unavailable".to_string()));
            }
        }

        Ok(Box::new(ScriptedConsumer {
            feed: self.feeds[topic].clone(),
        }))
    }
}

struct ScriptedConsumer {
    feed: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Feed>>>,
}

impl TopicConsumer for ScriptedConsumer {
    fn poll(&mut self, timeout: Duration) -> BoxFuture<'_, Result<Vec<Vec<u8>>, BrokerError>> {
        Box::pin(async move {
            let mut feed = self.feed.lock().await;
            match tokio::time::timeout(timeout, feed.recv()).await {
                Ok(Some(Ok(payload))) => Ok(vec![payload]),
                Ok(Some(Err(e))) => Err(e),
                Ok(None) => {
                    tokio::time::sleep(timeout).await;
                    Ok(Vec::new())
                }
                Err(_) => Ok(Vec::new()),
            }
        })
    }
}

fn log_payload(message: &str) -> Feed {
    Ok(format!(r#"{{"message":"{message}","level":"INFO"}}"#).into_bytes())
}

fn collect_log_messages(source: &IngestionSource) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    source.register_consumer(EventKind::Log, move |event| {
        let sink = sink.clone();
        async move {
            if let IngestEvent::Log(entry) = event {
                sink.lock().unwrap().push(entry.message);
            }
        }
    });
    seen
}

fn broker_source(broker: Arc<ScriptedBroker>) -> IngestionSource {
    IngestionSource::Broker(BrokerSource::new(broker, BrokerSettings::default()))
}

#[tokio::test(start_paused = true)]
async fn broker_outage_recovers_within_one_backoff() {
    let topics = Topics::default();
    let (broker, senders) = ScriptedBroker::new(&topics);
    broker.fail_next_connects(&topics.logs, 1);

    for message in ["first", "second", "third"] {
        senders[&topics.logs].send(log_payload(message)).unwrap();
    }

    let mut source = broker_source(broker.clone());
    let seen = collect_log_messages(&source);
    source.start();

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(broker.connects(&topics.logs), 2);

    source.stop().await;
}

#[tokio::test(start_paused = true)]
async fn poll_failure_reconnects_after_backoff() {
    let topics = Topics::default();
    let (broker, senders) = ScriptedBroker::new(&topics);

    senders[&topics.logs]
        .send(Err(BrokerError::Poll("partition leader lost".to_string())))
        .unwrap();
    senders[&topics.logs].send(log_payload("after")).unwrap();

    let mut source = broker_source(broker.clone());
    let seen = collect_log_messages(&source);
    source.start();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(broker.connects(&topics.logs), 1);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["after"]);
    assert_eq!(broker.connects(&topics.logs), 2);

    source.stop().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_messages_are_skipped() {
    let topics = Topics::default();
    let (broker, senders) = ScriptedBroker::new(&topics);

    senders[&topics.logs].send(Ok(b"{not json".to_vec())).unwrap();
    senders[&topics.logs].send(log_payload("valid")).unwrap();

    let mut source = broker_source(broker);
    let seen = collect_log_messages(&source);
    source.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["valid"]);

    source.stop().await;
}

#[tokio::test(start_paused = true)]
async fn classification_messages_fan_out_params() {
    let topics = Topics::default();
    let (broker, senders) = ScriptedBroker::new(&topics);

    senders[&topics.classifications]
        .send(Ok(br#"{"normal":10,"anomaly":1,"anomaly_params":[{"value":"Corrupted block: blk_1234567890"}]}"#.to_vec()))
        .unwrap();

    let mut source = broker_source(broker);
    let kinds = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Classification, EventKind::AnomalyParam] {
        let sink = kinds.clone();
        source.register_consumer(kind, move |event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event.kind());
            }
        });
    }
    source.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        *kinds.lock().unwrap(),
        vec![EventKind::Classification, EventKind::AnomalyParam]
    );

    source.stop().await;
}

#[tokio::test(start_paused = true)]
async fn no_callbacks_after_stop() {
    let topics = Topics::default();
    let (broker, senders) = ScriptedBroker::new(&topics);

    let mut source = broker_source(broker);
    let seen = collect_log_messages(&source);
    source.start();
    assert!(source.is_running());

    source.stop().await;
    assert!(!source.is_running());

    senders[&topics.logs].send(log_payload("late")).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn starting_twice_spawns_one_consumer_per_topic() {
    let topics = Topics::default();
    let (broker, _senders) = ScriptedBroker::new(&topics);

    let mut source = broker_source(broker.clone());
    source.start();
    source.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    for kind in EventKind::ALL {
        assert_eq!(broker.connects(topics.for_kind(kind)), 1, "{kind}");
    }

    source.stop().await;
    source.stop().await;
}

#[tokio::test(start_paused = true)]
async fn synthetic_source_emits_once_per_interval() {
    let mut source =
        IngestionSource::Synthetic(SyntheticSource::new(Duration::from_secs(5), Some(1)));
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    source.register_consumer(EventKind::Classification, move |event| {
        let counter = counter.clone();
        async move {
            if let IngestEvent::Classification(c) = event {
                assert!((50..=200).contains(&c.total()));
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    source.start();
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 3);

    source.stop().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 3);

    source.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 4);
    source.stop().await;
}
