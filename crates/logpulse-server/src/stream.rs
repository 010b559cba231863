//! Server-sent event sessions.
//!
//! A [`StreamSession`] is one connected client on one channel. It moves
//! through three states:
//!
//! ```text
//! CONNECTING ──handshake──▶ STREAMING ──disconnect / shutdown / queue closed──▶ TERMINATED
//! ```
//!
//! While streaming it waits on its delivery queue, a keepalive timer and the
//! server shutdown signal, whichever fires first. Entering `TERMINATED`
//! always unregisters the subscriber; dropping the session (which is how a
//! client disconnect reaches us) takes that same path.

use axum::response::sse::Event;
use futures_util::Stream;
use logpulse_types::{AnomalyParamRecord, ClassificationRecord, EventKind, LogRecord};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::watch;

use crate::hub::{BroadcastHub, Subscriber, SubscriberId};

/// A persisted record that can be streamed on its channel.
pub trait ChannelRecord: Clone + Send + 'static {
    const KIND: EventKind;

    fn record_id(&self) -> i64;

    /// The JSON object sent as the frame's `data:` line.
    fn payload(&self) -> Value;
}

impl ChannelRecord for LogRecord {
    const KIND: EventKind = EventKind::Log;

    fn record_id(&self) -> i64 {
        self.id
    }

    fn payload(&self) -> Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp,
            "message": self.message,
            "log_level": self.log_level,
        })
    }
}

impl ChannelRecord for ClassificationRecord {
    const KIND: EventKind = EventKind::Classification;

    fn record_id(&self) -> i64 {
        self.id
    }

    fn payload(&self) -> Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp,
            "normal_count": self.normal_count,
            "anomaly_count": self.anomaly_count,
            "unidentified_count": self.unidentified_count,
        })
    }
}

impl ChannelRecord for AnomalyParamRecord {
    const KIND: EventKind = EventKind::AnomalyParam;

    fn record_id(&self) -> i64 {
        self.id
    }

    fn payload(&self) -> Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp,
            "param_value": self.param_value,
            "classification_type": self.classification_type,
        })
    }
}

const PING: &str = "ping";
const HANDSHAKE_ID: &str = "0";
const KEEPALIVE_ID: &str = "keepalive";

/// One wire frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: &'static str,
    pub id: String,
    pub data: Value,
}

impl Frame {
    pub fn handshake() -> Self {
        Self {
            event: PING,
            id: HANDSHAKE_ID.to_string(),
            data: json!({ "status": "connected" }),
        }
    }

    pub fn keepalive() -> Self {
        Self {
            event: PING,
            id: KEEPALIVE_ID.to_string(),
            data: json!({ "timestamp": chrono::Utc::now().to_rfc3339() }),
        }
    }

    pub fn record<T: ChannelRecord>(record: &T) -> Self {
        Self {
            event: T::KIND.event_name(),
            id: record.record_id().to_string(),
            data: record.payload(),
        }
    }

    pub fn is_keepalive(&self) -> bool {
        self.event == PING && self.id == KEEPALIVE_ID
    }

    /// Text event-stream encoding, terminated by a blank line.
    pub fn encode(&self) -> String {
        format!("event: {}\nid: {}\ndata: {}\n\n", self.event, self.id, self.data)
    }
}

impl From<Frame> for Event {
    fn from(frame: Frame) -> Self {
        Event::default()
            .event(frame.event)
            .id(frame.id)
            .data(frame.data.to_string())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The client went away; the session was dropped mid-stream.
    Disconnected,
    /// The server is shutting down.
    Shutdown,
    /// The hub dropped this subscriber.
    QueueClosed,
}

impl TerminationReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Shutdown => "shutdown",
            Self::QueueClosed => "queue_closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Terminated(TerminationReason),
}

/// One client's stream on one channel.
pub struct StreamSession<T: ChannelRecord> {
    hub: BroadcastHub<T>,
    subscriber: Option<Subscriber<T>>,
    id: SubscriberId,
    state: SessionState,
    keepalive: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<T: ChannelRecord> StreamSession<T> {
    /// Registers a new subscriber on `hub`. The first frame produced is the
    /// handshake.
    pub fn open(hub: BroadcastHub<T>, keepalive: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let subscriber = hub.register();
        Self {
            id: subscriber.id(),
            subscriber: Some(subscriber),
            hub,
            state: SessionState::Connecting,
            keepalive,
            shutdown,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Produces the next frame, or `None` once the session has terminated.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        match self.state {
            SessionState::Terminated(_) => None,
            SessionState::Connecting => {
                self.state = SessionState::Streaming;
                Some(Frame::handshake())
            }
            SessionState::Streaming => {
                if *self.shutdown.borrow() {
                    self.terminate(TerminationReason::Shutdown);
                    return None;
                }
                let subscriber = self.subscriber.as_mut()?;
                let shutdown = &mut self.shutdown;

                let next = tokio::select! {
                    biased;
                    () = shutdown_requested(shutdown) => Err(TerminationReason::Shutdown),
                    received = subscriber.recv() => match received {
                        Some(record) => Ok(Frame::record(&record)),
                        None => Err(TerminationReason::QueueClosed),
                    },
                    () = tokio::time::sleep(self.keepalive) => Ok(Frame::keepalive()),
                };

                match next {
                    Ok(frame) => Some(frame),
                    Err(reason) => {
                        self.terminate(reason);
                        None
                    }
                }
            }
        }
    }

    fn terminate(&mut self, reason: TerminationReason) {
        if matches!(self.state, SessionState::Terminated(_)) {
            return;
        }
        self.state = SessionState::Terminated(reason);
        self.hub.unregister(self.id);
        self.subscriber = None;
        tracing::info!(
            channel = %T::KIND,
            subscriber_id = %self.id,
            reason = reason.as_str(),
            "stream session ended"
        );
    }

    /// Turns the session into a frame stream. Dropping the stream terminates
    /// the session.
    pub fn into_stream(self) -> impl Stream<Item = Frame> + Send {
        futures_util::stream::unfold(self, |mut session| async move {
            let frame = session.next_frame().await?;
            Some((frame, session))
        })
    }
}

/// Resolves once the flag is set or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

impl<T: ChannelRecord> Drop for StreamSession<T> {
    fn drop(&mut self) {
        self.terminate(TerminationReason::Disconnected);
    }
}
