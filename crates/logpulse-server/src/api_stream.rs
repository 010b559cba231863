//! SSE stream handlers, one per channel.

use crate::hub::BroadcastHub;
use crate::stream::{ChannelRecord, StreamSession};
use crate::AppState;
use axum::{
    extract::Extension,
    response::{sse::Event, Sse},
    Json,
};
use futures_util::{Stream, StreamExt};
use logpulse_types::EventKind;
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};

fn session_stream<T: ChannelRecord>(
    state: &AppState,
    hub: BroadcastHub<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = StreamSession::open(hub, state.keepalive, state.shutdown_signal());
    Sse::new(session.into_stream().map(|frame| Ok(Event::from(frame))))
}

/// Handler for `GET /api/logs/stream`.
pub async fn logs_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    session_stream(&state, state.hubs.logs.clone())
}

/// Handler for `GET /api/statistics/stream`.
pub async fn statistics_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    session_stream(&state, state.hubs.classifications.clone())
}

/// Handler for `GET /api/anomalies/stream`.
pub async fn anomalies_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    session_stream(&state, state.hubs.anomalies.clone())
}

#[derive(Debug, Serialize)]
pub struct ChannelStatus {
    pub channel: EventKind,
    pub event: &'static str,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct StreamsResponse {
    pub channels: Vec<ChannelStatus>,
}

/// Handler for `GET /api/streams`: live subscriber count per channel.
pub async fn streams_handler(Extension(state): Extension<Arc<AppState>>) -> Json<StreamsResponse> {
    let channels = EventKind::ALL
        .into_iter()
        .map(|kind| ChannelStatus {
            channel: kind,
            event: kind.event_name(),
            subscribers: state.hubs.subscriber_count(kind),
        })
        .collect();
    Json(StreamsResponse { channels })
}
