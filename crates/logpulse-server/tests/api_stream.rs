mod common;

use logpulse_server::app;
use logpulse_types::{ClassificationType, IngestEvent, NewAnomalyParam};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpListener;

/// Accumulates response chunks until `frames` complete frames are buffered.
async fn read_frames(response: &mut reqwest::Response, buffer: &mut String, frames: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while buffer.matches("\n\n").count() < frames {
            let chunk = response
                .chunk()
                .await
                .expect("failed to read chunk")
                .expect("stream closed early");
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {frames} frames; got {buffer:?}"));
}

async fn serve(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn anomaly_stream_sends_handshake_then_records() {
    let server = common::setup(Duration::from_secs(30));
    let url = serve(app(server.state.clone())).await;

    let client = reqwest::Client::new();
    let mut response = client
        .get(format!("{url}/api/anomalies/stream"))
        .send()
        .await
        .expect("failed to connect to SSE stream");
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let mut buffer = String::new();
    read_frames(&mut response, &mut buffer, 1).await;
    assert!(buffer.starts_with("event: ping\nid: 0\ndata: {\"status\":\"connected\"}\n\n"));
    buffer.clear();

    let body = client
        .get(format!("{url}/api/streams"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let anomalies = json["channels"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["channel"] == "anomaly_param")
        .unwrap();
    assert_eq!(anomalies["subscribers"], 1);

    server
        .router
        .handle(IngestEvent::AnomalyParam(NewAnomalyParam {
            param_value: "Corrupted block: blk_1234567890".to_string(),
            classification_type: ClassificationType::Anomaly,
        }))
        .await;

    read_frames(&mut response, &mut buffer, 1).await;
    let mut lines = buffer.lines();
    assert_eq!(lines.next(), Some("event: anomaly"));
    let id_line = lines.next().unwrap();
    assert!(id_line.starts_with("id: "));
    let data: Value = serde_json::from_str(lines.next().unwrap().strip_prefix("data: ").unwrap())
        .unwrap();
    assert_eq!(id_line, format!("id: {}", data["id"]));
    assert_eq!(data["param_value"], "Corrupted block: blk_1234567890");
    assert_eq!(data["classification_type"], "anomaly");
    assert!(data["timestamp"].is_string());
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let server = common::setup(Duration::from_secs(30));
    let url = serve(app(server.state.clone())).await;

    let mut response = reqwest::Client::new()
        .get(format!("{url}/api/logs/stream"))
        .send()
        .await
        .unwrap();
    let mut buffer = String::new();
    read_frames(&mut response, &mut buffer, 1).await;
    assert_eq!(server.state.hubs.logs.subscriber_count(), 1);

    server.state.begin_shutdown();

    let end = tokio::time::timeout(Duration::from_secs(5), response.chunk())
        .await
        .expect("stream should end promptly")
        .expect("clean end of body");
    assert!(end.is_none());
    assert_eq!(server.state.hubs.logs.subscriber_count(), 0);
}

#[tokio::test]
async fn quiet_stream_sends_keepalive() {
    let server = common::setup(Duration::from_secs(1));
    let url = serve(app(server.state.clone())).await;

    let mut response = reqwest::Client::new()
        .get(format!("{url}/api/statistics/stream"))
        .send()
        .await
        .unwrap();
    let mut buffer = String::new();
    read_frames(&mut response, &mut buffer, 2).await;

    let keepalive = buffer
        .split("\n\n")
        .find(|frame| frame.contains("id: keepalive"))
        .unwrap();
    assert!(keepalive.starts_with("event: ping\n"));
    assert!(keepalive.contains("\"timestamp\":"));
}
