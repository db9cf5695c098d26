//! End-to-end tests for the `/ws/stream` broadcast protocol.

#![allow(clippy::panic, clippy::indexing_slicing)]

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{fast_generator, spawn_server, wait_for_connections, wait_until_idle};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr) -> Client {
    let Ok((ws, _response)) = connect_async(format!("ws://{addr}/ws/stream")).await else {
        panic!("websocket handshake failed");
    };
    ws
}

async fn send_action(ws: &mut Client, action: &str) {
    let text = json!({ "action": action }).to_string();
    if ws.send(Message::text(text)).await.is_err() {
        panic!("send failed");
    }
}

/// Next text message as JSON, or `None` if nothing arrives within `wait`.
async fn try_recv_json(ws: &mut Client, wait: Duration) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(wait, ws.next()).await.ok()??;
        let Ok(msg) = msg else {
            return None;
        };
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
}

async fn recv_json(ws: &mut Client) -> Value {
    let Some(value) = try_recv_json(ws, Duration::from_secs(2)).await else {
        panic!("expected a message");
    };
    value
}

/// Skips `data` frames until a message of another type arrives.
async fn recv_control(ws: &mut Client) -> Value {
    loop {
        let value = recv_json(ws).await;
        if value["type"] != "data" {
            return value;
        }
    }
}

async fn recv_data(ws: &mut Client) -> Value {
    loop {
        let value = recv_json(ws).await;
        if value["type"] == "data" {
            return value;
        }
    }
}

#[tokio::test]
async fn ping_gets_pong() {
    let (addr, _state) = spawn_server(fast_generator()).await;
    let mut ws = connect(addr).await;

    send_action(&mut ws, "ping").await;
    assert_eq!(recv_json(&mut ws).await, json!({"type": "pong"}));
}

#[tokio::test]
async fn unknown_action_gets_no_reply() {
    let (addr, _state) = spawn_server(fast_generator()).await;
    let mut ws = connect(addr).await;

    send_action(&mut ws, "dance").await;
    assert!(try_recv_json(&mut ws, Duration::from_millis(200)).await.is_none());

    send_action(&mut ws, "ping").await;
    assert_eq!(recv_json(&mut ws).await, json!({"type": "pong"}));
}

#[tokio::test]
async fn start_stream_stop_scenario() {
    let (addr, state) = spawn_server(fast_generator()).await;
    let mut ws = connect(addr).await;

    send_action(&mut ws, "ping").await;
    assert_eq!(recv_json(&mut ws).await, json!({"type": "pong"}));

    send_action(&mut ws, "start").await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"type": "status", "streaming": true})
    );
    assert!(state.stream.is_active());

    let mut last_timestamp = f64::NEG_INFINITY;
    for _ in 0..3 {
        let data = recv_data(&mut ws).await;
        assert_eq!(data["shape"], json!([100]));
        assert_eq!(data["dtype"], "float64");
        assert_eq!(data["x"].as_array().map(Vec::len), Some(100));
        assert_eq!(data["y"].as_array().map(Vec::len), Some(100));
        let Some(timestamp) = data["timestamp"].as_f64() else {
            panic!("timestamp is a number");
        };
        assert!(timestamp > last_timestamp);
        last_timestamp = timestamp;
    }

    send_action(&mut ws, "stop").await;
    assert_eq!(
        recv_control(&mut ws).await,
        json!({"type": "status", "streaming": false})
    );
    assert!(!state.stream.is_active());
    assert!(try_recv_json(&mut ws, Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn both_clients_receive_the_same_frame() {
    let (addr, state) = spawn_server(fast_generator()).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    assert!(wait_for_connections(&state, 2).await);

    send_action(&mut a, "start").await;
    let first_a = recv_data(&mut a).await;
    let first_b = recv_data(&mut b).await;
    let second_a = recv_data(&mut a).await;
    let second_b = recv_data(&mut b).await;

    assert_eq!(first_a["timestamp"], first_b["timestamp"]);
    assert_eq!(second_a["timestamp"], second_b["timestamp"]);
}

#[tokio::test]
async fn dropped_client_does_not_stop_others() {
    let (addr, state) = spawn_server(fast_generator()).await;
    let a = connect(addr).await;
    let mut b = connect(addr).await;
    assert!(wait_for_connections(&state, 2).await);

    send_action(&mut b, "start").await;
    recv_data(&mut b).await;

    drop(a);
    assert!(wait_for_connections(&state, 1).await);

    assert!(state.stream.is_active());
    recv_data(&mut b).await;
    recv_data(&mut b).await;
}

#[tokio::test]
async fn last_disconnect_stops_streaming() {
    let (addr, state) = spawn_server(fast_generator()).await;
    let mut ws = connect(addr).await;

    send_action(&mut ws, "start").await;
    assert_eq!(recv_json(&mut ws).await["streaming"], true);
    assert!(state.stream.is_active());

    let _ = ws.close(None).await;
    drop(ws);

    assert!(wait_until_idle(&state).await);
    assert!(state.registry.is_empty().await);
}

#[tokio::test]
async fn http_control_drives_websocket_stream() {
    let (addr, state) = spawn_server(fast_generator()).await;
    let mut ws = connect(addr).await;
    assert!(wait_for_connections(&state, 1).await);

    let client = reqwest::Client::new();
    let Ok(response) = client
        .post(format!("http://{addr}/control/start"))
        .send()
        .await
    else {
        panic!("start request failed");
    };
    assert!(response.status().is_success());

    let data = recv_data(&mut ws).await;
    assert_eq!(data["dtype"], "float64");

    let Ok(response) = client.post(format!("http://{addr}/control/stop")).send().await else {
        panic!("stop request failed");
    };
    assert!(response.status().is_success());
    assert!(!state.stream.is_active());
}
