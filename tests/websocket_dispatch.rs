//! Event dispatch over real WebSocket connections.

use std::time::Duration;

use event_gateway::{async_handler, handler_fn, Layer};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

mod common;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(port: u16) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/socket"))
        .await
        .expect("handshake failed");
    socket
}

async fn send(socket: &mut Socket, text: String) {
    socket.send(Message::Text(text.into())).await.unwrap();
}

async fn next_text(socket: &mut Socket) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("no frame within 2s")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return text.as_str().to_string();
        }
    }
}

async fn request(socket: &mut Socket, ack: u64, event: &str, args: Value) -> Value {
    send(socket, json!({ "event": event, "args": args, "ack": ack }).to_string()).await;
    let reply: Value = serde_json::from_str(&next_text(socket).await).unwrap();
    assert_eq!(reply["ack"], ack);
    reply["data"].clone()
}

#[tokio::test]
async fn builtin_events_round_trip() {
    let (gateway, port) = common::start_gateway(Layer::new()).await;
    let mut socket = connect(port).await;

    assert_eq!(request(&mut socket, 1, "ping", json!([])).await, json!("pong"));
    assert_eq!(
        request(&mut socket, 2, "state.set", json!(["color", "blue"])).await,
        json!(true)
    );
    assert_eq!(
        request(&mut socket, 3, "state.get", json!(["color"])).await,
        json!("blue")
    );

    gateway.shutdown().await;
}

#[tokio::test]
async fn unknown_event_replies_with_error_and_socket_survives() {
    let (gateway, port) = common::start_gateway(Layer::new()).await;
    let mut socket = connect(port).await;

    let data = request(&mut socket, 1, "nope", json!([])).await;
    assert_eq!(data, json!({ "error": "unknown event \"nope\"" }));

    // undecodable frames are skipped as well
    send(&mut socket, "not a frame".to_string()).await;
    assert_eq!(request(&mut socket, 2, "ping", json!([])).await, json!("pong"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn application_layer_overrides_builtin() {
    let layer = Layer::new().on("ping", handler_fn(|_, _, _| Ok(json!("custom pong"))));
    let (gateway, port) = common::start_gateway(layer).await;
    let mut socket = connect(port).await;

    assert_eq!(request(&mut socket, 1, "ping", json!([])).await, json!("custom pong"));
    // names not overridden still resolve to the base layer
    assert_eq!(request(&mut socket, 2, "echo", json!([1])).await, json!([1]));

    gateway.shutdown().await;
}

#[tokio::test]
async fn connections_do_not_share_state() {
    let (gateway, port) = common::start_gateway(Layer::new()).await;
    let mut alice = connect(port).await;
    let mut bob = connect(port).await;

    request(&mut alice, 1, "state.set", json!(["name", "alice"])).await;
    request(&mut bob, 1, "state.set", json!(["name", "bob"])).await;

    assert_eq!(request(&mut alice, 2, "state.get", json!(["name"])).await, json!("alice"));
    assert_eq!(request(&mut bob, 2, "state.get", json!(["name"])).await, json!("bob"));

    // a fresh connection starts empty
    let mut carol = connect(port).await;
    assert_eq!(request(&mut carol, 1, "state.get", json!(["name"])).await, json!(""));

    gateway.shutdown().await;
}

#[tokio::test]
async fn legacy_packets_are_accepted() {
    let (gateway, port) = common::start_gateway(Layer::new()).await;
    let mut socket = connect(port).await;

    send(&mut socket, r#"427["echo","a",2]"#.to_string()).await;
    assert_eq!(next_text(&mut socket).await, r#"437[["a",2]]"#);

    gateway.shutdown().await;
}

#[tokio::test]
async fn handlers_can_push_events() {
    let layer = Layer::new().on(
        "subscribe",
        async_handler(|conn, _, args| {
            Box::pin(async move {
                let topic = args.first().cloned().unwrap_or(Value::Null);
                conn.emit("subscribed", vec![topic]);
                Ok(Value::Bool(true))
            })
        }),
    );
    let (gateway, port) = common::start_gateway(layer).await;
    let mut socket = connect(port).await;

    send(
        &mut socket,
        json!({ "event": "subscribe", "args": ["news"], "ack": 9 }).to_string(),
    )
    .await;

    let push: Value = serde_json::from_str(&next_text(&mut socket).await).unwrap();
    assert_eq!(push, json!({ "event": "subscribed", "args": ["news"] }));
    let reply: Value = serde_json::from_str(&next_text(&mut socket).await).unwrap();
    assert_eq!(reply, json!({ "ack": 9, "data": true }));

    gateway.shutdown().await;
}

#[tokio::test]
async fn closing_a_socket_releases_the_connection() {
    let (gateway, port) = common::start_gateway(Layer::new()).await;
    let mut socket = connect(port).await;
    request(&mut socket, 1, "ping", json!([])).await;
    assert_eq!(gateway.dispatcher().active_connections(), 1);

    socket.close(None).await.unwrap();
    let mut released = false;
    for _ in 0..50 {
        if gateway.dispatcher().active_connections() == 0 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released, "connection still active after close");

    gateway.shutdown().await;
}
