//! End-to-end subscription flow against an in-process mock cable server:
//! subscribe/confirm lifecycle, duplicate-identifier bookkeeping, server
//! rejection, welcome-driven reloads, and server-initiated disconnects.

use std::time::Duration;

use cable_link::protocol::disconnect_reasons;
use cable_link::{ChannelCallbacks, Consumer, Disconnected, EventHandlers};
use serde_json::json;
use tokio::sync::mpsc;

mod common;

use common::MockServer;

const ROOM: &str = r#"{"channel":"Room"}"#;

/// Build a consumer, open its socket, and drive it through `welcome` so
/// subscription commands in the test body are deterministically ordered
/// after the reload.
async fn connected_consumer(
    server: &mut MockServer,
) -> (Consumer, common::ServerConn, mpsc::UnboundedReceiver<()>) {
    let (welcome_tx, mut welcome_rx) = mpsc::unbounded_channel();
    let consumer = Consumer::builder()
        .url(server.url.clone())
        .event_handlers(EventHandlers::new().on_connect(move || {
            let _ = welcome_tx.send(());
        }))
        .build();
    assert!(consumer.connect().await);
    let mut conn = common::next_connection(server).await;
    conn.tx.send(common::welcome()).unwrap();
    common::recv_signal(&mut welcome_rx).await;
    assert!(consumer.is_connected());
    (consumer, conn, welcome_rx)
}

#[tokio::test]
async fn test_happy_path_confirmation_fires_connected_once() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, mut conn, _welcome_rx) = connected_consumer(&mut server).await;

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let subscription = consumer
        .subscriptions()
        .create(
            "Room",
            ChannelCallbacks::new().on_connected(move || {
                let _ = connected_tx.send(());
            }),
        )
        .await
        .unwrap();
    assert_eq!(subscription.identifier(), ROOM);

    let frame = common::recv_frame(&mut conn).await;
    assert_eq!(frame["command"], "subscribe");
    assert_eq!(frame["identifier"], ROOM);

    conn.tx.send(common::confirm(ROOM)).unwrap();
    common::recv_signal(&mut connected_rx).await;
    common::assert_no_signal(&mut connected_rx, Duration::from_millis(300)).await;

    // One create, one subscribe command on the wire.
    common::assert_no_frame(&mut conn, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_duplicate_identifiers_deduplicate_the_unsubscribe() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, mut conn, _welcome_rx) = connected_consumer(&mut server).await;

    let first = consumer
        .subscriptions()
        .create(json!({"channel": "C"}), ChannelCallbacks::new())
        .await
        .unwrap();
    let second = consumer
        .subscriptions()
        .create(json!({"channel": "C"}), ChannelCallbacks::new())
        .await
        .unwrap();
    assert_eq!(first.identifier(), second.identifier());

    // Both duplicates are advertised.
    for _ in 0..2 {
        let frame = common::recv_frame(&mut conn).await;
        assert_eq!(frame["command"], "subscribe");
        assert_eq!(frame["identifier"], r#"{"channel":"C"}"#);
    }

    // Removing one of two duplicates sends nothing.
    first.unsubscribe();
    common::assert_no_frame(&mut conn, Duration::from_millis(400)).await;

    // Removing the last one sends exactly one unsubscribe.
    second.unsubscribe();
    let frame = common::recv_frame(&mut conn).await;
    assert_eq!(frame["command"], "unsubscribe");
    assert_eq!(frame["identifier"], r#"{"channel":"C"}"#);
    common::assert_no_frame(&mut conn, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_rejection_removes_the_subscription_and_fires_rejected() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, mut conn, _welcome_rx) = connected_consumer(&mut server).await;

    let (rejected_tx, mut rejected_rx) = mpsc::unbounded_channel();
    let subscription = consumer
        .subscriptions()
        .create(
            json!({"channel": "C"}),
            ChannelCallbacks::new().on_rejected(move || {
                let _ = rejected_tx.send(());
            }),
        )
        .await
        .unwrap();

    let frame = common::recv_frame(&mut conn).await;
    assert_eq!(frame["command"], "subscribe");

    conn.tx.send(common::reject(r#"{"channel":"C"}"#)).unwrap();
    common::recv_signal(&mut rejected_rx).await;

    // The registry no longer tracks the subscription, so unsubscribing the
    // stale handle puts nothing on the wire.
    subscription.unsubscribe();
    common::assert_no_frame(&mut conn, Duration::from_millis(400)).await;
}

#[tokio::test]
async fn test_welcome_reloads_every_tracked_subscription() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, mut conn, mut welcome_rx) = connected_consumer(&mut server).await;

    consumer
        .subscriptions()
        .create("Room", ChannelCallbacks::new())
        .await
        .unwrap();
    let frame = common::recv_frame(&mut conn).await;
    assert_eq!(frame["command"], "subscribe");

    // A fresh welcome re-advertises the subscription without any client
    // action. This is the reconnect-recovery path.
    conn.tx.send(common::welcome()).unwrap();
    common::recv_signal(&mut welcome_rx).await;
    let frame = common::recv_frame(&mut conn).await;
    assert_eq!(frame["command"], "subscribe");
    assert_eq!(frame["identifier"], ROOM);
}

#[tokio::test]
async fn test_payloads_fan_out_to_every_duplicate_subscription() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, mut conn, _welcome_rx) = connected_consumer(&mut server).await;

    let (rx_tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (rx_tx_b, mut rx_b) = mpsc::unbounded_channel();
    for rx_tx in [rx_tx_a, rx_tx_b] {
        consumer
            .subscriptions()
            .create(
                "Room",
                ChannelCallbacks::new().on_received(move |message| {
                    let _ = rx_tx.send(message);
                }),
            )
            .await
            .unwrap();
        common::recv_frame(&mut conn).await;
    }

    conn.tx
        .send(common::broadcast(ROOM, json!({"body": "hello"})))
        .unwrap();

    let message = common::recv_signal(&mut rx_a).await;
    assert_eq!(message["body"], "hello");
    let message = common::recv_signal(&mut rx_b).await;
    assert_eq!(message["body"], "hello");
}

#[tokio::test]
async fn test_perform_double_encodes_the_action_payload() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, mut conn, _welcome_rx) = connected_consumer(&mut server).await;

    let subscription = consumer
        .subscriptions()
        .create("Room", ChannelCallbacks::new())
        .await
        .unwrap();
    common::recv_frame(&mut conn).await;

    assert!(subscription.perform("speak", json!({"body": "hi"})).await);

    let frame = common::recv_frame(&mut conn).await;
    assert_eq!(frame["command"], "message");
    assert_eq!(frame["identifier"], ROOM);
    let data: serde_json::Value =
        serde_json::from_str(frame["data"].as_str().expect("data must be a string")).unwrap();
    assert_eq!(data, json!({"action": "speak", "body": "hi"}));
}

#[tokio::test]
async fn test_server_disconnect_reports_reconnect_intent() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, conn, _welcome_rx) = connected_consumer(&mut server).await;

    let (disc_tx, mut disc_rx) = mpsc::unbounded_channel::<Disconnected>();
    consumer
        .subscriptions()
        .create(
            "Room",
            ChannelCallbacks::new().on_disconnected(move |info| {
                let _ = disc_tx.send(info);
            }),
        )
        .await
        .unwrap();

    conn.tx
        .send(common::disconnect(disconnect_reasons::SERVER_RESTART, true))
        .unwrap();

    // The client closes the socket but keeps the monitor running.
    let info = common::recv_signal(&mut disc_rx).await;
    assert!(info.will_attempt_reconnect);
    common::assert_no_signal(&mut disc_rx, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_server_disconnect_without_reconnect_stops_the_monitor() {
    let mut server = common::start_server(Some("actioncable-v1-json")).await;
    let (consumer, conn, _welcome_rx) = connected_consumer(&mut server).await;

    let (disc_tx, mut disc_rx) = mpsc::unbounded_channel::<Disconnected>();
    consumer
        .subscriptions()
        .create(
            "Room",
            ChannelCallbacks::new().on_disconnected(move |info| {
                let _ = disc_tx.send(info);
            }),
        )
        .await
        .unwrap();

    conn.tx
        .send(common::disconnect(disconnect_reasons::UNAUTHORIZED, false))
        .unwrap();

    let info = common::recv_signal(&mut disc_rx).await;
    assert!(!info.will_attempt_reconnect);
}

#[tokio::test]
async fn test_sends_while_disconnected_return_false() {
    // Nothing is listening here; the dial is refused immediately.
    let consumer = Consumer::builder().url("ws://127.0.0.1:1/cable").build();

    assert!(!consumer.send(json!({"command": "noop"})).await);

    // Creation still succeeds; the subscription is tracked and will be
    // advertised by the reload after a successful reconnect.
    let subscription = consumer
        .subscriptions()
        .create("Room", ChannelCallbacks::new())
        .await
        .unwrap();
    assert!(!subscription.send(json!({"body": "dropped"})).await);
    assert!(!subscription.perform("speak", json!({})).await);
    assert!(!consumer.is_connected());
}
