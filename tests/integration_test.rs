use axum::extract::ws::Message;
use serde_json::{json, Value};
use std::sync::Arc;
use ttrelay::config::RelayConfig;
use ttrelay::error::RelayError;
use ttrelay::protocol::ServerMessage;
use ttrelay::registry::ClientReceiver;
use ttrelay::router::handle_text;
use ttrelay::state::AppState;

fn drain(rx: &mut ClientReceiver) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        match message {
            Message::Text(text) => out.push(serde_json::from_str(text.as_str()).unwrap()),
            other => panic!("Expected text frame, got {:?}", other),
        }
    }
    out
}

/// Chat from one client reaches every client, the sender included
#[tokio::test]
async fn test_chat_fans_out_to_all_clients() {
    let state = Arc::new(AppState::default());
    let (x, mut rx_x) = state.registry.open_session().await;
    let (_y, mut rx_y) = state.registry.open_session().await;

    let reply = handle_text(r#"{"type":"chat","from":"A","text":"hi"}"#, x.id(), &state)
        .await
        .unwrap();
    assert!(reply.is_none(), "Chat should not produce a direct reply");

    let expected = json!({"type": "chat", "from": "A", "text": "hi"});
    assert_eq!(drain(&mut rx_x), vec![expected.clone()]);
    assert_eq!(drain(&mut rx_y), vec![expected]);
}

#[tokio::test]
async fn test_aac_text_defaults_sender_to_web() {
    let state = Arc::new(AppState::default());
    let (x, mut rx_x) = state.registry.open_session().await;

    handle_text(r#"{"type":"aac_text","text":"hello"}"#, x.id(), &state)
        .await
        .unwrap();

    assert_eq!(
        drain(&mut rx_x),
        vec![json!({"type": "chat", "from": "web", "text": "hello"})]
    );
}

/// Extra client fields are never forwarded to other clients
#[tokio::test]
async fn test_chat_broadcast_drops_extra_fields() {
    let state = Arc::new(AppState::default());
    let (x, _rx_x) = state.registry.open_session().await;
    let (_y, mut rx_y) = state.registry.open_session().await;

    handle_text(
        r#"{"type":"chat","from":"A","text":"  spaced  ","secret":"token","html":"<b>"}"#,
        x.id(),
        &state,
    )
    .await
    .unwrap();

    assert_eq!(
        drain(&mut rx_y),
        vec![json!({"type": "chat", "from": "A", "text": "  spaced  "})]
    );
}

#[tokio::test]
async fn test_malformed_json_never_broadcasts() {
    let state = Arc::new(AppState::default());
    let (x, mut rx_x) = state.registry.open_session().await;
    let (_y, mut rx_y) = state.registry.open_session().await;

    for raw in ["{", "chat", "{\"type\":\"chat\",", "null", "[]", "\u{0}"] {
        let result = handle_text(raw, x.id(), &state).await;
        assert!(matches!(result, Err(RelayError::Parse(_))), "input {:?}", raw);
    }

    assert!(drain(&mut rx_x).is_empty());
    assert!(drain(&mut rx_y).is_empty());
    assert_eq!(state.registry.len().await, 2, "Parse errors keep sessions");
}

#[tokio::test]
async fn test_unknown_type_is_ignored() {
    let state = Arc::new(AppState::default());
    let (x, mut rx_x) = state.registry.open_session().await;
    let (_y, mut rx_y) = state.registry.open_session().await;

    let reply = handle_text(r#"{"type":"foo","text":"hi"}"#, x.id(), &state)
        .await
        .unwrap();

    assert!(reply.is_none());
    assert!(drain(&mut rx_x).is_empty());
    assert!(drain(&mut rx_y).is_empty());
}

/// A session that closes before the broadcast reaches it does not affect the others
#[tokio::test]
async fn test_closed_session_does_not_block_broadcast() {
    let state = Arc::new(AppState::default());
    let (x, mut rx_x) = state.registry.open_session().await;
    let (_gone, rx_gone) = state.registry.open_session().await;
    let (_z, mut rx_z) = state.registry.open_session().await;
    drop(rx_gone);

    handle_text(r#"{"type":"chat","from":"A","text":"still here"}"#, x.id(), &state)
        .await
        .unwrap();

    assert_eq!(drain(&mut rx_x).len(), 1);
    assert_eq!(drain(&mut rx_z).len(), 1);
}

#[tokio::test]
async fn test_liveness_replies_are_not_broadcast() {
    let state = Arc::new(AppState::default());
    let (x, _rx_x) = state.registry.open_session().await;
    let (_y, mut rx_y) = state.registry.open_session().await;

    let ack = handle_text(
        r#"{"type":"handshake","client":"web-ui","protocol":1,"capabilities":["chat"],"timestamp":1}"#,
        x.id(),
        &state,
    )
    .await
    .unwrap();
    let pong = handle_text(r#"{"type":"ping","timestamp":99}"#, x.id(), &state)
        .await
        .unwrap();

    let ack = serde_json::to_value(ack.expect("handshake-ack")).unwrap();
    assert_eq!(ack["type"], "handshake-ack");
    assert_eq!(ack["protocol"], 1);

    let pong = serde_json::to_value(pong.expect("pong")).unwrap();
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["timestamp"], 99);
    assert!(pong["serverTime"].is_i64());

    assert!(drain(&mut rx_y).is_empty());
}

#[tokio::test]
async fn test_silent_server_mode() {
    let state = Arc::new(AppState::new(RelayConfig {
        reply_to_liveness: false,
        ..Default::default()
    }));
    let (x, _rx_x) = state.registry.open_session().await;

    for raw in [r#"{"type":"handshake"}"#, r#"{"type":"ping"}"#] {
        assert!(handle_text(raw, x.id(), &state).await.unwrap().is_none());
    }
}

/// TeamTalk requests answer the sender and reach nobody else
#[tokio::test]
async fn test_tt_requests_are_not_forwarded() {
    let state = Arc::new(AppState::default());
    let (x, _rx_x) = state.registry.open_session().await;
    let (_y, mut rx_y) = state.registry.open_session().await;

    let reply = handle_text(
        r#"{"type":"tt-handshake","ttHost":"tt.example.org","ttPort":10333,
            "username":"Jamie","password":"secret","channel":"Lobby"}"#,
        x.id(),
        &state,
    )
    .await
    .unwrap();

    let reply = serde_json::to_value(reply.expect("tt-status")).unwrap();
    assert_eq!(reply["type"], "tt-status");
    assert_eq!(reply["phase"], "unavailable");
    assert!(!reply.to_string().contains("secret"));

    handle_text(r#"{"type":"tt-join","channel":"Lobby"}"#, x.id(), &state)
        .await
        .unwrap();

    assert!(drain(&mut rx_y).is_empty());
}

#[tokio::test]
async fn test_registry_size_after_connects_and_disconnects() {
    let state = Arc::new(AppState::default());

    for (n, m) in [(1, 0), (5, 5), (10, 3)] {
        let mut sessions = Vec::new();
        for _ in 0..n {
            sessions.push(state.registry.open_session().await);
        }
        for (session, _) in sessions.iter().take(m) {
            state.registry.unregister(session.id()).await;
        }
        assert_eq!(state.registry.len().await, n - m);

        for (session, _) in &sessions {
            state.registry.unregister(session.id()).await;
        }
        assert!(state.registry.is_empty().await);
    }
}

/// Receivers going away while broadcasts run never cost the remaining client a line
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_receivers_closing_during_broadcasts() {
    let state = Arc::new(AppState::default());
    let (x, mut rx_x) = state.registry.open_session().await;

    let mut closing = Vec::new();
    for _ in 0..8 {
        let (_session, rx) = state.registry.open_session().await;
        closing.push(rx);
    }
    let dropper = tokio::spawn(async move {
        for rx in closing {
            drop(rx);
            tokio::task::yield_now().await;
        }
    });

    for i in 0..40 {
        let raw = json!({"type": "chat", "from": "A", "text": i}).to_string();
        handle_text(&raw, x.id(), &state).await.unwrap();
    }
    dropper.await.unwrap();

    let texts: Vec<Value> = drain(&mut rx_x)
        .into_iter()
        .map(|line| line["text"].clone())
        .collect();
    assert_eq!(texts, (0..40).map(|i| json!(i)).collect::<Vec<_>>());

    let report = state
        .registry
        .broadcast(&ServerMessage::chat(None, Some(json!("last"))), None)
        .await
        .unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.skipped, 8);
}
