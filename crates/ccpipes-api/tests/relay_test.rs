#![allow(clippy::unwrap_used)]
// Integration tests for `RelayHandle` against a local WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use ccpipes_api::{
    ConfirmationOutcome, MessageType, ReconnectConfig, RelayHandle, RelayState, Request,
    RequestBody, ServerMessage,
};

// ── Helpers ─────────────────────────────────────────────────────────

const TIMEOUT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_retries: Some(3),
    }
}

// ── Round trip ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_and_confirmation_round_trip() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let request: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(request["type"], "SessionJoin");
        assert_eq!(request["sessionId"], "abc123");

        // Garbage first: the client must skip it and keep reading.
        ws.send(Message::text("{not json")).await.unwrap();
        let reply = json!({
            "type": "ConfirmationResponse",
            "respondingTo": "SessionJoin",
            "reqId": request["reqId"],
            "ok": true
        });
        ws.send(Message::text(reply.to_string())).await.unwrap();
        // Keep the socket open until the client hangs up.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let cancel = CancellationToken::new();
    let (relay, mut inbound) = RelayHandle::connect(&url, fast_reconnect(), cancel.clone()).unwrap();

    let join = Request::new(RequestBody::SessionJoin {
        session_id: "abc123".into(),
    });
    let req_id = join.req_id.clone();
    relay.send(join).await.unwrap();

    let msg = tokio::time::timeout(TIMEOUT, inbound.recv())
        .await
        .unwrap()
        .unwrap();
    let ServerMessage::ConfirmationResponse(conf) = msg else {
        panic!("expected confirmation, got {msg:?}");
    };
    assert_eq!(conf.responding_to, MessageType::SessionJoin);
    assert_eq!(conf.req_id, Some(req_id));
    assert_eq!(conf.into_outcome(), ConfirmationOutcome::Ack);

    relay.shutdown();
    tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
}

// ── Connection state ────────────────────────────────────────────────

#[tokio::test]
async fn test_state_reports_connected() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (relay, _inbound) =
        RelayHandle::connect(&url, fast_reconnect(), CancellationToken::new()).unwrap();
    let mut state = relay.state();

    tokio::time::timeout(
        TIMEOUT,
        state.wait_for(|s| matches!(s, RelayState::Connected { generation: 1 })),
    )
    .await
    .unwrap()
    .unwrap();

    relay.shutdown();
}

#[tokio::test]
async fn test_gives_up_after_retry_budget() {
    // Bind then drop so the port refuses connections.
    let (listener, url) = bind().await;
    drop(listener);

    let (relay, _inbound) =
        RelayHandle::connect(&url, fast_reconnect(), CancellationToken::new()).unwrap();
    let mut state = relay.state();

    tokio::time::timeout(TIMEOUT, state.wait_for(|s| *s == RelayState::Failed))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_unsolicited_factory_diff_is_delivered() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let update = json!({
            "type": "CcUpdatedFactory",
            "diff": [{ "available": { "minecraft:chest_0": [true] } }]
        });
        ws.send(Message::text(update.to_string())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (relay, mut inbound) =
        RelayHandle::connect(&url, fast_reconnect(), CancellationToken::new()).unwrap();

    let msg = tokio::time::timeout(TIMEOUT, inbound.recv())
        .await
        .unwrap()
        .unwrap();
    let ServerMessage::CcUpdatedFactory { diff } = msg else {
        panic!("expected CcUpdatedFactory, got {msg:?}");
    };
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].as_value()["available"]["minecraft:chest_0"], json!([true]));

    relay.shutdown();
}

#[tokio::test]
async fn test_reconnect_bumps_generation_and_flushes_queue() {
    let (listener, url) = bind().await;
    let (reaccept_tx, reaccept_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut first = tokio_tungstenite::accept_async(tcp).await.unwrap();
        first.close(None).await.unwrap();
        while let Some(Ok(_)) = first.next().await {}

        // Hold the second handshake until the client has queued a request.
        reaccept_rx.await.unwrap();
        let (tcp, _) = listener.accept().await.unwrap();
        let mut second = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let frame = second.next().await.unwrap().unwrap();
        let request: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        while let Some(Ok(_)) = second.next().await {}
        request
    });

    let (relay, _inbound) =
        RelayHandle::connect(&url, fast_reconnect(), CancellationToken::new()).unwrap();
    let mut state = relay.state();

    tokio::time::timeout(
        TIMEOUT,
        state.wait_for(|s| matches!(s, RelayState::Connected { generation: 1 })),
    )
    .await
    .unwrap()
    .unwrap();
    tokio::time::timeout(
        TIMEOUT,
        state.wait_for(|s| !matches!(s, RelayState::Connected { .. })),
    )
    .await
    .unwrap()
    .unwrap();

    let get = Request::new(RequestBody::FactoryGet {});
    let req_id = get.req_id.clone();
    relay.send(get).await.unwrap();
    reaccept_tx.send(()).unwrap();

    tokio::time::timeout(
        TIMEOUT,
        state.wait_for(|s| matches!(s, RelayState::Connected { generation: 2 })),
    )
    .await
    .unwrap()
    .unwrap();

    relay.shutdown();
    let request = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(request["type"], "FactoryGet");
    assert_eq!(request["reqId"], json!(req_id.as_str()));
}

// ── Backpressure ────────────────────────────────────────────────────

#[tokio::test]
async fn test_requests_flow_while_inbound_is_backed_up() {
    const FRAMES: usize = 400;
    const REQUESTS: usize = 100;
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let (mut sink, mut stream) = ws.split();

        tokio::spawn(async move {
            let notice = json!({ "type": "IdleTimeout", "message": "still here" }).to_string();
            for _ in 0..FRAMES {
                if sink.send(Message::text(notice.clone())).await.is_err() {
                    return;
                }
            }
        });

        let mut received = 0;
        while received < REQUESTS {
            match stream.next().await {
                Some(Ok(Message::Text(_))) => received += 1,
                Some(Ok(_)) => {}
                _ => break,
            }
        }
        received
    });

    // `_inbound` stays alive but is never read, so its queue fills up.
    let (relay, _inbound) =
        RelayHandle::connect(&url, fast_reconnect(), CancellationToken::new()).unwrap();

    tokio::time::timeout(TIMEOUT, async {
        for i in 0..REQUESTS {
            let del = RequestBody::PipeDel {
                pipe_id: format!("pipe{i}").into(),
            };
            relay.send(Request::new(del)).await.unwrap();
        }
    })
    .await
    .unwrap();

    let received = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(received, REQUESTS);
    relay.shutdown();
}
