//! Integration tests for the observer WebSocket channel.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::StreamExt,
    tokio::net::TcpListener,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
};

use {
    walink_common::types::DeliveryReceipt,
    walink_gateway::{
        EventRelay,
        server::build_gateway_app,
        state::{GatewayOptions, GatewayState},
    },
    walink_media::{MediaResolver, ReqwestFetcher},
    walink_protocol::{EventFrame, events, status},
    walink_whatsapp::{
        ChatSession, DispatchPolicy, FileSessionStore, OutboundDispatcher, OutboundPayload,
        SendError, SendOptions, SessionEvent, SessionEventHandler, SessionState,
    },
};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct IdleSession;

#[async_trait]
impl ChatSession for IdleSession {
    fn state(&self) -> SessionState {
        SessionState::AwaitingAuth
    }

    async fn is_registered(&self, _: &str) -> Result<bool, SendError> {
        Err(SendError::NotReady {
            state: SessionState::AwaitingAuth,
        })
    }

    async fn send(
        &self,
        _: &str,
        _: OutboundPayload,
        _: SendOptions,
    ) -> Result<DeliveryReceipt, SendError> {
        Err(SendError::NotReady {
            state: SessionState::AwaitingAuth,
        })
    }
}

async fn start_server() -> (SocketAddr, Arc<GatewayState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let chat: Arc<dyn ChatSession> = Arc::new(IdleSession);
    let fetcher = ReqwestFetcher::new(Duration::from_secs(1), 1024).unwrap();
    let dispatcher = Arc::new(OutboundDispatcher::new(
        Arc::clone(&chat),
        Arc::new(MediaResolver::new(dir.path(), Arc::new(fetcher))),
        DispatchPolicy::default(),
    ));
    let store = Arc::new(FileSessionStore::new(dir.path().join("session.json")));
    let state = GatewayState::new(chat, dispatcher, store, GatewayOptions::default());
    let app = build_gateway_app(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (addr, state, dir)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn next_frame(ws: &mut Client) -> EventFrame {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
        .unwrap();
    let Message::Text(text) = msg else {
        panic!("expected a text frame, got {msg:?}");
    };
    serde_json::from_str(&text).unwrap()
}

/// Wait until the server has registered `n` observers.
async fn wait_for_clients(state: &GatewayState, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.client_count().await != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn new_observer_is_greeted() {
    let (addr, state, _dir) = start_server().await;
    let mut ws = connect(addr).await;

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.r#type, "event");
    assert_eq!(frame.event, events::MESSAGE);
    assert_eq!(frame.payload.unwrap(), status::CONNECTING);
    wait_for_clients(&state, 1).await;
}

#[tokio::test]
async fn relay_events_reach_observers_in_order() {
    let (addr, state, dir) = start_server().await;
    let mut ws = connect(addr).await;
    next_frame(&mut ws).await;
    wait_for_clients(&state, 1).await;

    let relay = EventRelay::new(Arc::clone(&state));
    relay
        .handle(&SessionEvent::CodeReady {
            code: "2@pairing-code".into(),
        })
        .await;
    relay
        .handle(&SessionEvent::Authenticated {
            credentials: walink_whatsapp::SessionCredentials::new(serde_json::json!({"k": 1})),
        })
        .await;
    relay.handle(&SessionEvent::Ready { phone: None }).await;

    let mut names = Vec::new();
    for _ in 0..6 {
        names.push(next_frame(&mut ws).await.event);
    }
    assert_eq!(names, vec![
        events::QR,
        events::MESSAGE,
        events::AUTHENTICATED,
        events::MESSAGE,
        events::READY,
        events::MESSAGE,
    ]);
    assert!(dir.path().join("session.json").exists());
}

#[tokio::test]
async fn late_observer_receives_snapshot() {
    let (addr, state, _dir) = start_server().await;
    EventRelay::new(Arc::clone(&state))
        .handle(&SessionEvent::CodeReady {
            code: "2@late".into(),
        })
        .await;

    let mut ws = connect(addr).await;
    let connecting = next_frame(&mut ws).await;
    assert_eq!(connecting.payload.unwrap(), status::CONNECTING);

    let qr = next_frame(&mut ws).await;
    assert_eq!(qr.event, events::QR);
    assert!(
        qr.payload
            .unwrap()
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );

    let status_frame = next_frame(&mut ws).await;
    assert_eq!(status_frame.payload.unwrap(), status::QR_RECEIVED);
}

#[tokio::test]
async fn closed_observer_does_not_affect_others() {
    let (addr, state, _dir) = start_server().await;
    let mut alive = connect(addr).await;
    let gone = connect(addr).await;
    next_frame(&mut alive).await;
    wait_for_clients(&state, 2).await;

    drop(gone);
    wait_for_clients(&state, 1).await;

    EventRelay::new(Arc::clone(&state))
        .handle(&SessionEvent::Disconnected {
            reason: "phone offline".into(),
        })
        .await;

    let frame = next_frame(&mut alive).await;
    assert_eq!(
        frame.payload.unwrap(),
        "WhatsApp disconnected: phone offline"
    );
}
