use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    serde_json::Value,
    tokio::sync::mpsc,
    tracing::{debug, info},
    walink_protocol::{events, status},
};

use crate::{
    broadcast::encode_frame,
    state::{ConnectedClient, GatewayState},
};

/// Handle one observer connection: greet, replay the relay snapshot, then
/// forward broadcasts until either side closes.
///
/// Observers are push-only; anything they send is discarded.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    remote_addr: SocketAddr,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let remote_ip = remote_addr.ip().to_string();
    info!(conn_id = %conn_id, remote_ip = %remote_ip, "ws: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards frames from the client channel to the socket.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write loop closed");
                break;
            }
        }
    });

    // Holding the client map while replaying means no broadcast can land
    // between the snapshot and registration.
    {
        let mut clients = state.clients.write().await;
        for frame in greeting(&state).await {
            let _ = client_tx.send(frame);
        }
        clients.insert(conn_id.clone(), ConnectedClient {
            conn_id: conn_id.clone(),
            remote_ip,
            sender: client_tx,
            connected_at: Instant::now(),
        });
    }

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        }
    }

    let duration_secs = state
        .remove_client(&conn_id)
        .await
        .map(|c| c.connected_at.elapsed().as_secs())
        .unwrap_or_default();
    write_handle.abort();
    info!(conn_id = %conn_id, duration_secs, "ws: connection closed");
}

/// "Connecting..." followed by the last code image and status, if any.
async fn greeting(state: &GatewayState) -> Vec<String> {
    let snapshot = state.snapshot().await;
    let mut frames = vec![(events::MESSAGE, Value::String(status::CONNECTING.into()))];
    if let Some(qr) = snapshot.qr {
        frames.push((events::QR, Value::String(qr)));
    }
    if let Some(status) = snapshot.status {
        frames.push((events::MESSAGE, Value::String(status)));
    }
    frames
        .into_iter()
        .filter_map(|(event, payload)| encode_frame(state, event, payload))
        .collect()
}
