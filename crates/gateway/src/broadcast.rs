use std::sync::Arc;

use {
    tracing::{debug, warn},
    walink_protocol::{EventFrame, events},
};

use crate::state::GatewayState;

/// Serialize one event frame with the next sequence number.
pub(crate) fn encode_frame(
    state: &GatewayState,
    event: &str,
    payload: serde_json::Value,
) -> Option<String> {
    let frame = EventFrame::new(event, payload, state.next_seq());
    match serde_json::to_string(&frame) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(event, error = %e, "failed to serialize event frame");
            None
        },
    }
}

/// Push an event to every connected observer. Observers whose write loop is
/// gone are skipped; they are removed when their connection task ends.
pub async fn broadcast(state: &Arc<GatewayState>, event: &str, payload: serde_json::Value) {
    let Some(json) = encode_frame(state, event, payload) else {
        return;
    };

    let clients = state.clients.read().await;
    debug!(event, clients = clients.len(), "broadcasting event");
    let mut closed = 0usize;
    for client in clients.values() {
        if !client.send(&json) {
            closed += 1;
        }
    }
    if closed > 0 {
        debug!(event, closed, "skipped closed observers");
    }
}

/// Record `text` as the current status line and push it as a `message` event.
pub async fn broadcast_status(state: &Arc<GatewayState>, text: impl Into<String>) {
    let text = text.into();
    state.snapshot.write().await.status = Some(text.clone());
    broadcast(state, events::MESSAGE, serde_json::Value::String(text)).await;
}

/// Keepalive carrying the wall clock and the session state.
pub async fn broadcast_tick(state: &Arc<GatewayState>) {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    broadcast(
        state,
        events::TICK,
        serde_json::json!({
            "ts": ts,
            "session": state.session.state().as_str(),
        }),
    )
    .await;
}
