//! Real-time channel frame definitions.
//!
//! The gateway pushes JSON event frames to every connected observer over
//! WebSocket (`GET /ws`). Observers never send requests; anything they send
//! is ignored.
//!
//! Frame: `{"type":"event","event":"qr","payload":"data:image/png;base64,...","seq":4}`

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB, inbound frames are discarded anyway
pub const TICK_INTERVAL_MS: u64 = 30_000; // 30s

// ── Event names ──────────────────────────────────────────────────────────────

pub mod events {
    /// Image-encoded scannable code (data URL).
    pub const QR: &str = "qr";
    /// Session authenticated; payload is a status string.
    pub const AUTHENTICATED: &str = "authenticated";
    /// Session ready to send; payload is a status string.
    pub const READY: &str = "ready";
    /// Human-readable status line.
    pub const MESSAGE: &str = "message";
    /// Keepalive with the current session state.
    pub const TICK: &str = "tick";

    pub const ALL: &[&str] = &[QR, AUTHENTICATED, READY, MESSAGE, TICK];
}

// ── Status strings ───────────────────────────────────────────────────────────

pub mod status {
    pub const CONNECTING: &str = "Connecting...";
    pub const QR_RECEIVED: &str = "QR code received, scan please!";
    pub const AUTHENTICATED: &str = "WhatsApp authenticated!";
    pub const READY: &str = "WhatsApp is ready!";

    pub fn auth_failure(reason: &str) -> String {
        format!("Authentication failed: {reason}")
    }

    pub fn disconnected(reason: &str) -> String {
        format!("WhatsApp disconnected: {reason}")
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Gateway → observer server-push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value, seq: u64) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload: Some(payload),
            seq: Some(seq),
        }
    }

    /// Status line frame, the most common push.
    pub fn message(text: impl Into<String>, seq: u64) -> Self {
        Self::new(events::MESSAGE, serde_json::Value::String(text.into()), seq)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_frame_wire_shape() {
        let frame = EventFrame::message(status::CONNECTING, 1);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "event",
                "event": "message",
                "payload": "Connecting...",
                "seq": 1,
            })
        );
    }

    #[test]
    fn event_frame_omits_missing_fields() {
        let frame = EventFrame {
            r#type: "event".into(),
            event: events::READY.into(),
            payload: None,
            seq: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("payload"));
        assert!(!json.contains("seq"));
    }
}
