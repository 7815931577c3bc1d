use std::fmt;

use {
    serde::{Deserialize, Serialize},
    walink_common::types::ResolvedMedia,
};

/// Opaque credentials of an authenticated WhatsApp Web connection.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredentials(pub serde_json::Value);

impl SessionCredentials {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCredentials([REDACTED])")
    }
}

/// Lifecycle state of the protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    AwaitingAuth,
    Authenticating,
    Ready,
    Disconnected,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message received on the linked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Sender address (`<digits>@c.us`).
    pub from: String,
    /// Chat the message arrived in; equals `from` for direct chats.
    pub chat: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub has_media: bool,
}

/// Raw events produced by a [`crate::Transport`], consumed by the session's
/// event worker in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Qr { code: String },
    Authenticated { credentials: SessionCredentials },
    AuthFailure { reason: String },
    Ready { phone: Option<String> },
    Disconnected { reason: String },
    Message(InboundMessage),
}

/// Lifecycle events delivered to [`crate::SessionEventHandler`]s.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A scannable login code; the consumer must display it.
    CodeReady { code: String },
    Authenticated { credentials: SessionCredentials },
    Ready { phone: Option<String> },
    AuthFailure { reason: String },
    Disconnected { reason: String },
    Message(InboundMessage),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CodeReady { .. } => "code_ready",
            Self::Authenticated { .. } => "authenticated",
            Self::Ready { .. } => "ready",
            Self::AuthFailure { .. } => "auth_failure",
            Self::Disconnected { .. } => "disconnected",
            Self::Message(_) => "message",
        }
    }
}

/// Per-send options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub caption: Option<String>,
    /// Message to quote in the reply.
    pub quoted_message_id: Option<String>,
}

/// A fully resolved outbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Media(ResolvedMedia),
}

// ── Sidecar wire protocol ───────────────────────────────────────────────────

/// Frames sent from the gateway to the sidecar.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    Login {
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<serde_json::Value>,
    },
    Logout,
    CheckRegistered {
        request_id: String,
        jid: String,
    },
    Send {
        request_id: String,
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media: Option<WireMedia>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        quoted_message_id: Option<String>,
    },
}

/// Media as carried over the sidecar socket.
#[derive(Debug, Clone, Serialize)]
pub struct WireMedia {
    pub mimetype: String,
    /// Base64 (standard alphabet).
    pub data: String,
    pub filename: String,
}

/// Frames received from the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    Qr {
        qr: String,
    },
    Authenticated {
        session: serde_json::Value,
    },
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Ready {
        #[serde(default)]
        phone: Option<String>,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message(InboundMessage),
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
        #[serde(default)]
        ack: Option<u8>,
        #[serde(default)]
        error: Option<String>,
    },
    RegisteredResult {
        request_id: String,
        #[serde(default)]
        registered: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        error: String,
    },
}

impl SidecarMessage {
    /// Request id of a reply frame, if this is one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::SendResult { request_id, .. } | Self::RegisteredResult { request_id, .. } => {
                Some(request_id)
            },
            _ => None,
        }
    }

    /// Lifecycle frames become transport events; replies and errors do not.
    pub fn into_event(self) -> Option<TransportEvent> {
        match self {
            Self::Qr { qr } => Some(TransportEvent::Qr { code: qr }),
            Self::Authenticated { session } => Some(TransportEvent::Authenticated {
                credentials: SessionCredentials(session),
            }),
            Self::AuthFailure { reason } => Some(TransportEvent::AuthFailure { reason }),
            Self::Ready { phone } => Some(TransportEvent::Ready { phone }),
            Self::Disconnected { reason } => Some(TransportEvent::Disconnected { reason }),
            Self::Message(msg) => Some(TransportEvent::Message(msg)),
            Self::SendResult { .. } | Self::RegisteredResult { .. } | Self::Error { .. } => None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = SessionCredentials(json!({"WABrowserId": "secret"}));
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn login_omits_absent_session() {
        let frame = serde_json::to_value(GatewayMessage::Login { session: None }).unwrap();
        assert_eq!(frame, json!({"type": "login"}));
    }

    #[test]
    fn send_frame_shape() {
        let frame = serde_json::to_value(GatewayMessage::Send {
            request_id: "r1".into(),
            to: "6281234567890@c.us".into(),
            text: Some("hi".into()),
            media: None,
            caption: None,
            quoted_message_id: Some("m1".into()),
        })
        .unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "send",
                "request_id": "r1",
                "to": "6281234567890@c.us",
                "text": "hi",
                "quoted_message_id": "m1"
            })
        );
    }

    #[test]
    fn parses_inbound_message_frame() {
        let msg: SidecarMessage = serde_json::from_value(json!({
            "type": "message",
            "id": "ABC",
            "from": "6281@c.us",
            "chat": "6281@c.us",
            "body": "P",
            "timestamp": 1700000000
        }))
        .unwrap();
        let Some(TransportEvent::Message(m)) = msg.into_event() else {
            panic!("expected message event");
        };
        assert_eq!(m.body, "P");
        assert!(!m.from_me);
    }

    #[test]
    fn reply_frames_carry_request_id() {
        let msg: SidecarMessage = serde_json::from_value(json!({
            "type": "registered_result",
            "request_id": "abc",
            "registered": true
        }))
        .unwrap();
        assert_eq!(msg.request_id(), Some("abc"));
        assert!(msg.into_event().is_none());
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(SessionState::AwaitingAuth).unwrap(),
            json!("awaiting_auth")
        );
        assert_eq!(SessionState::Ready.to_string(), "ready");
    }
}
