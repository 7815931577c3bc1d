//! Session events → observer frames, plus credential persistence.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::Value,
    tracing::{error, info, warn},
    walink_protocol::{events, status},
    walink_whatsapp::{SessionEvent, SessionEventHandler},
};

use crate::{
    broadcast::{broadcast, broadcast_status},
    qr::qr_data_url,
    state::GatewayState,
};

/// Fans session lifecycle events out to every observer and keeps the session
/// store in step with authentication.
///
/// Registered first on the session, so credentials are on disk before any
/// later handler sees `Ready`.
pub struct EventRelay {
    state: Arc<GatewayState>,
}

impl EventRelay {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }

    async fn on_code(&self, code: &str) {
        match qr_data_url(code) {
            Ok(url) => {
                self.state.snapshot.write().await.qr = Some(url.clone());
                broadcast(&self.state, events::QR, Value::String(url)).await;
            },
            Err(e) => warn!(error = %e, "failed to render login code"),
        }
        broadcast_status(&self.state, status::QR_RECEIVED).await;
    }

    async fn clear_qr(&self) {
        self.state.snapshot.write().await.qr = None;
    }
}

#[async_trait]
impl SessionEventHandler for EventRelay {
    async fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::CodeReady { code } => self.on_code(code).await,
            SessionEvent::Authenticated { credentials } => {
                if let Err(e) = self.state.store.save(credentials).await {
                    error!(error = %e, "failed to persist session credentials");
                }
                self.clear_qr().await;
                broadcast(
                    &self.state,
                    events::AUTHENTICATED,
                    Value::String(status::AUTHENTICATED.into()),
                )
                .await;
                broadcast_status(&self.state, status::AUTHENTICATED).await;
            },
            SessionEvent::Ready { phone } => {
                info!(phone = phone.as_deref().unwrap_or("unknown"), "whatsapp ready");
                broadcast(&self.state, events::READY, Value::String(status::READY.into()))
                    .await;
                broadcast_status(&self.state, status::READY).await;
            },
            SessionEvent::AuthFailure { reason } => {
                if let Err(e) = self.state.store.clear().await {
                    warn!(error = %e, "failed to clear rejected session credentials");
                }
                self.clear_qr().await;
                broadcast_status(&self.state, status::auth_failure(reason)).await;
            },
            SessionEvent::Disconnected { reason } => {
                broadcast_status(&self.state, status::disconnected(reason)).await;
            },
            SessionEvent::Message(_) => {},
        }
    }
}
