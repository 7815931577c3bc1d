//! Recovery after the sidecar goes away: restart the process when it died,
//! reconnect the WebSocket, and log the session in again.

use std::sync::{Arc, Weak};

use {
    async_trait::async_trait,
    tokio::sync::Mutex,
    tracing::{error, info, warn},
};

use crate::{
    process::{SidecarProcess, SidecarProcessConfig, start_sidecar},
    session::{SessionEventHandler, WhatsAppSession},
    sidecar::SidecarTransport,
    types::SessionEvent,
};

pub struct SidecarSupervisor {
    transport: Arc<SidecarTransport>,
    session: Weak<WhatsAppSession>,
    /// Launch settings, `None` when the sidecar is run by hand.
    launch: Option<SidecarProcessConfig>,
    process: Mutex<Option<SidecarProcess>>,
    connect_retries: u32,
}

impl SidecarSupervisor {
    pub fn new(
        transport: Arc<SidecarTransport>,
        session: &Arc<WhatsAppSession>,
        launch: Option<SidecarProcessConfig>,
        process: Option<SidecarProcess>,
        connect_retries: u32,
    ) -> Self {
        Self {
            transport,
            session: Arc::downgrade(session),
            launch,
            process: Mutex::new(process),
            connect_retries,
        }
    }

    /// Restart the sidecar process if it is no longer running.
    async fn ensure_process_running(&self) -> anyhow::Result<()> {
        let Some(launch) = &self.launch else {
            return Ok(());
        };
        let mut process = self.process.lock().await;
        if let Some(proc) = process.as_mut() {
            if proc.is_running() {
                return Ok(());
            }
            warn!("sidecar process died, restarting");
        }
        *process = Some(start_sidecar(launch.clone()).await?);
        Ok(())
    }

    async fn recover(&self) -> anyhow::Result<()> {
        self.ensure_process_running().await?;
        self.transport.reconnect(self.connect_retries).await?;
        if let Some(session) = self.session.upgrade() {
            session.resume().await?;
        }
        Ok(())
    }

    /// Stop the supervised process, if any.
    pub async fn stop(&self) {
        if let Some(proc) = self.process.lock().await.as_mut()
            && let Err(e) = proc.stop().await
        {
            warn!(error = %e, "failed to stop WhatsApp sidecar");
        }
    }
}

#[async_trait]
impl SessionEventHandler for SidecarSupervisor {
    async fn handle(&self, event: &SessionEvent) {
        // A `disconnected` frame from a live sidecar is the remote side
        // dropping; only a closed socket needs recovery here.
        let SessionEvent::Disconnected { reason } = event else {
            return;
        };
        if self.transport.is_connected() {
            return;
        }

        info!(reason, port = self.transport.port(), "recovering WhatsApp sidecar");
        match self.recover().await {
            Ok(()) => info!("WhatsApp sidecar recovered, logging in again"),
            Err(e) => error!(
                error = %e,
                "WhatsApp sidecar recovery failed, restart the gateway"
            ),
        }
    }
}
