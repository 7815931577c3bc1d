//! The single WhatsApp Web session and its authentication lifecycle.
//!
//! ```text
//! Uninitialized → AwaitingAuth → Authenticating → Ready ⇄ Disconnected
//!                                       ↘ Failed
//! ```
//!
//! Every lifecycle event is processed by one worker task, which awaits the
//! registered [`SessionEventHandler`]s in order before taking the next
//! event. A handler that persists credentials on `Authenticated` therefore
//! finishes before any handler sees `Ready`.

use std::{
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::sync::{mpsc, watch},
    tracing::{debug, info, warn},
    walink_common::types::DeliveryReceipt,
};

use crate::{
    error::{Error, Result, SendError},
    store::SessionStore,
    transport::Transport,
    types::{
        OutboundPayload, SendOptions, SessionCredentials, SessionEvent, SessionState,
        TransportEvent,
    },
};

/// Send/query surface of a chat session, as used by the dispatcher and the
/// reply reactor.
#[async_trait]
pub trait ChatSession: Send + Sync {
    fn state(&self) -> SessionState;

    async fn is_registered(&self, address: &str) -> std::result::Result<bool, SendError>;

    async fn send(
        &self,
        address: &str,
        payload: OutboundPayload,
        options: SendOptions,
    ) -> std::result::Result<DeliveryReceipt, SendError>;
}

/// Observer of session lifecycle events.
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    async fn handle(&self, event: &SessionEvent);
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Start over without credentials when the remote rejects authentication.
    pub restart_on_auth_fail: bool,
    /// Upper bound on a single send or registration lookup, `None` waits
    /// indefinitely.
    pub send_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            restart_on_auth_fail: true,
            send_timeout: Some(Duration::from_secs(60)),
        }
    }
}

pub struct WhatsAppSession {
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    options: SessionOptions,
    state: watch::Sender<SessionState>,
    /// Set while a stored session is being restored; an auth failure then
    /// falls back to a fresh login instead of counting as a rejection.
    restoring: AtomicBool,
    credentials: RwLock<Option<SessionCredentials>>,
    handlers: RwLock<Vec<Arc<dyn SessionEventHandler>>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl WhatsAppSession {
    /// `events` is the receiving end of the channel the transport publishes
    /// its lifecycle events on.
    pub fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        store: Arc<dyn SessionStore>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Arc::new(Self {
            transport,
            store,
            options,
            state,
            restoring: AtomicBool::new(false),
            credentials: RwLock::new(None),
            handlers: RwLock::new(Vec::new()),
            events: Mutex::new(Some(events)),
        })
    }

    /// Register a handler. Handlers run in registration order.
    pub fn add_handler(&self, handler: Arc<dyn SessionEventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Credentials of the current connection, once authenticated.
    pub fn credentials(&self) -> Option<SessionCredentials> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start the event worker and log in, restoring stored credentials when
    /// present. Only valid from `Uninitialized`.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let current = *self.state.borrow();
        if current != SessionState::Uninitialized {
            return Err(Error::AlreadyInitialized { state: current });
        }

        let events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(events) = events {
            tokio::spawn(Arc::clone(self).run(events));
        }

        self.login().await
    }

    /// Log out on the transport. The state follows from the events the
    /// transport emits.
    pub async fn logout(&self) -> Result<()> {
        self.transport.logout().await
    }

    /// Log in again over a transport that was re-established after a drop,
    /// restoring stored credentials when present. The state only moves once
    /// the transport reports back.
    pub async fn resume(&self) -> Result<()> {
        let state = *self.state.borrow();
        if matches!(state, SessionState::Uninitialized | SessionState::Failed) {
            return Err(Error::CannotResume { state });
        }

        let stored = self.store.load().await;
        self.restoring.store(stored.is_some(), Ordering::SeqCst);
        if let Err(e) = self.transport.connect(stored.as_ref()).await {
            self.restoring.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        let stored = self.store.load().await;
        self.set_state(SessionState::AwaitingAuth);

        if let Some(credentials) = stored {
            info!("restoring stored WhatsApp session");
            self.restoring.store(true, Ordering::SeqCst);
            match self.transport.connect(Some(&credentials)).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "session restore failed, requesting a new code");
                    self.restoring.store(false, Ordering::SeqCst);
                },
            }
        }

        self.fresh_login().await
    }

    async fn fresh_login(&self) -> Result<()> {
        if let Err(e) = self.transport.connect(None).await {
            warn!(error = %e, "failed to start WhatsApp login");
            self.set_state(SessionState::Failed);
            return Err(e);
        }
        Ok(())
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "whatsapp session state changed");
        }
    }

    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.process(event).await;
        }
        debug!("transport event channel closed, session worker exiting");
    }

    async fn process(&self, event: TransportEvent) {
        let state = *self.state.borrow();
        if state == SessionState::Failed {
            debug!(?event, "ignoring transport event in failed state");
            return;
        }

        match event {
            TransportEvent::Qr { code } => {
                self.restoring.store(false, Ordering::SeqCst);
                self.set_state(SessionState::Authenticating);
                self.emit(SessionEvent::CodeReady { code }).await;
            },
            TransportEvent::Authenticated { credentials } => {
                self.restoring.store(false, Ordering::SeqCst);
                if state != SessionState::Ready {
                    self.set_state(SessionState::Authenticating);
                }
                *self
                    .credentials
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
                self.emit(SessionEvent::Authenticated { credentials }).await;
            },
            TransportEvent::Ready { phone } => {
                self.restoring.store(false, Ordering::SeqCst);
                self.set_state(SessionState::Ready);
                self.emit(SessionEvent::Ready { phone }).await;
            },
            TransportEvent::AuthFailure { reason } => {
                self.on_auth_failure(reason).await;
            },
            TransportEvent::Disconnected { reason } => {
                if state == SessionState::Ready {
                    self.set_state(SessionState::Disconnected);
                }
                self.emit(SessionEvent::Disconnected { reason }).await;
            },
            TransportEvent::Message(msg) => {
                self.emit(SessionEvent::Message(msg)).await;
            },
        }
    }

    async fn on_auth_failure(&self, reason: String) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;

        if self.restoring.swap(false, Ordering::SeqCst) {
            warn!(reason, "stored session rejected, requesting a new code");
            self.emit(SessionEvent::AuthFailure { reason }).await;
            let _ = self.fresh_login().await;
            return;
        }

        warn!(reason, "whatsapp authentication failed");
        self.emit(SessionEvent::AuthFailure { reason }).await;

        if self.options.restart_on_auth_fail {
            self.set_state(SessionState::Uninitialized);
            self.set_state(SessionState::AwaitingAuth);
            let _ = self.fresh_login().await;
        } else {
            self.set_state(SessionState::Failed);
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(event = event.name(), handlers = handlers.len(), "dispatching session event");
        for handler in handlers {
            handler.handle(&event).await;
        }
    }

    /// Apply `send_timeout` to a transport call.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, SendError>>,
    ) -> std::result::Result<T, SendError> {
        match self.options.send_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| SendError::transport("timed out"))?,
            None => call.await,
        }
    }

    fn ensure_ready(&self) -> std::result::Result<(), SendError> {
        let state = *self.state.borrow();
        if state.is_ready() {
            Ok(())
        } else {
            Err(SendError::NotReady { state })
        }
    }
}

#[async_trait]
impl ChatSession for WhatsAppSession {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    async fn is_registered(&self, address: &str) -> std::result::Result<bool, SendError> {
        self.ensure_ready()?;
        self.bounded(self.transport.is_registered(address)).await
    }

    async fn send(
        &self,
        address: &str,
        payload: OutboundPayload,
        options: SendOptions,
    ) -> std::result::Result<DeliveryReceipt, SendError> {
        self.ensure_ready()?;
        self.bounded(self.transport.send(address, &payload, &options))
            .await
    }
}
