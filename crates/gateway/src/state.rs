use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use {
    tokio::sync::{RwLock, mpsc},
    walink_whatsapp::{ChatSession, OutboundDispatcher, SessionStore},
};

// ── Connected observer ───────────────────────────────────────────────────────

/// A WebSocket observer.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: String,
    pub remote_ip: String,
    /// Channel for sending serialized frames to this client's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    /// Queue a serialized frame. Returns `false` once the write loop is gone.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Relay snapshot ───────────────────────────────────────────────────────────

/// Latest pairing image and status line, replayed to observers that connect
/// after they were broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySnapshot {
    pub qr: Option<String>,
    pub status: Option<String>,
}

// ── Gateway state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// File sent by `/send-files`, relative to the media directory.
    pub default_file: PathBuf,
    /// Largest multipart body accepted by `/send-browse`.
    pub max_upload_bytes: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            default_file: PathBuf::from("image.png"),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Shared state behind every route and WebSocket connection.
pub struct GatewayState {
    /// All connected observers, keyed by conn_id.
    pub clients: RwLock<HashMap<String, ConnectedClient>>,
    /// Monotonically increasing sequence counter for broadcast events.
    pub seq: AtomicU64,
    pub version: String,
    pub session: Arc<dyn ChatSession>,
    pub dispatcher: Arc<OutboundDispatcher>,
    pub store: Arc<dyn SessionStore>,
    pub snapshot: RwLock<RelaySnapshot>,
    pub options: GatewayOptions,
}

impl GatewayState {
    pub fn new(
        session: Arc<dyn ChatSession>,
        dispatcher: Arc<OutboundDispatcher>,
        store: Arc<dyn SessionStore>,
        options: GatewayOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            version: env!("CARGO_PKG_VERSION").to_string(),
            session,
            dispatcher,
            store,
            snapshot: RwLock::new(RelaySnapshot::default()),
            options,
        })
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn register_client(&self, client: ConnectedClient) {
        let conn_id = client.conn_id.clone();
        self.clients.write().await.insert(conn_id, client);
    }

    pub async fn remove_client(&self, conn_id: &str) -> Option<ConnectedClient> {
        self.clients.write().await.remove(conn_id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn snapshot(&self) -> RelaySnapshot {
        self.snapshot.read().await.clone()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod testing {
    //! Stubs shared by the unit tests of this crate.

    use std::{sync::Mutex, time::Duration};

    use {
        async_trait::async_trait,
        walink_common::types::DeliveryReceipt,
        walink_media::{MediaResolver, ReqwestFetcher},
        walink_whatsapp::{
            DispatchPolicy, OutboundPayload, SendError, SendOptions, SessionCredentials,
            SessionState, StoreError,
        },
    };

    use super::*;

    pub struct StubSession;

    #[async_trait]
    impl ChatSession for StubSession {
        fn state(&self) -> SessionState {
            SessionState::Ready
        }

        async fn is_registered(&self, _: &str) -> Result<bool, SendError> {
            Ok(true)
        }

        async fn send(
            &self,
            address: &str,
            _: OutboundPayload,
            _: SendOptions,
        ) -> Result<DeliveryReceipt, SendError> {
            Ok(DeliveryReceipt {
                id: "m1".into(),
                to: address.to_string(),
                timestamp: 0,
                ack: 1,
            })
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub saved: Mutex<Option<SessionCredentials>>,
        pub clears: Mutex<usize>,
        pub fail_save: bool,
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn load(&self) -> Option<SessionCredentials> {
            self.saved.lock().unwrap().clone()
        }

        async fn save(&self, credentials: &SessionCredentials) -> Result<(), StoreError> {
            if self.fail_save {
                return Err(StoreError::Write {
                    path: "/read-only/session.json".into(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                });
            }
            *self.saved.lock().unwrap() = Some(credentials.clone());
            Ok(())
        }

        async fn clear(&self) -> Result<(), StoreError> {
            *self.saved.lock().unwrap() = None;
            *self.clears.lock().unwrap() += 1;
            Ok(())
        }
    }

    pub fn state_with_store(store: Arc<MemoryStore>) -> Arc<GatewayState> {
        let session: Arc<dyn ChatSession> = Arc::new(StubSession);
        let fetcher = ReqwestFetcher::new(Duration::from_secs(1), 1024).unwrap();
        let resolver = Arc::new(MediaResolver::new("files", Arc::new(fetcher)));
        let dispatcher = Arc::new(OutboundDispatcher::new(
            Arc::clone(&session),
            resolver,
            DispatchPolicy::default(),
        ));
        GatewayState::new(session, dispatcher, store, GatewayOptions::default())
    }

    /// Attach a fake observer and return its frame queue.
    pub async fn observe(
        state: &GatewayState,
        conn_id: &str,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .register_client(ConnectedClient {
                conn_id: conn_id.into(),
                remote_ip: "127.0.0.1".into(),
                sender: tx,
                connected_at: Instant::now(),
            })
            .await;
        rx
    }

    /// Decode every queued frame into `(event, payload)`.
    pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<(String, serde_json::Value)> {
        let mut out = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            let frame: walink_protocol::EventFrame = serde_json::from_str(&raw).unwrap();
            out.push((frame.event, frame.payload.unwrap_or_default()));
        }
        out
    }
}
