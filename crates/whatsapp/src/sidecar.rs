//! WebSocket client for the WhatsApp Web sidecar.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    async_trait::async_trait,
    base64::Engine,
    futures::{SinkExt, StreamExt},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
    walink_common::types::DeliveryReceipt,
};

use crate::{
    error::{Error, Result, SendError},
    transport::Transport,
    types::{
        GatewayMessage, OutboundPayload, SendOptions, SessionCredentials, SidecarMessage,
        TransportEvent, WireMedia,
    },
};

/// Default port of the sidecar's WebSocket server.
pub const DEFAULT_SIDECAR_PORT: u16 = 18801;

const CONNECTION_CLOSED: &str = "sidecar connection closed";

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<SidecarMessage>>>>;

/// One WebSocket connection to the sidecar.
#[derive(Clone)]
struct Link {
    outgoing: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
}

impl Link {
    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn post(&self, msg: &GatewayMessage) -> std::result::Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::transport(CONNECTION_CLOSED));
        }
        let text = serde_json::to_string(msg)
            .map_err(|e| SendError::transport(format!("failed to encode frame: {e}")))?;
        self.outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| SendError::transport(CONNECTION_CLOSED))
    }
}

/// Sidecar client. Implements [`Transport`].
///
/// When the connection drops, every in-flight and later request fails with a
/// transport error until [`SidecarTransport::reconnect`] succeeds.
pub struct SidecarTransport {
    port: u16,
    events: mpsc::UnboundedSender<TransportEvent>,
    pending: PendingMap,
    link: Mutex<Link>,
}

impl SidecarTransport {
    /// Connect to the sidecar on `127.0.0.1:<port>`. Lifecycle frames are
    /// forwarded to `events`.
    pub async fn connect(
        port: u16,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> anyhow::Result<Self> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let link = open_link(port, events.clone(), Arc::clone(&pending)).await?;
        Ok(Self {
            port,
            events,
            pending,
            link: Mutex::new(link),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_open()
    }

    /// Replace a dropped connection, retrying with backoff while the sidecar
    /// comes back up.
    pub async fn reconnect(&self, max_retries: u32) -> anyhow::Result<()> {
        let link = with_retry(self.port, max_retries, || {
            open_link(self.port, self.events.clone(), Arc::clone(&self.pending))
        })
        .await?;
        *lock(&self.link) = link;
        info!(port = self.port, "reconnected to WhatsApp sidecar");
        Ok(())
    }

    fn current(&self) -> Link {
        lock(&self.link).clone()
    }

    /// Send a request frame and wait for the reply carrying the same id.
    async fn request(
        &self,
        request_id: String,
        msg: GatewayMessage,
    ) -> std::result::Result<SidecarMessage, SendError> {
        let link = self.current();
        let (tx, rx) = oneshot::channel();
        {
            // The reader marks the link closed and drains `pending` under
            // this lock, so an entry inserted here is either drained or
            // refused.
            let mut pending = lock(&self.pending);
            if !link.is_open() {
                return Err(SendError::transport(CONNECTION_CLOSED));
            }
            pending.insert(request_id.clone(), tx);
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id,
        };

        link.post(&msg)?;
        rx.await
            .map_err(|_| SendError::transport(CONNECTION_CLOSED))
    }
}

async fn open_link(
    port: u16,
    events: mpsc::UnboundedSender<TransportEvent>,
    pending: PendingMap,
) -> anyhow::Result<Link> {
    let url = format!("ws://127.0.0.1:{port}");
    let (stream, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut source) = stream.split();
    info!(port, "connected to WhatsApp sidecar");

    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
    let connected = Arc::new(AtomicBool::new(true));

    tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                warn!(error = %e, "failed to write to sidecar");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_connected = Arc::clone(&connected);
    tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "sidecar connection error");
                    break;
                },
            };
            match serde_json::from_str::<SidecarMessage>(&text) {
                Ok(msg) => route(msg, &pending, &events),
                Err(e) => warn!(error = %e, "unparseable sidecar frame"),
            }
        }

        {
            let mut pending = lock(&pending);
            reader_connected.store(false, Ordering::SeqCst);
            // Dropping the senders fails every in-flight request.
            pending.clear();
        }
        let _ = events.send(TransportEvent::Disconnected {
            reason: CONNECTION_CLOSED.into(),
        });
        warn!("WhatsApp sidecar connection closed");
    });

    Ok(Link {
        outgoing,
        connected,
    })
}

fn route(
    msg: SidecarMessage,
    pending: &PendingMap,
    events: &mpsc::UnboundedSender<TransportEvent>,
) {
    if let Some(id) = msg.request_id() {
        match lock(pending).remove(id) {
            Some(tx) => {
                let _ = tx.send(msg);
            },
            None => debug!(request_id = id, "reply for unknown or expired request"),
        }
        return;
    }

    if let SidecarMessage::Error { error } = &msg {
        warn!(error, "sidecar reported an error");
        return;
    }

    if let Some(event) = msg.into_event() {
        let _ = events.send(event);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending entry when its request finishes or is abandoned (for
/// example on send timeout).
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.request_id);
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(&self, credentials: Option<&SessionCredentials>) -> Result<()> {
        let msg = GatewayMessage::Login {
            session: credentials.map(|c| c.as_value().clone()),
        };
        self.current()
            .post(&msg)
            .map_err(|e| Error::transport(e.to_string()))
    }

    async fn logout(&self) -> Result<()> {
        self.current()
            .post(&GatewayMessage::Logout)
            .map_err(|e| Error::transport(e.to_string()))
    }

    async fn is_registered(&self, address: &str) -> std::result::Result<bool, SendError> {
        let request_id = new_request_id();
        let reply = self
            .request(request_id.clone(), GatewayMessage::CheckRegistered {
                request_id,
                jid: address.to_string(),
            })
            .await?;
        match reply {
            SidecarMessage::RegisteredResult {
                error: Some(error), ..
            } => Err(SendError::transport(error)),
            SidecarMessage::RegisteredResult { registered, .. } => Ok(registered),
            other => Err(SendError::transport(format!(
                "unexpected reply to registration check: {other:?}"
            ))),
        }
    }

    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
        options: &SendOptions,
    ) -> std::result::Result<DeliveryReceipt, SendError> {
        let (text, media) = match payload {
            OutboundPayload::Text(text) => (Some(text.clone()), None),
            OutboundPayload::Media(media) => (None, Some(WireMedia {
                mimetype: media.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&media.bytes),
                filename: media.filename.clone(),
            })),
        };

        let request_id = new_request_id();
        let reply = self
            .request(request_id.clone(), GatewayMessage::Send {
                request_id,
                to: to.to_string(),
                text,
                media,
                caption: options.caption.clone(),
                quoted_message_id: options.quoted_message_id.clone(),
            })
            .await?;

        match reply {
            SidecarMessage::SendResult {
                success: true,
                message_id,
                timestamp,
                ack,
                ..
            } => Ok(DeliveryReceipt {
                id: message_id.unwrap_or_default(),
                to: to.to_string(),
                timestamp: timestamp.unwrap_or_else(unix_now),
                ack: ack.unwrap_or_default(),
            }),
            SidecarMessage::SendResult { error, .. } => Err(SendError::transport(
                error.unwrap_or_else(|| "send rejected by sidecar".into()),
            )),
            other => Err(SendError::transport(format!(
                "unexpected reply to send: {other:?}"
            ))),
        }
    }
}

/// Connect with linear backoff, for use right after the sidecar process was
/// spawned and may not be listening yet.
pub async fn connect_with_retry(
    port: u16,
    events: mpsc::UnboundedSender<TransportEvent>,
    max_retries: u32,
) -> anyhow::Result<SidecarTransport> {
    with_retry(port, max_retries, || SidecarTransport::connect(port, events.clone())).await
}

async fn with_retry<T, F, Fut>(
    port: u16,
    max_retries: u32,
    mut attempt_once: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = max_retries.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match attempt_once().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(attempt, port, error = %e, "sidecar not reachable yet");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
            },
        }
    }
    Err(last_err
        .unwrap_or_else(|| anyhow::anyhow!("no connection attempt made"))
        .context(format!("failed to connect to WhatsApp sidecar on port {port}")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        bytes::Bytes,
        serde_json::{Value, json},
        tokio::net::TcpListener,
        walink_common::types::ResolvedMedia,
    };

    /// A scripted sidecar: answers every request frame via `reply`, and
    /// pushes `greeting` frames right after the handshake.
    async fn fake_sidecar(
        greeting: Vec<Value>,
        reply: fn(&Value) -> Option<Value>,
    ) -> (u16, mpsc::UnboundedReceiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let (mut sink, mut source) = ws.split();
            for frame in greeting {
                sink.send(Message::Text(frame.to_string().into()))
                    .await
                    .unwrap();
            }
            while let Some(Ok(Message::Text(text))) = source.next().await {
                let frame: Value = serde_json::from_str(&text).unwrap();
                if let Some(answer) = reply(&frame) {
                    sink.send(Message::Text(answer.to_string().into()))
                        .await
                        .unwrap();
                }
                let _ = seen_tx.send(frame);
            }
        });
        (port, seen_rx)
    }

    fn answer_all(frame: &Value) -> Option<Value> {
        let id = frame.get("request_id")?.clone();
        match frame["type"].as_str()? {
            "check_registered" => Some(json!({
                "type": "registered_result",
                "request_id": id,
                "registered": frame["jid"] == "6281234567890@c.us"
            })),
            "send" => Some(json!({
                "type": "send_result",
                "request_id": id,
                "success": true,
                "message_id": "true_6281234567890@c.us_3EB0",
                "timestamp": 1700000000
            })),
            _ => None,
        }
    }

    fn never_answer(_: &Value) -> Option<Value> {
        None
    }

    #[tokio::test]
    async fn forwards_lifecycle_frames_as_events() {
        let (port, _seen) = fake_sidecar(
            vec![
                json!({"type": "qr", "qr": "2@abc"}),
                json!({"type": "ready", "phone": "6281"}),
            ],
            never_answer,
        )
        .await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _transport = SidecarTransport::connect(port, tx).await.unwrap();

        assert!(matches!(rx.recv().await, Some(TransportEvent::Qr { code }) if code == "2@abc"));
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::Ready { phone: Some(p) }) if p == "6281"
        ));
    }

    #[tokio::test]
    async fn registration_and_send_are_correlated_by_request_id() {
        let (port, mut seen) = fake_sidecar(vec![], answer_all).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = SidecarTransport::connect(port, tx).await.unwrap();

        assert!(transport.is_registered("6281234567890@c.us").await.unwrap());
        assert!(!transport.is_registered("6289999999999@c.us").await.unwrap());

        let media = OutboundPayload::Media(ResolvedMedia {
            bytes: Bytes::from_static(b"hi"),
            mime_type: "text/plain".into(),
            filename: "a.txt".into(),
        });
        let receipt = transport
            .send("6281234567890@c.us", &media, &SendOptions {
                caption: Some("cap".into()),
                quoted_message_id: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.to, "6281234567890@c.us");
        assert_eq!(receipt.timestamp, 1700000000);

        // Skip the two registration checks.
        seen.recv().await.unwrap();
        seen.recv().await.unwrap();
        let frame = seen.recv().await.unwrap();
        assert_eq!(frame["media"]["data"], "aGk=");
        assert_eq!(frame["caption"], "cap");
        assert!(transport.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abandoned_request_is_removed_from_pending() {
        let (port, _seen) = fake_sidecar(vec![], never_answer).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = SidecarTransport::connect(port, tx).await.unwrap();

        let res = tokio::time::timeout(
            Duration::from_millis(100),
            transport.send(
                "6281234567890@c.us",
                &OutboundPayload::Text("hi".into()),
                &SendOptions::default(),
            ),
        )
        .await;
        assert!(res.is_err());
        assert!(transport.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_gives_up_when_nothing_listens() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = connect_with_retry(port, tx, 1).await.err().unwrap();
        assert!(err.to_string().contains("failed to connect"));
    }

    /// Closes the first connection right after the handshake, then answers
    /// every request on the next one.
    async fn flaky_sidecar() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();

            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let (mut sink, mut source) = ws.split();
            while let Some(Ok(Message::Text(text))) = source.next().await {
                let frame: Value = serde_json::from_str(&text).unwrap();
                if let Some(answer) = answer_all(&frame) {
                    sink.send(Message::Text(answer.to_string().into()))
                        .await
                        .unwrap();
                }
            }
        });
        port
    }

    async fn wait_disconnected(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(TransportEvent::Disconnected { .. })));
    }

    #[tokio::test]
    async fn requests_after_close_fail_instead_of_hanging() {
        let port = flaky_sidecar().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = SidecarTransport::connect(port, tx).await.unwrap();
        wait_disconnected(&mut rx).await;
        assert!(!transport.is_connected());

        let res = tokio::time::timeout(
            Duration::from_secs(1),
            transport.is_registered("6281234567890@c.us"),
        )
        .await
        .unwrap();
        assert_eq!(res, Err(SendError::transport(CONNECTION_CLOSED)));
        assert!(Transport::connect(&transport, None).await.is_err());
        assert!(transport.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconnect_restores_requests() {
        let port = flaky_sidecar().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = SidecarTransport::connect(port, tx).await.unwrap();
        wait_disconnected(&mut rx).await;

        transport.reconnect(3).await.unwrap();
        assert!(transport.is_connected());
        assert!(transport.is_registered("6281234567890@c.us").await.unwrap());
    }
}
