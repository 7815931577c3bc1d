//! Config schema types (server, whatsapp session, media, auto-reply).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalinkConfig {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub media: MediaConfig,
    pub auto_reply: AutoReplyConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    /// Port to listen on. Defaults to 8000.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

/// The WhatsApp Web session and its sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// File holding the serialized session credentials.
    pub session_file: PathBuf,
    /// Country calling code prepended to local numbers (no `+`).
    pub country_code: String,
    /// Re-run initialization when the remote rejects authentication,
    /// instead of staying in the failed state.
    pub restart_on_auth_fail: bool,
    /// Upper bound on a single send; `0` disables the timeout.
    pub send_timeout_secs: u64,
    /// Run the registration lookup before media sends as well as text sends.
    pub check_registration_for_media: bool,
    pub sidecar: SidecarConfig,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            session_file: PathBuf::from("whatsapp-session.json"),
            country_code: "62".into(),
            restart_on_auth_fail: true,
            send_timeout_secs: 60,
            check_registration_for_media: true,
            sidecar: SidecarConfig::default(),
        }
    }
}

/// Connection to the WhatsApp Web sidecar process.
///
/// The sidecar is a separate Node.js program (not part of this workspace)
/// that drives WhatsApp Web and serves the sidecar WebSocket protocol. With
/// `auto_start` the gateway expects its sources in `dir` (or
/// `$WALINK_SIDECAR_DIR`, or `sidecar/whatsapp-web`) and runs
/// `npm install && npm run build` when `dist/index.js` is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Port the sidecar WebSocket server listens on.
    pub port: u16,
    /// Directory containing the sidecar code (`package.json`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Spawn and supervise the sidecar process. Disable to run it by hand.
    pub auto_start: bool,
    /// Connection attempts before giving up, at startup and when
    /// reconnecting after the sidecar went away.
    pub connect_retries: u32,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            port: 18801,
            dir: None,
            auto_start: true,
            connect_retries: 10,
        }
    }
}

/// Media acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Base directory for local files (`/send-files`, reply rules).
    pub files_dir: PathBuf,
    /// File sent by `/send-files`, relative to `files_dir`.
    pub default_file: PathBuf,
    /// Timeout for remote URL fetches.
    pub fetch_timeout_secs: u64,
    /// Largest payload accepted from any source.
    pub max_media_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            files_dir: PathBuf::from("files"),
            default_file: PathBuf::from("image.png"),
            fetch_timeout_secs: 30,
            max_media_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Scripted replies to inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoReplyConfig {
    pub enabled: bool,
    /// Replaces the built-in rule table when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<ReplyRuleConfig>>,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: None,
        }
    }
}

/// One trigger and the replies it fires, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRuleConfig {
    pub trigger: String,
    pub replies: Vec<ReplyConfig>,
}

/// A reply entry: `{ text = "..." }` or `{ file = "image.png" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyConfig {
    Text(String),
    File(PathBuf),
}
