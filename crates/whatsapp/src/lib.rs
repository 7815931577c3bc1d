//! WhatsApp Web session for walink.
//!
//! Owns the single live connection to a WhatsApp Web sidecar process, runs
//! the authentication lifecycle, persists credentials, and turns outbound
//! requests (text or media) into sends.

pub mod address;
pub mod error;
pub mod outbound;
pub mod process;
pub mod session;
pub mod sidecar;
pub mod store;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use {
    address::normalize_address,
    error::{DispatchError, Error, Result, SendError, StoreError},
    outbound::{DispatchPolicy, OutboundContent, OutboundDispatcher, OutboundRequest},
    process::{SidecarProcess, SidecarProcessConfig, find_sidecar_dir, start_sidecar},
    session::{ChatSession, SessionEventHandler, SessionOptions, WhatsAppSession},
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarTransport, connect_with_retry},
    store::{FileSessionStore, SessionStore},
    supervisor::SidecarSupervisor,
    transport::Transport,
    types::{
        InboundMessage, OutboundPayload, SendOptions, SessionCredentials, SessionEvent,
        SessionState, TransportEvent,
    },
};
