use std::{io, path::PathBuf};

use thiserror::Error;

use crate::types::SessionState;

/// Session-level failures outside of a single send (initialization, transport
/// setup).
#[derive(Debug, Error)]
pub enum Error {
    #[error("session already initialized (state: {state})")]
    AlreadyInitialized { state: SessionState },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session cannot resume from state {state}")]
    CannotResume { state: SessionState },
}

impl Error {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single protocol-level send or lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("The number is not registered")]
    UnregisteredDestination { to: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("whatsapp session is not ready (state: {state})")]
    NotReady { state: SessionState },
}

impl SendError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    #[must_use]
    pub fn invalid_address(raw: impl Into<String>) -> Self {
        Self::InvalidAddress(raw.into())
    }

    /// Stable machine-readable name, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "invalid_address",
            Self::UnregisteredDestination { .. } => "unregistered_destination",
            Self::Transport(_) => "transport",
            Self::NotReady { .. } => "not_ready",
        }
    }
}

/// Failure of [`crate::OutboundDispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("send failed: {0}")]
    Send(#[source] SendError),

    #[error("media file not found: {}", path.display())]
    ResourceNotFound { path: PathBuf },

    #[error("failed to fetch media: {0}")]
    Fetch(#[source] walink_media::Error),

    #[error("{0}")]
    Validation(String),

    #[error("failed to load media: {0}")]
    Media(#[source] walink_media::Error),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send(e) => e.kind(),
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::Fetch(_) => "fetch",
            Self::Validation(_) => "validation",
            Self::Media(_) => "media",
        }
    }
}

impl From<SendError> for DispatchError {
    fn from(e: SendError) -> Self {
        Self::Send(e)
    }
}

impl From<walink_media::Error> for DispatchError {
    fn from(e: walink_media::Error) -> Self {
        use walink_media::Error as MediaError;
        match e {
            MediaError::NotFound { path } => Self::ResourceNotFound { path },
            MediaError::TooLarge { .. } | MediaError::InvalidInput { .. } => {
                Self::Validation(e.to_string())
            },
            e if e.is_fetch() => Self::Fetch(e),
            e => Self::Media(e),
        }
    }
}

/// Credential persistence failure. Logged by callers, never fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write session file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove session file {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode session credentials: {0}")]
    Encode(#[from] serde_json::Error),
}
