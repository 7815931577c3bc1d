//! Message payload types shared by the dispatcher, the reactor, and the gateway.

use std::{fmt, path::PathBuf};

use {
    bytes::Bytes,
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Where the bytes of an outbound media message come from.
///
/// Exactly one source is active. Build from loose request fields with
/// [`MediaDescriptor::from_parts`], which rejects zero or multiple sources.
#[derive(Clone, PartialEq, Eq)]
pub enum MediaDescriptor {
    /// A file on local storage, resolved relative to the media directory.
    LocalFile { path: PathBuf },
    /// Bytes already received as part of an upload.
    Uploaded {
        bytes: Bytes,
        mime_type: String,
        filename: String,
    },
    /// A URL fetched with an HTTP GET right before sending.
    RemoteFetch { url: String },
}

/// Loose upload metadata as it arrives from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadParts {
    pub bytes: Bytes,
    pub mime_type: String,
    pub filename: String,
}

impl MediaDescriptor {
    /// Build a descriptor from optional sources, requiring exactly one.
    pub fn from_parts(
        local_path: Option<PathBuf>,
        upload: Option<UploadParts>,
        url: Option<String>,
    ) -> Result<Self> {
        let url = url.filter(|u| !u.trim().is_empty());
        match (local_path, upload, url) {
            (Some(path), None, None) => Ok(Self::LocalFile { path }),
            (None, Some(up), None) => Ok(Self::Uploaded {
                bytes: up.bytes,
                mime_type: up.mime_type,
                filename: up.filename,
            }),
            (None, None, Some(url)) => Ok(Self::RemoteFetch { url }),
            (None, None, None) => Err(Error::invalid_media("no media source given")),
            _ => Err(Error::invalid_media(
                "more than one media source given; expected exactly one",
            )),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile { path: path.into() }
    }

    /// Short name of the acquisition mode, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalFile { .. } => "local_file",
            Self::Uploaded { .. } => "uploaded",
            Self::RemoteFetch { .. } => "remote_fetch",
        }
    }
}

impl fmt::Debug for MediaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalFile { path } => f.debug_struct("LocalFile").field("path", path).finish(),
            Self::Uploaded {
                bytes,
                mime_type,
                filename,
            } => f
                .debug_struct("Uploaded")
                .field("len", &bytes.len())
                .field("mime_type", mime_type)
                .field("filename", filename)
                .finish(),
            Self::RemoteFetch { url } => f.debug_struct("RemoteFetch").field("url", url).finish(),
        }
    }
}

/// Media bytes ready to hand to the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub bytes: Bytes,
    pub mime_type: String,
    pub filename: String,
}

impl fmt::Debug for ResolvedMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMedia")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .finish()
    }
}

/// A single scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    Text(String),
    Media(MediaDescriptor),
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Acknowledgement returned once the remote accepted a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Remote message id.
    pub id: String,
    /// Canonical address the message went to.
    pub to: String,
    /// Unix timestamp (seconds) reported by the remote.
    pub timestamp: i64,
    /// Acknowledgement level (0 = pending, 1 = server, 2 = device, 3 = read).
    #[serde(default)]
    pub ack: u8,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> UploadParts {
        UploadParts {
            bytes: Bytes::from_static(b"abc"),
            mime_type: "text/plain".into(),
            filename: "a.txt".into(),
        }
    }

    #[test]
    fn from_parts_accepts_single_source() {
        assert_eq!(
            MediaDescriptor::from_parts(Some("a.png".into()), None, None).unwrap(),
            MediaDescriptor::local("a.png")
        );
        assert_eq!(
            MediaDescriptor::from_parts(None, Some(upload()), None)
                .unwrap()
                .kind(),
            "uploaded"
        );
        assert_eq!(
            MediaDescriptor::from_parts(None, None, Some("https://x/y.png".into()))
                .unwrap()
                .kind(),
            "remote_fetch"
        );
    }

    #[test]
    fn from_parts_rejects_zero_sources() {
        let err = MediaDescriptor::from_parts(None, None, Some("  ".into())).unwrap_err();
        assert!(matches!(err, Error::InvalidMedia(_)));
    }

    #[test]
    fn from_parts_rejects_multiple_sources() {
        let err =
            MediaDescriptor::from_parts(Some("a.png".into()), None, Some("https://x".into()))
                .unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn debug_hides_payload_bytes() {
        let d = MediaDescriptor::from_parts(None, Some(upload()), None).unwrap();
        let s = format!("{d:?}");
        assert!(s.contains("len: 3"));
        assert!(!s.contains("abc"));
    }
}
