use std::{error::Error as StdError, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A local file named by a descriptor does not exist.
    #[error("media file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A remote URL answered with a non-success status.
    #[error("fetching {url} returned HTTP {status}")]
    FetchStatus { url: String, status: u16 },

    /// A remote URL could not be reached or its body could not be read.
    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A payload exceeds the configured size limit.
    #[error("media is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{message}")]
    InvalidInput { message: String },
}

impl Error {
    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn fetch<E>(url: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Fetch {
            url: url.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True for failures of the remote fetch path (status or network).
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::FetchStatus { .. } | Self::Fetch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
