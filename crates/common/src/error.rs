use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A media request named zero sources, or more than one.
    #[error("invalid media descriptor: {0}")]
    InvalidMedia(String),
}

impl Error {
    #[must_use]
    pub fn invalid_media(message: impl Into<String>) -> Self {
        Self::InvalidMedia(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
