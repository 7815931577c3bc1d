use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate reply trigger: {0:?}")]
    DuplicateTrigger(String),

    #[error("reply rule has an empty trigger")]
    EmptyTrigger,

    #[error(transparent)]
    Send(#[from] walink_whatsapp::SendError),

    #[error(transparent)]
    Media(#[from] walink_media::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
