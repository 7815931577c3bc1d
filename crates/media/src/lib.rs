//! Media acquisition: turn a `MediaDescriptor` into bytes and a MIME type,
//! reading local files, passing uploads through, or fetching remote URLs.

pub mod error;
pub mod fetch;
pub mod mime;
pub mod resolve;

pub use {
    error::{Error, Result},
    fetch::{FetchedMedia, MediaFetcher, ReqwestFetcher},
    resolve::MediaResolver,
};
