//! Remote media download.

use std::time::Duration;

use {async_trait::async_trait, bytes::Bytes, tracing::debug};

use crate::error::{Error, Result};

/// Raw body and declared type of a fetched URL.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Bytes,
    /// The response's `Content-Type` header, verbatim.
    pub content_type: Option<String>,
}

/// Issues the HTTP GET behind `MediaDescriptor::RemoteFetch`.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia>;
}

/// `reqwest`-backed fetcher.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("walink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::external("failed to build media http client", e))?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl MediaFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia> {
        debug!(url, "fetching remote media");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::FetchStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = resp.content_length()
            && len as usize > self.max_bytes
        {
            return Err(Error::TooLarge {
                size: len as usize,
                limit: self.max_bytes,
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await.map_err(|e| Error::fetch(url, e))?;
        if bytes.len() > self.max_bytes {
            return Err(Error::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        Ok(FetchedMedia {
            bytes,
            content_type,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> ReqwestFetcher {
        ReqwestFetcher::new(Duration::from_secs(5), 1024).unwrap()
    }

    #[tokio::test]
    async fn returns_body_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/pic.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(b"\x89PNG")
            .create_async()
            .await;

        let got = fetcher()
            .fetch(&format!("{}/pic.png", server.url()))
            .await
            .unwrap();
        assert_eq!(got.bytes.as_ref(), b"\x89PNG");
        assert_eq!(got.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FetchStatus { status: 404, .. }));
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/big")
            .with_status(200)
            .with_body(vec![0u8; 4096])
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&format!("{}/big", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooLarge {
            size: 4096,
            limit: 1024
        }));
    }

    #[tokio::test]
    async fn unreachable_host_is_fetch_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = fetcher()
            .fetch(&format!("http://127.0.0.1:{port}/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
