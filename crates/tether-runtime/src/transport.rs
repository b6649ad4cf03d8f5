use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("{0} returned an empty body")]
    Empty(String),

    #[error("{0} is unreachable")]
    Unreachable(String),
}

/// Fetches script sources and image bytes
#[async_trait(?Send)]
pub trait Transport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `http`/`https` over reqwest, `file://` from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct DefaultTransport {
    client: reqwest::Client,
}

impl DefaultTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait(?Send)]
impl Transport for DefaultTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(target: "loader", "Fetching {}", url);

        if let Some(path) = url.strip_prefix("file://") {
            return tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                path: path.to_string(),
                source,
            });
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_http(url).await;
        }

        Err(FetchError::UnsupportedScheme(url.to_string()))
    }
}
