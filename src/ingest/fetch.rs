// src/ingest/fetch.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("fetching {url} is not permitted: {reason}")]
    Disallowed { url: String, reason: String },
}

/// Byte-level access to the feed source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
    fn name(&self) -> &'static str;
}

/// reqwest-backed fetcher with a fixed user agent and request timeout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(FetchError::Disallowed {
                url: url.to_string(),
                reason: format!("status {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Serves a fixed document for every URL. Used for offline runs and tests.
pub struct FixtureFetcher {
    body: Vec<u8>,
}

impl FixtureFetcher {
    pub fn from_str(s: &str) -> Self {
        Self {
            body: s.as_bytes().to_vec(),
        }
    }

    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(Self {
            body: std::fs::read(path)?,
        })
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.body.clone())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
