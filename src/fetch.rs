//! Outbound fetch client
//! All remote fetches go through a [`FetchClient`] so handlers can be tested without a network

use crate::error::ProxyError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A fetched remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// URL of the final response, after redirects
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchedResource {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Fetches remote resources on behalf of the handlers
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetch `url`. Non-success statuses are returned, not raised; only
    /// transport failures, timeouts and oversized bodies are errors.
    async fn fetch(&self, url: &Url) -> Result<FetchedResource, ProxyError>;
}

/// Outbound client configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_bytes: usize,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_body_bytes: 10 * 1024 * 1024,
            max_redirects: 5,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`FetchClient`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build outbound HTTP client")?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn request_error(url: &Url, e: reqwest::Error) -> ProxyError {
        if e.is_timeout() {
            ProxyError::Timeout {
                url: url.to_string(),
            }
        } else {
            ProxyError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl FetchClient for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResource, ProxyError> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::request_error(url, e))?;

        let too_large = || ProxyError::BodyTooLarge {
            url: url.to_string(),
            limit: self.max_body_bytes,
        };

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(too_large());
            }
        }

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::request_error(url, e))?;
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} ({} bytes, status {})", final_url, body.len(), status);

        Ok(FetchedResource {
            url: final_url,
            status,
            content_type,
            body: body.freeze(),
        })
    }
}
