//! Feed retrieval: one bounded request per poll cycle, no internal retry.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::error::Error as _;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::FetchError;

/// Performs one GET of `url`.
///
/// Succeeds only on HTTP 200 with a non-empty body. Any request or body read
/// error is classified as a timeout or a network failure.
#[tracing::instrument(skip(client), fields(url = %url))]
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FetchError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await.map_err(classify)?;
    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let body = resp.bytes().await.map_err(classify)?;
    if body.is_empty() {
        return Err(FetchError::EmptyBody);
    }

    debug!(bytes = body.len(), "Feed bytes received");
    Ok(body)
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    // The request URL carries the API key, so strip it from the message
    let err = err.without_url();
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    FetchError::Network(message)
}

/// Where a cycle gets its feed bytes from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Bytes, FetchError>;

    /// Loggable description of the source. Must not contain credentials.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: FeedSource + ?Sized> FeedSource for Box<T> {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        (**self).fetch().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Feed served over HTTP.
pub struct HttpFeedSource<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> HttpFeedSource<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for HttpFeedSource<C> {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        fetch_bytes(&self.client, &self.url).await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Feed replayed from a captured `.pb` file.
pub struct FileFeedSource {
    path: PathBuf,
}

impl FileFeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedSource for FileFeedSource {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| FetchError::Read {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(Bytes::from(bytes))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
