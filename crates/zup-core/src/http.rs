//! The HTTP capability the pipeline consumes: issue a GET, read a couple of
//! headers, stream the body.

use std::fmt;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderName};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Forward-only response body.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// A successful response whose body has not been consumed yet.
pub struct HttpResponse {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: ByteStream,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("content_type", &self.content_type)
            .field("content_disposition", &self.content_disposition)
            .finish_non_exhaustive()
    }
}

/// Issues GET requests. Transport failures and non-success statuses are
/// reported as [`Error::Network`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| Error::network("client setup", e))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        debug!("GET {url}");
        let response = self
            .inner
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(url, format!("HTTP {status}")));
        }

        let headers = response.headers();
        let content_type = header_value(headers, &CONTENT_TYPE);
        let content_disposition = header_value(headers, &CONTENT_DISPOSITION);

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let body = StreamReader::new(Box::pin(stream));

        Ok(HttpResponse {
            content_type,
            content_disposition,
            body: Box::new(body),
        })
    }
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
