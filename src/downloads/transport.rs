/**
 * HTTP Transport
 *
 * The seam between the fetcher and the network. `HttpTransport` is the
 * reqwest-backed implementation; tests substitute their own.
 */
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, Url};
use std::time::Duration;

use crate::error::FetchError;

/// An opened response body, not yet read
pub struct TransferBody {
    /// Declared content length, if any
    pub total: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes, FetchError>>,
}

/// Opens streaming reads of remote resources
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request handshake. Fails on connection errors and
    /// non-success statuses; the body is returned unread.
    async fn open(&self, url: &str) -> Result<TransferBody, FetchError>;
}

pub struct HttpTransport {
    client: Client,
    bearer_token: Option<String>,
    /// When set, the token is only sent to this host
    token_host: Option<String>,
}

impl HttpTransport {
    /// Large weight files take a while; the default allows 30 minutes
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::transfer("<http client>", e))?;
        Ok(Self {
            client,
            bearer_token: None,
            token_host: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self.token_host = None;
        self
    }

    /// Send the bearer token only to URLs on `host`
    pub fn with_bearer_token_for(mut self, host: impl Into<String>, token: Option<String>) -> Self {
        self.bearer_token = token;
        self.token_host = Some(host.into());
        self
    }

    pub(crate) fn token_for(&self, url: &str) -> Option<&str> {
        let token = self.bearer_token.as_deref()?;
        match &self.token_host {
            None => Some(token),
            Some(host) => {
                let parsed = Url::parse(url).ok()?;
                (parsed.host_str() == Some(host.as_str())).then_some(token)
            }
        }
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<TransferBody, FetchError> {
        let mut request = self.client.get(url);
        if let Some(token) = self.token_for(url) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transfer(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::transfer(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let total = response.content_length();
        let locator = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|e| FetchError::transfer(locator.clone(), e)))
            .boxed();

        Ok(TransferBody { total, stream })
    }
}
