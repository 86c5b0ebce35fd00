//! Shared HTTP transport for the store and registry adapters
//!
//! Wraps a `reqwest::Client` with configured timeouts, builds URLs from
//! percent-encoded path segments, and turns non-success statuses into
//! `ClientError::RequestFailed` so callers can classify them.

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::config::HttpClientConfig;
use crate::error::{ClientError, Result};

/// JSON-over-HTTP client bound to one base URL
#[derive(Clone, Debug)]
pub struct SyncHttpClient {
    client: Client,
    base: Url,
}

impl SyncHttpClient {
    /// Create a new HTTP client
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;

        let mut base = Url::parse(&config.base_url)?;
        let context_path = config.context_path.trim_matches('/');
        if !context_path.is_empty() {
            base.path_segments_mut()
                .map_err(|_| anyhow::anyhow!("base url '{}' cannot carry a path", config.base_url))?
                .pop_if_empty()
                .extend(context_path.split('/'));
        }

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Build a URL by appending encoded `segments` to the base
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET and decode a JSON body
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::decode(Self::check(response).await?).await
    }

    /// GET with query parameters and decode a JSON body
    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        query: &Q,
    ) -> Result<T> {
        let url = self.url(segments)?;
        debug!("GET {}", url);
        let response = self.client.get(url).query(query).send().await?;
        Self::decode(Self::check(response).await?).await
    }

    /// POST a JSON body, returning the raw response bytes
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Vec<u8>> {
        let url = self.url(segments)?;
        debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        Ok(Self::check(response).await?.bytes().await?.to_vec())
    }

    /// PUT a JSON body, returning the raw response bytes
    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Vec<u8>> {
        let url = self.url(segments)?;
        debug!("PUT {}", url);
        let response = self.client.put(url).json(body).send().await?;
        Ok(Self::check(response).await?.bytes().await?.to_vec())
    }

    /// DELETE, ignoring any response body
    pub async fn delete(&self, segments: &[&str]) -> Result<()> {
        let url = self.url(segments)?;
        debug!("DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::RequestFailed {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
