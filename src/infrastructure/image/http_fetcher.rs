//! HTTP adapter for the image fetcher port.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::ports::{CacheError, CacheResult, ImageFetcher};

/// Downloads image bodies over HTTP(S) with a bounded number of concurrent
/// requests.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    permits: Semaphore,
}

impl std::fmt::Debug for HttpImageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpImageFetcher")
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl HttpImageFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        max_concurrent_downloads: usize,
        timeout: Duration,
        user_agent: &str,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            permits: Semaphore::new(max_concurrent_downloads.max(1)),
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> CacheResult<Bytes> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CacheError::fetch(url, format!("Download slots closed: {e}")))?;

        debug!(url = %url, "Downloading image from network");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::fetch(url, format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CacheError::fetch(
                url,
                format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    response.status().canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|e| CacheError::fetch(url, format!("Failed to read body: {e}")))
    }
}
