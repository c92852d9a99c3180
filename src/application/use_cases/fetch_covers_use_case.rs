//! Batch cover resolution use case.

use futures_util::future::join_all;
use tracing::{debug, info};

use crate::domain::entities::{ImageSource, LocalHandle};
use crate::domain::ports::CacheError;
use crate::infrastructure::image::ImageCache;

/// A resolved cover, ready to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverReport {
    /// Shared handle for the cover.
    pub handle: LocalHandle,
    /// Detected MIME type.
    pub content_type: &'static str,
    /// Content size in bytes.
    pub size: usize,
    /// Tier that satisfied the request.
    pub source: ImageSource,
}

/// Result of resolving one URL.
#[derive(Debug, Clone)]
pub struct CoverOutcome {
    /// Requested URL.
    pub url: String,
    /// Resolved cover or the reason it failed.
    pub result: Result<CoverReport, CacheError>,
}

impl CoverOutcome {
    /// Returns what a consumer should render: the handle on success, the
    /// raw remote URL on failure.
    #[must_use]
    pub fn src(&self) -> &str {
        match &self.result {
            Ok(report) => report.handle.as_str(),
            Err(_) => &self.url,
        }
    }
}

/// Resolves many cover URLs concurrently through one cache.
pub struct FetchCoversUseCase {
    cache: ImageCache,
}

impl FetchCoversUseCase {
    /// Creates new use case.
    #[must_use]
    pub const fn new(cache: ImageCache) -> Self {
        Self { cache }
    }

    /// Resolves every URL, preserving input order.
    ///
    /// Duplicate URLs share one resolution.
    pub async fn execute(&self, urls: &[String]) -> Vec<CoverOutcome> {
        debug!(count = urls.len(), "Resolving covers");
        let outcomes = join_all(urls.iter().map(|url| self.resolve(url))).await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            resolved = outcomes.len() - failed,
            failed = failed,
            "Cover batch finished"
        );
        outcomes
    }

    async fn resolve(&self, url: &str) -> CoverOutcome {
        let result = match self.cache.load(url).await {
            Ok(loaded) => self
                .cache
                .resolve_handle(&loaded.handle)
                .map(|image| CoverReport {
                    content_type: image.content_type,
                    size: image.len(),
                    handle: loaded.handle,
                    source: loaded.source,
                })
                .ok_or_else(|| CacheError::materialization(url, "handle was revoked")),
            Err(e) => Err(e),
        };
        CoverOutcome {
            url: url.to_string(),
            result,
        }
    }
}
