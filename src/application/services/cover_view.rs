//! Display slot for a single cover image.

use tracing::{debug, warn};

use crate::domain::entities::LocalHandle;
use crate::infrastructure::image::{ImageCache, ScopedHandle};

/// How a [`CoverView`] obtains its handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoverMode {
    /// Display the cache's shared handle. The view never revokes it.
    #[default]
    Shared,
    /// Acquire a private handle over the same content, released when the
    /// view moves on or unmounts.
    Private,
}

/// What the view currently renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverDisplay {
    /// Nothing resolved yet.
    Placeholder,
    /// A live local handle.
    Ready(LocalHandle),
    /// Resolution failed; the raw remote URL is shown instead.
    Fallback(String),
}

/// A UI element showing one cover image through an [`ImageCache`].
///
/// Owns only what it creates itself: in [`CoverMode::Private`] the scoped
/// handle, in [`CoverMode::Shared`] nothing.
#[derive(Debug)]
pub struct CoverView {
    cache: ImageCache,
    mode: CoverMode,
    url: Option<String>,
    display: CoverDisplay,
    private: Option<ScopedHandle>,
}

impl CoverView {
    /// Creates an empty view.
    #[must_use]
    pub const fn new(cache: ImageCache, mode: CoverMode) -> Self {
        Self {
            cache,
            mode,
            url: None,
            display: CoverDisplay::Placeholder,
            private: None,
        }
    }

    /// Points the view at `url` and resolves it.
    pub async fn show(&mut self, url: &str) -> &CoverDisplay {
        self.release_private();
        self.url = Some(url.to_string());
        self.display = CoverDisplay::Placeholder;

        let resolved = match self.mode {
            CoverMode::Shared => match self.cache.get_cached_image_url(url) {
                Some(handle) => Ok(handle),
                None => self.cache.preload_image(url).await,
            },
            CoverMode::Private => self.cache.checkout(url).await.map(|scoped| {
                let handle = scoped.handle().clone();
                self.private = Some(scoped);
                handle
            }),
        };

        self.display = match resolved {
            Ok(handle) => {
                debug!(url = %url, handle = %handle, mode = ?self.mode, "Cover ready");
                CoverDisplay::Ready(handle)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Cover failed to load, showing remote URL");
                CoverDisplay::Fallback(url.to_string())
            }
        };
        &self.display
    }

    /// Returns the current display state.
    #[must_use]
    pub const fn display(&self) -> &CoverDisplay {
        &self.display
    }

    /// Returns the string to render, if any.
    #[must_use]
    pub fn src(&self) -> Option<&str> {
        match &self.display {
            CoverDisplay::Placeholder => None,
            CoverDisplay::Ready(handle) => Some(handle.as_str()),
            CoverDisplay::Fallback(url) => Some(url),
        }
    }

    /// Returns the URL last passed to [`CoverView::show`].
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns how the view obtains handles.
    #[must_use]
    pub const fn mode(&self) -> CoverMode {
        self.mode
    }

    /// Tears the view down, releasing its private handle if it has one.
    pub fn unmount(mut self) {
        self.release_private();
    }

    fn release_private(&mut self) {
        if let Some(scoped) = self.private.take() {
            scoped.release();
        }
    }
}
