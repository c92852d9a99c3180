//! Lifecycle of local handles: materialize, create, resolve, revoke.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::{LocalHandle, MaterializedImage};
use crate::domain::ports::{CacheError, CacheResult};

/// Turns a fetched or stored body into displayable content.
///
/// The body must be non-empty and carry the signature of a known image
/// format.
///
/// # Errors
/// Returns [`CacheError::MaterializationFailure`] otherwise.
pub fn materialize(url: &str, bytes: Bytes) -> CacheResult<MaterializedImage> {
    if bytes.is_empty() {
        return Err(CacheError::materialization(url, "empty body"));
    }
    let format = image::guess_format(&bytes).map_err(|e| {
        CacheError::materialization(url, format!("unrecognized image data: {e}"))
    })?;
    Ok(MaterializedImage {
        bytes,
        content_type: format.to_mime_type(),
    })
}

/// Table of live handles and the content behind them.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    live: RwLock<HashMap<LocalHandle, MaterializedImage>>,
}

impl HandleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a handle backed by `image`.
    pub fn create(&self, image: MaterializedImage) -> LocalHandle {
        let handle = LocalHandle::generate();
        debug!(
            handle = %handle,
            content_type = image.content_type,
            size = image.len(),
            "Created local handle"
        );
        self.live.write().insert(handle.clone(), image);
        handle
    }

    /// Mints a handle that is revoked when the returned guard goes away.
    #[must_use]
    pub fn scoped(self: &Arc<Self>, image: MaterializedImage) -> ScopedHandle {
        let handle = self.create(image);
        ScopedHandle {
            registry: Arc::clone(self),
            handle,
            released: false,
        }
    }

    /// Returns the content behind a live handle.
    pub fn resolve(&self, handle: &LocalHandle) -> Option<MaterializedImage> {
        self.live.read().get(handle).cloned()
    }

    /// Releases the content behind `handle`.
    ///
    /// Returns false if the handle was not live.
    pub fn revoke(&self, handle: &LocalHandle) -> bool {
        if self.live.write().remove(handle).is_some() {
            debug!(handle = %handle, "Revoked local handle");
            true
        } else {
            trace!(handle = %handle, "Handle already revoked");
            false
        }
    }

    /// Returns true while `handle` can still be resolved.
    pub fn is_live(&self, handle: &LocalHandle) -> bool {
        self.live.read().contains_key(handle)
    }

    /// Returns the number of live handles.
    pub fn live_count(&self) -> usize {
        self.live.read().len()
    }
}

/// A privately owned handle, revoked exactly once on every exit path.
///
/// Never installed into the shared memory tier, so revoking it can not
/// invalidate a handle another consumer is displaying.
pub struct ScopedHandle {
    registry: Arc<HandleRegistry>,
    handle: LocalHandle,
    released: bool,
}

impl ScopedHandle {
    /// Returns the guarded handle.
    #[must_use]
    pub const fn handle(&self) -> &LocalHandle {
        &self.handle
    }

    /// Returns the handle as a display string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.handle.as_str()
    }

    /// Revokes the handle now instead of at drop.
    pub fn release(mut self) {
        self.revoke_once();
    }

    fn revoke_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.revoke(&self.handle);
        }
    }
}

impl Drop for ScopedHandle {
    fn drop(&mut self) {
        self.revoke_once();
    }
}

impl std::fmt::Debug for ScopedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
