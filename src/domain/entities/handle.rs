//! Process-local handles to materialized image content.

use bytes::Bytes;

/// Scheme prefix of every handle minted by this process.
pub const HANDLE_SCHEME: &str = "blob:covercache/";

/// Opaque, revocable reference to locally materialized content.
///
/// A handle is only meaningful inside the process that created it and is
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalHandle(String);

impl LocalHandle {
    /// Mints a fresh, unique handle.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{HANDLE_SCHEME}{}", uuid::Uuid::new_v4()))
    }

    /// Returns the handle as a string usable by a display surface.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the string looks like a handle minted here.
    #[must_use]
    pub fn is_local(s: &str) -> bool {
        s.starts_with(HANDLE_SCHEME)
    }
}

impl std::fmt::Display for LocalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for LocalHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content backing a live handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedImage {
    /// Raw image bytes.
    pub bytes: Bytes,
    /// MIME type detected from the content (e.g. "image/jpeg").
    pub content_type: &'static str,
}

impl MaterializedImage {
    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
