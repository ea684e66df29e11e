//! Value types returned by object store operations.

use bytes::Bytes;

/// Content type used when a store has no recorded type for an object.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata returned by an existence probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Size of the stored body in bytes.
    pub size: u64,

    /// Content type recorded at write time, if the store keeps one.
    pub content_type: Option<String>,
}

/// A fully read object.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use nixcache_storage::StoredObject;
///
/// let obj = StoredObject::new(Bytes::from_static(b"nar"), Some("application/x-nix-nar".into()));
/// assert_eq!(obj.size, 3);
/// assert_eq!(obj.content_type_or_default(), "application/x-nix-nar");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// The object body.
    pub body: Bytes,

    /// Content type recorded at write time, if any.
    pub content_type: Option<String>,

    /// Size of the body in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Creates a stored object, deriving `size` from the body.
    pub fn new(body: Bytes, content_type: Option<String>) -> Self {
        let size = body.len() as u64;
        Self { body, content_type, size }
    }

    /// Returns the recorded content type, or [`DEFAULT_CONTENT_TYPE`].
    #[must_use]
    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Metadata view of this object.
    #[must_use]
    pub fn meta(&self) -> ObjectMeta {
        ObjectMeta { size: self.size, content_type: self.content_type.clone() }
    }
}
