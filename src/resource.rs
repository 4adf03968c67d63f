//! Blob resource registry.
//!
//! Watermarked images are encoded to bytes and registered here under a
//! generated `blob:` identifier, which is then written back as the image
//! element's source. This is the object-URL analog for an in-process
//! document: identifiers stay valid until revoked or the store is dropped.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Scheme prefix of identifiers minted by the store.
pub const BLOB_SCHEME: &str = "blob:";

/// Process-wide registry of `blob:` identifiers to immutable byte payloads.
#[derive(Clone, Default)]
pub struct ResourceStore {
    inner: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("entries", &self.inner.read().len())
            .finish()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload and mint a `blob:` identifier for it.
    pub fn create(&self, data: Vec<u8>) -> String {
        let id = format!("{}{}", BLOB_SCHEME, Uuid::new_v4());
        self.inner.write().insert(id.clone(), Bytes::from(data));
        id
    }

    /// Look up the payload behind an identifier.
    pub fn get(&self, id: &str) -> Option<Bytes> {
        self.inner.read().get(id).cloned()
    }

    /// Drop an identifier and its payload. Returns whether it existed.
    pub fn revoke(&self, id: &str) -> bool {
        self.inner.write().remove(id).is_some()
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
