//! # Capture Sessions
//!
//! Multi-part captures are not written out immediately. The composed image
//! and its split metadata are parked in a session so the boundaries can be
//! edited and the parts exported later, possibly more than once, until the
//! session expires.
//!
//! Persistence goes through two small capabilities: a JSON key-value store
//! for metadata and a blob store for the encoded image. Memory backends serve
//! tests and one-shot runs; the filesystem backends keep sessions across CLI
//! invocations.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CaptureResult;

pub mod backends;
pub mod store;

pub use backends::{FsBlobStore, FsKvStore, MemoryBlobStore, MemoryKvStore};
pub use store::{
    CROP_BOUNDS_KEY, CaptureSession, Clock, CropEdge, ManualClock, SESSION_KEY_PREFIX,
    SESSION_TTL, SessionDraft, SessionStore, SystemClock,
};

/// JSON metadata storage.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: Value) -> CaptureResult<()>;
    async fn get(&self, key: &str) -> CaptureResult<Option<Value>>;
    async fn delete(&self, key: &str) -> CaptureResult<()>;
    /// All keys starting with `prefix`, in no particular order.
    async fn keys(&self, prefix: &str) -> CaptureResult<Vec<String>>;
}

/// Opaque byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> CaptureResult<()>;
    async fn get(&self, key: &str) -> CaptureResult<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> CaptureResult<()>;
}
