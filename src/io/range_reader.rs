use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;

/// Trait for reading byte ranges from a remote resource.
///
/// This abstraction lets the block walk run without the whole slide file
/// present: each block descriptor fetches only its own byte range before
/// reading any field from it. Implementations must be thread-safe.
///
/// Timeouts and retries belong to the implementation; a failed fetch
/// surfaces as a [`FetchError`] and aborts the walk.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: u64) -> Result<Bytes, FetchError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging).
    fn identifier(&self) -> &str;
}
