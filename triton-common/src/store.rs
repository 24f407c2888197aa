use bytes::Bytes;

use crate::blob::{BlobStream, LocalBlob, Locator, StagedBlob};
use crate::error::{StoreError, StoreResult};

/// Hooks implemented by every external blob store.
///
/// The backend is responsible only for deriving locators and moving bytes:
/// writing a staged blob under its locator, streaming it back, and deleting
/// it. Retry policy and any locator caching live with the caller.
#[async_trait::async_trait]
pub trait ExternalStore: Send + Sync {
    /// Locator for a staged blob. Reuses a precomputed locator when present,
    /// otherwise reads the whole blob once.
    async fn get_locator(&self, staged: &StagedBlob) -> StoreResult<Locator>;

    /// Write `blob` to the backend under `locator`. `size` must be known up front.
    async fn write_stream_to_store(
        &self,
        blob: &LocalBlob,
        size: u64,
        locator: &Locator,
    ) -> StoreResult<()>;

    /// Open a streaming handle over the stored object.
    async fn read_stream_from_store(&self, locator: &Locator) -> StoreResult<BlobStream>;

    /// Remove the stored object.
    async fn delete_from_store(&self, locator: &Locator) -> StoreResult<()>;

    /// Commit a staged blob and return the locator it was stored under.
    async fn store_blob(&self, staged: &StagedBlob) -> StoreResult<Locator> {
        let locator = self.get_locator(staged).await?;
        self.write_stream_to_store(&staged.blob, staged.size(), &locator)
            .await?;
        Ok(locator)
    }

    /// Fetch a whole object into memory.
    async fn read_from_store(&self, locator: &Locator) -> StoreResult<Bytes> {
        self.read_stream_from_store(locator).await?.bytes().await
    }
}

/// Reject writes whose length is not known up front.
pub fn require_size(size: u64) -> StoreResult<()> {
    if size == 0 {
        return Err(StoreError::SizeRequired);
    }
    Ok(())
}
