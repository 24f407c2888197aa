//! Plain HTTP blob store.
//!
//! Stores each object with a single PUT under `/raw/{locator}`. There are
//! no upload sessions; locators are always digested from the staged blob.
//! The raw endpoint has no delete, so deletes succeed without a request.

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info};

use triton_common::store::require_size;
use triton_common::{BlobStream, ExternalStore, LocalBlob, Locator, StagedBlob, StoreError, StoreResult};

use crate::backend::request_body;
use crate::backend::triton::parse_base_url;
use crate::config::{http_client, StoreConfig};
use crate::digest::{locator_for_blob, HashType};

pub struct SimpleHttpStore {
    client: Client,
    base_url: Url,
    hash_type: HashType,
}

impl SimpleHttpStore {
    pub fn new(base_url: &str, hash_type: HashType) -> StoreResult<Self> {
        let client = http_client(crate::config::DEFAULT_REQUEST_TIMEOUT)?;
        Self::with_client(client, base_url, hash_type)
    }

    pub fn with_client(client: Client, base_url: &str, hash_type: HashType) -> StoreResult<Self> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            hash_type,
        })
    }

    pub fn startup(config: &StoreConfig) -> StoreResult<Self> {
        let hash_type = config.hash_type()?;
        let client = http_client(config.request_timeout())?;
        let store = Self::with_client(client, &config.store_url, hash_type)?;
        info!(url = %store.base_url, hash_type = %hash_type, "Simple HTTP store started");
        Ok(store)
    }

    fn raw_url(&self, locator: &Locator) -> StoreResult<Url> {
        let url = format!(
            "{}/raw/{}",
            self.base_url.as_str().trim_end_matches('/'),
            urlencoding::encode(locator.as_str())
        );
        Url::parse(&url).map_err(|e| StoreError::Config(format!("invalid URL {}: {}", url, e)))
    }
}

#[async_trait]
impl ExternalStore for SimpleHttpStore {
    async fn get_locator(&self, staged: &StagedBlob) -> StoreResult<Locator> {
        if let Some(locator) = &staged.locator {
            return Ok(locator.clone());
        }
        Ok(locator_for_blob(self.hash_type, &staged.blob).await?)
    }

    async fn write_stream_to_store(
        &self,
        blob: &LocalBlob,
        size: u64,
        locator: &Locator,
    ) -> StoreResult<()> {
        require_size(size)?;
        let body = request_body(blob).await?;

        let resp = self
            .client
            .put(self.raw_url(locator)?)
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT
        ) {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::StoreFailed {
                status: status.as_u16(),
                body,
            });
        }
        resp.bytes().await?;

        debug!(locator = %locator, size, "Raw store complete");
        Ok(())
    }

    async fn read_stream_from_store(&self, locator: &Locator) -> StoreResult<BlobStream> {
        let resp = self.client.get(self.raw_url(locator)?).send().await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::FetchFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(BlobStream::new(locator.clone(), resp))
    }

    async fn delete_from_store(&self, locator: &Locator) -> StoreResult<()> {
        debug!(locator = %locator, "Raw store has no delete; treating as done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_url() {
        let store = SimpleHttpStore::new("http://blobs.local/base/", HashType::Sha256).unwrap();
        assert_eq!(
            store.raw_url(&Locator::new("abc")).unwrap().as_str(),
            "http://blobs.local/base/raw/abc"
        );
    }

    #[tokio::test]
    async fn test_delete_never_contacts_backend() {
        let store = SimpleHttpStore::new("http://127.0.0.1:9", HashType::Sha0).unwrap();
        store.delete_from_store(&Locator::new("missing")).await.unwrap();
    }
}
