//! Triton content-addressed blob store.
//!
//! Objects are keyed by the hex digest of their content. Uploads either go
//! through an [`UploadSession`], which digests (and optionally streams) the
//! bytes as they arrive, or are digested from the staged copy at commit time.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info};

use triton_common::headers::{HASH_TYPE, OBJECT_ID};
use triton_common::store::require_size;
use triton_common::{
    BlobStream, ExternalStore, LocalBlob, LocalSink, Locator, StagedBlob, StoreError, StoreResult,
};

use crate::backend::request_body;
use crate::config::{http_client, StoreConfig};
use crate::digest::{locator_for_blob, HashType};
use crate::upload::UploadSession;

/// Upload behaviour negotiated with the deployment.
#[derive(Debug, Clone)]
pub struct TritonOptions {
    /// Stream chunks to the backend while the object is still arriving.
    pub resumable_upload: bool,
    /// Bytes collected before a chunk is sent when streaming.
    pub upload_buffer_size: usize,
}

impl Default for TritonOptions {
    fn default() -> Self {
        Self {
            resumable_upload: false,
            upload_buffer_size: crate::config::DEFAULT_UPLOAD_BUFFER_SIZE,
        }
    }
}

/// Everything a request against the backend needs. Shared by the manager,
/// its sessions and their sinks.
pub(crate) struct TritonEndpoint {
    pub(crate) client: Client,
    pub(crate) base_url: Url,
    pub(crate) hash_type: HashType,
    pub(crate) resumable: bool,
    pub(crate) upload_buffer_size: usize,
}

impl TritonEndpoint {
    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Endpoint that opens a resumable upload.
    pub(crate) fn append_url(&self) -> StoreResult<Url> {
        parse_url(&format!("{}/blob", self.base()))
    }

    fn create_url(&self) -> StoreResult<Url> {
        parse_url(&format!("{}/blob/", self.base()))
    }

    fn object_url(&self, locator: &Locator) -> StoreResult<Url> {
        parse_url(&format!(
            "{}/blob/{}",
            self.base(),
            urlencoding::encode(locator.as_str())
        ))
    }
}

fn parse_url(url: &str) -> StoreResult<Url> {
    Url::parse(url).map_err(|e| StoreError::Config(format!("invalid URL {}: {}", url, e)))
}

pub(crate) fn parse_base_url(base_url: &str) -> StoreResult<Url> {
    if base_url.trim().is_empty() {
        return Err(StoreError::Config("store_url must not be empty".to_string()));
    }
    parse_url(base_url.trim())
}

pub struct TritonStoreManager {
    endpoint: Arc<TritonEndpoint>,
}

impl TritonStoreManager {
    /// Build a manager from explicit settings, with its own HTTP client.
    pub fn new(base_url: &str, hash_type: HashType, options: TritonOptions) -> StoreResult<Self> {
        let client = http_client(crate::config::DEFAULT_REQUEST_TIMEOUT)?;
        Self::with_client(client, base_url, hash_type, options)
    }

    /// Build a manager around an existing client. The client must not follow
    /// redirects: a 303 from the backend is part of the upload protocol.
    pub fn with_client(
        client: Client,
        base_url: &str,
        hash_type: HashType,
        options: TritonOptions,
    ) -> StoreResult<Self> {
        let base_url = parse_base_url(base_url)?;
        if options.resumable_upload && options.upload_buffer_size == 0 {
            return Err(StoreError::Config(
                "upload_buffer_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            endpoint: Arc::new(TritonEndpoint {
                client,
                base_url,
                hash_type,
                resumable: options.resumable_upload,
                upload_buffer_size: options.upload_buffer_size,
            }),
        })
    }

    /// Resolve the backend URL and hash algorithm from configuration.
    pub fn startup(config: &StoreConfig) -> StoreResult<Self> {
        let hash_type = config.hash_type()?;
        let client = http_client(config.request_timeout())?;
        let manager = Self::with_client(client, &config.store_url, hash_type, config.triton_options())?;
        info!(
            url = %manager.endpoint.base_url,
            hash_type = %hash_type,
            resumable = manager.endpoint.resumable,
            "Triton store manager started"
        );
        Ok(manager)
    }

    pub fn hash_type(&self) -> HashType {
        self.endpoint.hash_type
    }

    pub fn base_url(&self) -> &Url {
        &self.endpoint.base_url
    }

    pub fn resumable_upload(&self) -> bool {
        self.endpoint.resumable
    }

    /// Start receiving a new object into `local`.
    pub fn upload_session(&self, local: Box<dyn LocalSink>) -> UploadSession {
        UploadSession::new(self.endpoint.clone(), local)
    }
}

#[async_trait]
impl ExternalStore for TritonStoreManager {
    async fn get_locator(&self, staged: &StagedBlob) -> StoreResult<Locator> {
        if let Some(locator) = &staged.locator {
            return Ok(locator.clone());
        }
        debug!(size = staged.size(), "No precomputed locator, digesting staged blob");
        Ok(locator_for_blob(self.endpoint.hash_type, &staged.blob).await?)
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
            .endpoint
            .client
            .post(self.endpoint.create_url()?)
            .header(CONTENT_LENGTH, size)
            .header(OBJECT_ID, locator.as_str())
            .header(HASH_TYPE, self.endpoint.hash_type.wire_name())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::CREATED {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::StoreFailed {
                status: status.as_u16(),
                body,
            });
        }
        resp.bytes().await?;

        debug!(locator = %locator, size, "Triton store complete");
        Ok(())
    }

    async fn read_stream_from_store(&self, locator: &Locator) -> StoreResult<BlobStream> {
        let resp = self
            .endpoint
            .client
            .get(self.endpoint.object_url(locator)?)
            .header(HASH_TYPE, self.endpoint.hash_type.wire_name())
            .send()
            .await?;

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
        let resp = self
            .endpoint
            .client
            .delete(self.endpoint.object_url(locator)?)
            .header(HASH_TYPE, self.endpoint.hash_type.wire_name())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status != StatusCode::OK {
            return Err(StoreError::DeleteFailed {
                status: status.as_u16(),
                body,
            });
        }

        debug!(locator = %locator, "Triton delete complete");
        Ok(())
    }
}
