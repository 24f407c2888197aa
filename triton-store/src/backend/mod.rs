pub mod simple;
pub mod triton;

use reqwest::Body;
use tokio_util::io::ReaderStream;
use triton_common::{ExternalStore, LocalBlob, StoreResult};

use crate::config::{BackendKind, StoreConfig};

use self::simple::SimpleHttpStore;
use self::triton::TritonStoreManager;

/// Request body for a staged blob. File blobs are streamed from disk.
pub(crate) async fn request_body(blob: &LocalBlob) -> StoreResult<Body> {
    match blob {
        LocalBlob::Memory(data) => Ok(Body::from(data.clone())),
        LocalBlob::File { path, .. } => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Body::wrap_stream(ReaderStream::new(file)))
        }
    }
}

/// Construct the store named by the configuration.
pub fn from_config(config: &StoreConfig) -> StoreResult<Box<dyn ExternalStore>> {
    match config.backend {
        BackendKind::Triton => Ok(Box::new(TritonStoreManager::startup(config)?)),
        BackendKind::Raw => Ok(Box::new(SimpleHttpStore::startup(config)?)),
    }
}
