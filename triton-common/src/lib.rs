//! Types shared between blob-store backends: the store hooks, local blob
//! staging, locators and the error taxonomy.

pub mod blob;
pub mod error;
pub mod headers;
pub mod store;

pub use blob::{BlobStream, FileSink, LocalBlob, LocalSink, Locator, MemorySink, StagedBlob};
pub use error::{StoreError, StoreResult};
pub use store::ExternalStore;
