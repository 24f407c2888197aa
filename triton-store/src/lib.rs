//! Client for the Triton content-addressed blob store.
//!
//! Incoming objects are received through an [`UploadSession`], which digests
//! every chunk as it is staged locally and, when resumable uploads are
//! enabled, streams it to the backend. The resulting locator travels with
//! the staged blob so committing it never re-reads the data.

pub mod backend;
pub mod config;
pub mod digest;
pub mod session;
pub mod sink;
pub mod upload;

pub use backend::simple::SimpleHttpStore;
pub use backend::triton::{TritonOptions, TritonStoreManager};
pub use config::{BackendKind, StoreConfig};
pub use digest::{Digester, HashType};
pub use upload::{UploadResult, UploadSession};
