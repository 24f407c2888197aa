//! Local staging of incoming blobs.
//!
//! A [`LocalSink`] receives the bytes of one incoming object and finalizes
//! into an immutable [`LocalBlob`]. Two sinks are provided: an in-memory
//! buffer and a staged file that is written to `{dir}/{uuid}.tmp`, fsynced
//! and renamed to `{dir}/{uuid}` on completion.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::StoreResult;

/// Content-derived key of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Immutable local copy of an object's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalBlob {
    Memory(Bytes),
    File { path: PathBuf, size: u64 },
}

impl LocalBlob {
    pub fn size(&self) -> u64 {
        match self {
            LocalBlob::Memory(data) => data.len() as u64,
            LocalBlob::File { size, .. } => *size,
        }
    }

    /// Open a fresh reader positioned at the first byte.
    pub async fn reader(&self) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        match self {
            LocalBlob::Memory(data) => Ok(Box::new(io::Cursor::new(data.clone()))),
            LocalBlob::File { path, .. } => Ok(Box::new(tokio::fs::File::open(path).await?)),
        }
    }

    pub async fn read_all(&self) -> io::Result<Bytes> {
        match self {
            LocalBlob::Memory(data) => Ok(data.clone()),
            LocalBlob::File { path, .. } => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }

    /// Remove the backing file, if any.
    pub async fn discard(self) -> io::Result<()> {
        if let LocalBlob::File { path, .. } = self {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Discarded staged blob"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// A local blob ready to be committed, optionally with its locator already
/// computed by an upload session.
#[derive(Debug, Clone)]
pub struct StagedBlob {
    pub blob: LocalBlob,
    pub locator: Option<Locator>,
}

impl StagedBlob {
    pub fn new(blob: LocalBlob) -> Self {
        Self { blob, locator: None }
    }

    pub fn with_locator(blob: LocalBlob, locator: Locator) -> Self {
        Self {
            blob,
            locator: Some(locator),
        }
    }

    pub fn size(&self) -> u64 {
        self.blob.size()
    }
}

/// Destination for the bytes of one incoming object.
#[async_trait]
pub trait LocalSink: Send {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Bytes accepted so far.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn finish(self: Box<Self>) -> io::Result<LocalBlob>;
}

#[derive(Debug, Default)]
pub struct MemorySink {
    buf: BytesMut,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalSink for MemorySink {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    async fn finish(self: Box<Self>) -> io::Result<LocalBlob> {
        Ok(LocalBlob::Memory(self.buf.freeze()))
    }
}

pub struct FileSink {
    tmp_path: PathBuf,
    final_path: PathBuf,
    file: tokio::fs::File,
    written: u64,
}

impl FileSink {
    /// Create a new staging file under `dir`, creating the directory if needed.
    pub async fn create(dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let name = uuid::Uuid::new_v4().to_string();
        let final_path = dir.join(&name);
        let tmp_path = final_path.with_extension("tmp");
        let file = tokio::fs::File::create(&tmp_path).await?;
        Ok(Self {
            tmp_path,
            final_path,
            file,
            written: 0,
        })
    }
}

#[async_trait]
impl LocalSink for FileSink {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf).await?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.written
    }

    async fn finish(self: Box<Self>) -> io::Result<LocalBlob> {
        let mut this = *self;
        this.file.flush().await?;
        this.file.sync_all().await?;
        drop(this.file);
        tokio::fs::rename(&this.tmp_path, &this.final_path).await?;
        debug!(path = %this.final_path.display(), size = this.written, "Staged blob complete");
        Ok(LocalBlob::File {
            path: this.final_path,
            size: this.written,
        })
    }
}

/// Live handle over a fetched object's body.
///
/// Dropping the handle releases the underlying connection.
pub struct BlobStream {
    locator: Locator,
    response: reqwest::Response,
}

impl BlobStream {
    pub fn new(locator: Locator, response: reqwest::Response) -> Self {
        Self { locator, response }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Next chunk of the body, or `None` at the end.
    pub async fn chunk(&mut self) -> StoreResult<Option<Bytes>> {
        Ok(self.response.chunk().await?)
    }

    pub async fn bytes(self) -> StoreResult<Bytes> {
        Ok(self.response.bytes().await?)
    }

    /// Stream the remaining body into `out`, returning the number of bytes copied.
    pub async fn copy_to<W: AsyncWrite + Unpin>(&mut self, out: &mut W) -> StoreResult<u64> {
        let mut copied = 0u64;
        while let Some(chunk) = self.chunk().await? {
            out.write_all(&chunk).await?;
            copied += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(copied)
    }
}
