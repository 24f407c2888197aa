//! Content digests and locator derivation.
//!
//! A locator is the lowercase hex digest of an object's bytes under the
//! store's configured [`HashType`]. The digest must be fed exactly the bytes
//! that reach the local sink, in the same order.

mod sha0;

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use triton_common::{LocalBlob, Locator, StoreError};

pub use self::sha0::Sha0;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Sha256,
    /// Legacy algorithm, kept for backends that were never migrated.
    Sha0,
}

impl HashType {
    /// Value sent in the `X-Hash-Type` header.
    pub fn wire_name(&self) -> &'static str {
        match self {
            HashType::Sha256 => "SHA256",
            HashType::Sha0 => "SHA0",
        }
    }

    /// Length of a locator in hex characters.
    pub fn locator_len(&self) -> usize {
        match self {
            HashType::Sha256 => 64,
            HashType::Sha0 => 40,
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for HashType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA256" | "SHA-256" => Ok(HashType::Sha256),
            "SHA0" | "SHA-0" => Ok(HashType::Sha0),
            _ => Err(StoreError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Incremental digest over one object. Consumed by [`Digester::finalize_locator`].
#[derive(Clone)]
pub struct Digester {
    inner: Inner,
    bytes: u64,
}

#[derive(Clone)]
enum Inner {
    Sha256(Sha256),
    Sha0(Sha0),
}

impl Digester {
    pub fn new(hash_type: HashType) -> Self {
        let inner = match hash_type {
            HashType::Sha256 => Inner::Sha256(Sha256::new()),
            HashType::Sha0 => Inner::Sha0(Sha0::new()),
        };
        Self { inner, bytes: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha256(h) => h.update(data),
            Inner::Sha0(h) => h.update(data),
        }
        self.bytes += data.len() as u64;
    }

    /// Number of bytes digested so far.
    pub fn bytes_digested(&self) -> u64 {
        self.bytes
    }

    pub fn finalize_locator(self) -> Locator {
        let digest = match self.inner {
            Inner::Sha256(h) => hex::encode(h.finalize()),
            Inner::Sha0(h) => hex::encode(h.finalize()),
        };
        Locator::new(digest)
    }
}

pub fn locator_of(hash_type: HashType, data: &[u8]) -> Locator {
    let mut digester = Digester::new(hash_type);
    digester.update(data);
    digester.finalize_locator()
}

/// Compute the locator of a local blob with one full read.
pub async fn locator_for_blob(hash_type: HashType, blob: &LocalBlob) -> std::io::Result<Locator> {
    if let LocalBlob::Memory(data) = blob {
        return Ok(locator_of(hash_type, data));
    }

    let mut reader = blob.reader().await?;
    let mut digester = Digester::new(hash_type);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
    }
    Ok(digester.finalize_locator())
}
