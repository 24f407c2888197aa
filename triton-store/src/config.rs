use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use triton_common::{StoreError, StoreResult};

use crate::backend::triton::TritonOptions;
use crate::digest::HashType;

pub const DEFAULT_UPLOAD_BUFFER_SIZE: usize = 25_000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_HASH_TYPE: &str = "SHA0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Triton,
    /// Single-shot PUT under `/raw/{locator}`.
    Raw,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub store_url: String,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_hash_type")]
    pub hash_type: String,
    #[serde(default = "default_upload_buffer_size")]
    pub upload_buffer_size: usize,
    #[serde(default)]
    pub resumable_upload: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Stage incoming blobs as files here instead of in memory.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_hash_type() -> String {
    DEFAULT_HASH_TYPE.to_string()
}

fn default_upload_buffer_size() -> usize {
    DEFAULT_UPLOAD_BUFFER_SIZE
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl StoreConfig {
    pub fn new(store_url: impl Into<String>) -> Self {
        Self {
            store_url: store_url.into(),
            backend: BackendKind::default(),
            hash_type: default_hash_type(),
            upload_buffer_size: DEFAULT_UPLOAD_BUFFER_SIZE,
            resumable_upload: false,
            request_timeout_secs: default_request_timeout_secs(),
            staging_dir: None,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: StoreConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Read settings from `TRITON_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from a key-value source using the `TRITON_*` names.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_url = lookup("TRITON_STORE_URL")
            .ok_or_else(|| anyhow::anyhow!("TRITON_STORE_URL must be set"))?;
        let mut config = Self::new(store_url);

        if let Some(backend) = lookup("TRITON_BACKEND") {
            config.backend = match backend.to_ascii_lowercase().as_str() {
                "triton" => BackendKind::Triton,
                "raw" => BackendKind::Raw,
                other => anyhow::bail!("Unknown backend type: {}", other),
            };
        }
        if let Some(hash_type) = lookup("TRITON_HASH_TYPE") {
            config.hash_type = hash_type;
        }
        if let Some(size) = lookup("TRITON_UPLOAD_BUFFER_SIZE") {
            config.upload_buffer_size = size
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid TRITON_UPLOAD_BUFFER_SIZE {}: {}", size, e))?;
        }
        if let Some(flag) = lookup("TRITON_RESUMABLE_UPLOAD") {
            config.resumable_upload = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(dir) = lookup("TRITON_STAGING_DIR") {
            config.staging_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.store_url.trim().is_empty() {
            anyhow::bail!("store_url must not be empty");
        }
        reqwest::Url::parse(self.store_url.trim())
            .map_err(|e| anyhow::anyhow!("store_url is not a valid URL: {}", e))?;
        self.hash_type()?;
        if self.upload_buffer_size == 0 {
            anyhow::bail!("upload_buffer_size must be positive");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn hash_type(&self) -> StoreResult<HashType> {
        self.hash_type.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn triton_options(&self) -> TritonOptions {
        TritonOptions {
            resumable_upload: self.resumable_upload,
            upload_buffer_size: self.upload_buffer_size,
        }
    }
}

/// HTTP client for talking to blob stores. Redirects are surfaced to the
/// caller rather than followed.
pub fn http_client(timeout: Duration) -> StoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(StoreError::from)
}
