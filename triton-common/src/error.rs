/// Errors raised by blob-store clients.
///
/// Status-carrying variants are protocol failures: the backend answered, but
/// not with the expected status. Transport failures surface as `Http` or `Io`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("content length is required for upload")]
    SizeRequired,
    #[error("append failed: HTTP {status} - {body}")]
    AppendFailed { status: u16, body: String },
    #[error("store failed: HTTP {status} - {body}")]
    StoreFailed { status: u16, body: String },
    #[error("fetch failed: HTTP {status} - {body}")]
    FetchFailed { status: u16, body: String },
    #[error("delete failed: HTTP {status} - {body}")]
    DeleteFailed { status: u16, body: String },
    #[error("remote size unavailable: {reason}")]
    RemoteSizeUnavailable { status: Option<u16>, reason: String },
    #[error("upload sink already failed; start a new session")]
    SinkFailed,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// HTTP status carried by a protocol failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::AppendFailed { status, .. }
            | StoreError::StoreFailed { status, .. }
            | StoreError::FetchFailed { status, .. }
            | StoreError::DeleteFailed { status, .. } => Some(*status),
            StoreError::RemoteSizeUnavailable { status, .. } => *status,
            _ => None,
        }
    }

    /// Remote size failure that did not come from a backend response.
    pub fn remote_size(reason: impl Into<String>) -> Self {
        StoreError::RemoteSizeUnavailable {
            status: None,
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
