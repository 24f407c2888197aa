//! Upload sessions: one per incoming object.
//!
//! A session owns the session token and upload URL, lazily creates its
//! [`AppendingSink`] on the first append, and on [`UploadSession::finish`]
//! yields an [`UploadResult`] carrying everything the commit step needs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::StatusCode;
use tracing::debug;

use triton_common::headers::SERVER_TOKEN;
use triton_common::{LocalBlob, LocalSink, Locator, MemorySink, StagedBlob, StoreError, StoreResult};

use crate::backend::triton::TritonEndpoint;
use crate::session::{SessionToken, UploadUrl};
use crate::sink::{AppendingSink, SinkState};

pub struct UploadSession {
    endpoint: Arc<TritonEndpoint>,
    local: Option<Box<dyn LocalSink>>,
    sink: Option<AppendingSink>,
    token: SessionToken,
    upload_url: UploadUrl,
    last_activity: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub(crate) fn new(endpoint: Arc<TritonEndpoint>, local: Box<dyn LocalSink>) -> Self {
        Self {
            endpoint,
            local: Some(local),
            sink: None,
            token: SessionToken::new(),
            upload_url: UploadUrl::new(),
            last_activity: None,
        }
    }

    pub fn session_token(&self) -> String {
        self.token.get()
    }

    pub fn upload_url(&self) -> Option<String> {
        self.upload_url.get().map(String::from)
    }

    /// When the sink was created; `None` before the first append.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    pub fn sink_state(&self) -> SinkState {
        self.sink
            .as_ref()
            .map(AppendingSink::state)
            .unwrap_or(SinkState::NotStarted)
    }

    /// Bytes committed locally (and, when streaming, accepted remotely).
    pub fn bytes_committed(&self) -> u64 {
        self.sink.as_ref().map(AppendingSink::bytes_committed).unwrap_or(0)
    }

    pub async fn append(&mut self, data: &[u8]) -> StoreResult<()> {
        self.sink_mut().write(data).await
    }

    /// Ask the backend how many bytes of this upload it holds.
    ///
    /// Only meaningful while streaming: flushes pending bytes and sends HEAD to the
    /// session's upload URL.
    pub async fn remote_size(&mut self) -> StoreResult<u64> {
        if !self.endpoint.resumable {
            return Err(StoreError::remote_size("resumable upload is disabled"));
        }
        self.sink_mut().flush().await?;

        let url = self
            .upload_url
            .get()
            .ok_or_else(|| StoreError::remote_size("no upload session established"))?;

        let resp = self
            .endpoint
            .client
            .head(url.clone())
            .header(SERVER_TOKEN, self.token.get())
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(StoreError::RemoteSizeUnavailable {
                status: Some(status.as_u16()),
                reason: format!("HEAD {} returned HTTP {}", url, status),
            });
        }
        let size = content_length(resp.headers())?;

        debug!(upload_url = %url, size, "Remote upload size");
        Ok(size)
    }

    /// Close the sink and finalize the digest and the local blob.
    pub async fn finish(mut self) -> StoreResult<UploadResult> {
        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => self.create_sink(),
        };
        let (local, digester) = sink.close().await?;
        let locator = digester.finalize_locator();
        let blob = local.finish().await?;

        debug!(locator = %locator, size = blob.size(), "Upload session finished");
        Ok(UploadResult {
            blob,
            locator,
            upload_url: self.upload_url.get().map(String::from),
            session_token: self.token.get(),
        })
    }

    fn sink_mut(&mut self) -> &mut AppendingSink {
        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => self.create_sink(),
        };
        self.sink.insert(sink)
    }

    fn create_sink(&mut self) -> AppendingSink {
        self.last_activity = Some(Utc::now());
        let local = self
            .local
            .take()
            .unwrap_or_else(|| Box::new(MemorySink::new()));
        AppendingSink::new(
            self.endpoint.clone(),
            local,
            self.token.clone(),
            self.upload_url.clone(),
        )
    }
}

/// Outcome of a finished upload session.
#[derive(Debug, Clone)]
pub struct UploadResult {
    blob: LocalBlob,
    locator: Locator,
    upload_url: Option<String>,
    session_token: String,
}

impl UploadResult {
    pub fn blob(&self) -> &LocalBlob {
        &self.blob
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn upload_url(&self) -> Option<&str> {
        self.upload_url.as_deref()
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Staged blob that carries the computed locator into the commit step.
    pub fn into_staged(self) -> StagedBlob {
        StagedBlob::with_locator(self.blob, self.locator)
    }
}

/// Size reported by a successful HEAD on the upload URL.
fn content_length(headers: &HeaderMap) -> StoreResult<u64> {
    let value = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| StoreError::RemoteSizeUnavailable {
            status: Some(StatusCode::OK.as_u16()),
            reason: "missing Content-Length".to_string(),
        })?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| StoreError::RemoteSizeUnavailable {
            status: Some(StatusCode::OK.as_u16()),
            reason: format!("invalid Content-Length {:?}", value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::triton::{TritonOptions, TritonStoreManager};
    use crate::digest::{locator_of, HashType};
    use bytes::Bytes;
    use reqwest::header::HeaderValue;

    // Nothing listens on port 9; with streaming off no request may be made.
    fn offline_manager(hash_type: HashType) -> TritonStoreManager {
        TritonStoreManager::new("http://127.0.0.1:9", hash_type, TritonOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_chunks_reach_digest_and_local_sink() {
        let manager = offline_manager(HashType::Sha256);
        let mut session = manager.upload_session(Box::new(MemorySink::new()));
        assert!(session.last_activity().is_none());

        let chunks: [&[u8]; 3] = [b"first,", b"second,", b"third"];
        for chunk in chunks {
            session.append(chunk).await.unwrap();
        }
        assert!(session.last_activity().is_some());
        assert_eq!(session.sink_state(), SinkState::Started);
        assert_eq!(session.bytes_committed(), 18);

        let result = session.finish().await.unwrap();
        let expected = chunks.concat();
        assert_eq!(result.locator(), &locator_of(HashType::Sha256, &expected));
        assert_eq!(result.blob().read_all().await.unwrap(), Bytes::from(expected));
        assert_eq!(result.upload_url(), None);
        assert_eq!(result.session_token(), "");
    }

    #[tokio::test]
    async fn test_empty_session() {
        let manager = offline_manager(HashType::Sha0);
        let session = manager.upload_session(Box::new(MemorySink::new()));
        let result = session.finish().await.unwrap();
        assert_eq!(result.blob().size(), 0);
        assert_eq!(result.locator(), &locator_of(HashType::Sha0, b""));
    }

    #[tokio::test]
    async fn test_into_staged_carries_locator() {
        let manager = offline_manager(HashType::Sha256);
        let mut session = manager.upload_session(Box::new(MemorySink::new()));
        session.append(b"payload").await.unwrap();
        let result = session.finish().await.unwrap();
        let locator = result.locator().clone();

        let staged = result.into_staged();
        assert_eq!(staged.locator, Some(locator));
        assert_eq!(staged.size(), 7);
    }

    #[tokio::test]
    async fn test_remote_size_requires_streaming() {
        let manager = offline_manager(HashType::Sha256);
        let mut session = manager.upload_session(Box::new(MemorySink::new()));
        let err = session.remote_size().await.unwrap_err();
        assert!(matches!(err, StoreError::RemoteSizeUnavailable { status: None, .. }));
    }

    #[test]
    fn test_content_length_parsing() {
        let mut headers = HeaderMap::new();
        let err = content_length(&headers).unwrap_err();
        assert!(
            matches!(err, StoreError::RemoteSizeUnavailable { status: Some(200), ref reason } if reason == "missing Content-Length")
        );

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("twelve"));
        let err = content_length(&headers).unwrap_err();
        assert!(
            matches!(err, StoreError::RemoteSizeUnavailable { ref reason, .. } if reason.starts_with("invalid Content-Length"))
        );

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("-1"));
        assert!(content_length(&headers).is_err());

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4096"));
        assert_eq!(content_length(&headers).unwrap(), 4096);
    }
}
