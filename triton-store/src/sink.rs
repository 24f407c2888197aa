//! Streaming upload sink.
//!
//! Every chunk is committed to the local sink and the digest together, and
//! only after the backend has accepted it when resumable streaming is on.
//! With resumable streaming, writes are collected until
//! `upload_buffer_size` bytes are pending and then POSTed as one chunk.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use triton_common::headers::{HASH_TYPE, SERVER_TOKEN};
use triton_common::{LocalSink, StoreError, StoreResult};

use crate::backend::triton::TritonEndpoint;
use crate::digest::Digester;
use crate::session::{SessionToken, UploadUrl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// No chunk has been accepted yet.
    NotStarted,
    Started,
    /// An append failed; the sink refuses all further use.
    Failed,
}

pub struct AppendingSink {
    endpoint: Arc<TritonEndpoint>,
    local: Box<dyn LocalSink>,
    digester: Digester,
    token: SessionToken,
    upload_url: UploadUrl,
    pending: BytesMut,
    state: SinkState,
}

impl AppendingSink {
    pub(crate) fn new(
        endpoint: Arc<TritonEndpoint>,
        local: Box<dyn LocalSink>,
        token: SessionToken,
        upload_url: UploadUrl,
    ) -> Self {
        let digester = Digester::new(endpoint.hash_type);
        Self {
            endpoint,
            local,
            digester,
            token,
            upload_url,
            pending: BytesMut::new(),
            state: SinkState::NotStarted,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Bytes committed to both the local sink and the digest.
    pub fn bytes_committed(&self) -> u64 {
        self.digester.bytes_digested()
    }

    /// Bytes buffered but not yet sent to the backend.
    pub fn bytes_pending(&self) -> usize {
        self.pending.len()
    }

    pub async fn write(&mut self, buf: &[u8]) -> StoreResult<()> {
        self.ensure_usable()?;
        if !self.endpoint.resumable {
            return self.commit(buf).await;
        }

        self.pending.extend_from_slice(buf);
        if self.pending.len() >= self.endpoint.upload_buffer_size {
            self.send_pending().await?;
        }
        Ok(())
    }

    /// Send any buffered bytes to the backend.
    pub async fn flush(&mut self) -> StoreResult<()> {
        self.ensure_usable()?;
        if self.endpoint.resumable && !self.pending.is_empty() {
            self.send_pending().await?;
        }
        Ok(())
    }

    /// Flush and hand back the local sink and digest for finalization.
    pub async fn close(mut self) -> StoreResult<(Box<dyn LocalSink>, Digester)> {
        self.flush().await?;
        debug!(
            bytes = self.bytes_committed(),
            upload_url = %self.upload_url,
            "Upload sink closed"
        );
        Ok((self.local, self.digester))
    }

    fn ensure_usable(&self) -> StoreResult<()> {
        if self.state == SinkState::Failed {
            return Err(StoreError::SinkFailed);
        }
        Ok(())
    }

    async fn send_pending(&mut self) -> StoreResult<()> {
        let chunk = self.pending.split().freeze();
        if let Err(e) = self.append_remote(&chunk).await {
            warn!(error = %e, len = chunk.len(), "Chunk append failed");
            self.state = SinkState::Failed;
            return Err(e);
        }
        self.commit(&chunk).await
    }

    async fn commit(&mut self, chunk: &[u8]) -> StoreResult<()> {
        if let Err(e) = self.local.write(chunk).await {
            self.state = SinkState::Failed;
            return Err(e.into());
        }
        self.digester.update(chunk);
        self.state = SinkState::Started;
        Ok(())
    }

    async fn append_remote(&self, chunk: &Bytes) -> StoreResult<()> {
        let target = match self.upload_url.get() {
            Some(url) => url,
            None => self.endpoint.append_url()?,
        };
        debug!(target = %target, len = chunk.len(), "Appending chunk");

        let resp = self
            .endpoint
            .client
            .post(target.clone())
            .header(CONTENT_LENGTH, chunk.len())
            .header(HASH_TYPE, self.endpoint.hash_type.wire_name())
            .header(SERVER_TOKEN, self.token.get())
            .body(chunk.clone())
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::SEE_OTHER && self.state == SinkState::NotStarted {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match location {
                Some(location) => {
                    let upload_url = resolve_location(&target, &location)?;
                    debug!(upload_url = %upload_url, "Upload session established");
                    self.upload_url.set(upload_url);
                }
                None => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(StoreError::AppendFailed {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        } else if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::AppendFailed {
                status: status.as_u16(),
                body,
            });
        }

        match resp.headers().get(SERVER_TOKEN).and_then(|v| v.to_str().ok()) {
            Some(token) => self.token.set(token),
            None => debug!("Append response carried no session token"),
        }

        // Drain the body so the connection goes back to the pool.
        resp.bytes().await?;
        Ok(())
    }
}

/// Resolve a `Location` against the URL of the request it answered.
fn resolve_location(request: &Url, location: &str) -> StoreResult<Url> {
    request.join(location).map_err(|e| StoreError::AppendFailed {
        status: StatusCode::SEE_OTHER.as_u16(),
        body: format!("invalid Location {}: {}", location, e),
    })
}
