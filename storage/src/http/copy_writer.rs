use std::sync::Arc;

use storage_gax::retry::RetrySetting;

use crate::http::objects::rewrite::{self, RewriteObjectResponse};
use crate::http::objects::{BlobId, Object};
use crate::http::storage_client::execute;
use crate::http::transport::Transport;
use crate::http::{parse_json, Error};
use crate::option::Options;

/// A server-side copy in progress.
///
/// Large copies between locations or storage classes take several rewrite
/// calls. Each [`CopyWriter::copy_chunk`] runs one of them.
#[derive(Debug)]
pub struct CopyWriter {
    transport: Arc<dyn Transport>,
    retry: RetrySetting,
    source: BlobId,
    target: Object,
    options: Options,
    max_bytes_rewritten_per_call: Option<u64>,
    state: RewriteObjectResponse,
}

impl CopyWriter {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        retry: RetrySetting,
        source: BlobId,
        target: Object,
        options: Options,
        max_bytes_rewritten_per_call: Option<u64>,
    ) -> Self {
        Self {
            transport,
            retry,
            source,
            target,
            options,
            max_bytes_rewritten_per_call,
            state: RewriteObjectResponse::default(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.done
    }

    pub fn total_bytes_copied(&self) -> i64 {
        self.state.total_bytes_rewritten.unwrap_or_default()
    }

    /// The size of the source object.
    pub fn blob_size(&self) -> i64 {
        self.state.object_size.unwrap_or_default()
    }

    /// Runs one rewrite call. Does nothing once the copy is done.
    pub async fn copy_chunk(&mut self) -> Result<(), Error> {
        if self.is_done() {
            return Ok(());
        }
        let request = rewrite::build(
            &self.source,
            &self.target,
            &self.options,
            self.max_bytes_rewritten_per_call,
            self.state.rewrite_token.as_deref(),
        )?;
        let response = execute(self.transport.as_ref(), &self.retry, &request).await?;
        self.state = parse_json(&response)?;
        tracing::trace!(
            "copied {}/{} bytes of {}",
            self.total_bytes_copied(),
            self.blob_size(),
            self.source
        );
        Ok(())
    }

    /// Runs rewrite calls until the copy is done and returns the target object.
    pub async fn result(mut self) -> Result<Object, Error> {
        while !self.is_done() {
            self.copy_chunk().await?;
        }
        self.state
            .resource
            .ok_or_else(|| Error::ProtocolInternal("finished rewrite without a resource".to_string()))
    }
}
