use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use storage_gax::retry::{invoke, RetrySetting};

use crate::http::objects::download::{self, Range};
use crate::http::objects::BlobId;
use crate::http::transport::{Transport, TransportResponse};
use crate::http::{check_response_status, is_retryable, Error, ErrorKind};
use crate::option::Options;

/// Reads an object in ranged chunks.
///
/// Every fetch starts at the current position, so a fetch that fails with a
/// retryable error is repeated at the same offset, never from the beginning.
/// The preconditions of the channel are checked by the first fetch; the
/// generation it served is used for every later fetch.
#[derive(Debug)]
pub struct ReadChannel {
    transport: Arc<dyn Transport>,
    retry: RetrySetting,
    id: BlobId,
    options: Options,
    chunk_size: usize,
    position: u64,
    generation: Option<i64>,
    fetched: bool,
    end_of_stream: bool,
    open: bool,
}

impl ReadChannel {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        retry: RetrySetting,
        id: BlobId,
        options: Options,
        chunk_size: usize,
    ) -> Self {
        Self {
            transport,
            retry,
            generation: id.generation,
            id,
            options,
            chunk_size,
            position: 0,
            fetched: false,
            end_of_stream: false,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The offset of the next byte to read.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek(&mut self, position: u64) -> Result<(), Error> {
        if !self.open {
            return Err(Error::ChannelClosed);
        }
        self.position = position;
        self.end_of_stream = false;
        Ok(())
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) -> Result<(), Error> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size must be positive".to_string()));
        }
        self.chunk_size = chunk_size;
        Ok(())
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Fetches the next chunk. `None` once the end of the object is reached.
    ///
    /// A retryable failure leaves the channel open at the same position; any
    /// other failure closes it.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        if !self.open {
            return Err(Error::ChannelClosed);
        }
        if self.end_of_stream {
            return Ok(None);
        }

        let id = BlobId {
            generation: self.generation,
            ..self.id.clone()
        };
        let options = if self.fetched {
            self.options.without_preconditions()
        } else {
            self.options.clone()
        };
        let last = self.position + self.chunk_size as u64 - 1;
        let request = download::build(&id, &options, &Range(Some(self.position), Some(last)));
        tracing::trace!("fetch {} bytes={}-{}", id, self.position, last);

        let transport = &self.transport;
        let request = &request;
        let result = invoke(
            || async move {
                let response = transport.send(request.clone()).await?;
                if response.status == 416 {
                    return Ok(None);
                }
                check_response_status(response).map(Some)
            },
            &self.retry,
            &mut is_retryable,
        )
        .await;

        let response = match result {
            Ok(Some(response)) => response,
            Ok(None) => {
                self.end_of_stream = true;
                return Ok(None);
            }
            Err(e) => {
                let e: Error = e.into();
                if !matches!(e.kind(), ErrorKind::RetryExhausted | ErrorKind::TransientTransport) {
                    self.open = false;
                }
                return Err(e);
            }
        };

        self.fetched = true;
        if self.generation.is_none() {
            self.generation = served_generation(&response);
        }
        let chunk = response.body;
        self.position += chunk.len() as u64;
        if chunk.len() < self.chunk_size {
            self.end_of_stream = true;
        }
        if chunk.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }

    /// The remaining chunks as a stream. The stream ends at the end of the
    /// object or after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> + Send {
        stream::unfold(Some(self), |channel| async move {
            let mut channel = channel?;
            match channel.read_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(channel))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

fn served_generation(response: &TransportResponse) -> Option<i64> {
    response
        .header_value("x-goog-generation")
        .and_then(|v| v.trim().parse().ok())
}
