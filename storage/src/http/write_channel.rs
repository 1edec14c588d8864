use bytes::Bytes;
use storage_gax::retry::{invoke_reuse, RetrySetting};

use crate::http::objects::Object;
use crate::http::resumable_upload_client::{ChunkSize, ResumableUploadClient, UploadStatus};
use crate::http::{is_retryable, Error, ErrorKind};

/// Every chunk but the last one must be a multiple of this.
pub(crate) const UPLOAD_QUANTUM: usize = 256 * 1024;

/// Rounds `size` up to a whole number of upload quanta, at least one.
pub(crate) fn upload_chunk_size(size: usize) -> usize {
    size.div_ceil(UPLOAD_QUANTUM).max(1) * UPLOAD_QUANTUM
}

enum Committed {
    Offset(u64),
    Finished(Object),
}

/// Uploads an object in chunks over a resumable session.
///
/// Bytes are buffered until a whole chunk is available. Each chunk is
/// committed at the running offset. When a commit fails with a retryable
/// error, the next attempt asks the session how much it holds and sends only
/// the rest. [`WriteChannel::close`] commits what is left as the final chunk
/// and returns the stored object.
#[derive(Debug)]
pub struct WriteChannel {
    upload: ResumableUploadClient,
    retry: RetrySetting,
    chunk_size: usize,
    buffer: Vec<u8>,
    position: u64,
    resync: bool,
    open: bool,
}

impl WriteChannel {
    pub(crate) fn new(upload: ResumableUploadClient, retry: RetrySetting, chunk_size: usize) -> Self {
        Self {
            upload,
            retry,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            position: 0,
            resync: false,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The number of bytes the service holds.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Buffers `data` and commits every full chunk. Returns the number of bytes accepted.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        if !self.open {
            return Err(Error::ChannelClosed);
        }
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= self.chunk_size {
            match self.commit(self.chunk_size, false).await? {
                Committed::Offset(_) => {}
                Committed::Finished(_) => {
                    self.open = false;
                    return Err(Error::ProtocolInternal(
                        "upload session finished before the object was closed".to_string(),
                    ));
                }
            }
        }
        Ok(data.len())
    }

    /// Commits the buffered remainder as the last chunk and returns the stored object.
    pub async fn close(&mut self) -> Result<Object, Error> {
        if !self.open {
            return Err(Error::ChannelClosed);
        }
        let object = match self.commit(self.buffer.len(), true).await? {
            Committed::Finished(object) => object,
            Committed::Offset(offset) => {
                self.open = false;
                return Err(Error::ProtocolInternal(format!(
                    "upload session is incomplete at {offset} after the last chunk"
                )));
            }
        };
        self.open = false;
        Ok(object)
    }

    /// Cancels the session. Nothing written so far is kept.
    pub async fn abort(&mut self) -> Result<(), Error> {
        if !self.open {
            return Err(Error::ChannelClosed);
        }
        self.open = false;
        self.buffer.clear();
        self.upload.cancel().await
    }

    /// Commits the first `len` buffered bytes. On success they leave the buffer.
    async fn commit(&mut self, len: usize, last: bool) -> Result<Committed, Error> {
        let chunk = Bytes::copy_from_slice(&self.buffer[..len]);
        let start = self.position;
        let total = last.then_some(start + len as u64);
        let upload = &self.upload;
        tracing::trace!("commit chunk start={} len={} last={}", start, len, last);

        let result = invoke_reuse(
            |resync| {
                let chunk = chunk.clone();
                async move {
                    match send_chunk(upload, chunk, start, total, resync).await {
                        Ok(committed) => Ok(committed),
                        Err(e) => Err((e, true)),
                    }
                }
            },
            self.resync,
            &self.retry,
            &mut is_retryable,
        )
        .await;

        match result {
            Ok(committed) => {
                self.resync = false;
                self.buffer.drain(..len);
                self.position = match &committed {
                    Committed::Offset(offset) => *offset,
                    Committed::Finished(_) => start + len as u64,
                };
                Ok(committed)
            }
            Err(e) => {
                let e: Error = e.into();
                match e.kind() {
                    // The service may hold part of the chunk. The next commit asks first.
                    ErrorKind::RetryExhausted | ErrorKind::TransientTransport => self.resync = true,
                    _ => self.open = false,
                }
                Err(e)
            }
        }
    }
}

/// One attempt at committing `chunk`, which starts at `start` of the object.
async fn send_chunk(
    upload: &ResumableUploadClient,
    chunk: Bytes,
    start: u64,
    total: Option<u64>,
    resync: bool,
) -> Result<Committed, Error> {
    let end = start + chunk.len() as u64;
    let mut offset = start;
    if resync {
        match upload.status(total).await? {
            UploadStatus::Ok(object) => return Ok(Committed::Finished(object)),
            UploadStatus::ResumeIncomplete(persisted) => offset = persisted.clamp(start, end),
        }
        tracing::trace!("resume chunk at {} ({} bytes already held)", offset, offset - start);
    }

    loop {
        let remaining = chunk.slice((offset - start) as usize..);
        if remaining.is_empty() && total.is_none() {
            return Ok(Committed::Offset(offset));
        }
        let size = ChunkSize::new(offset, remaining.len() as u64, total);
        match upload.upload_multiple_chunk(remaining, &size).await? {
            UploadStatus::Ok(object) => return Ok(Committed::Finished(object)),
            UploadStatus::ResumeIncomplete(persisted) if persisted >= end && total.is_none() => {
                return Ok(Committed::Offset(persisted));
            }
            UploadStatus::ResumeIncomplete(persisted) if persisted > offset && persisted <= end => {
                // Only a prefix was taken.
                offset = persisted;
            }
            UploadStatus::ResumeIncomplete(persisted) => {
                return Err(Error::ProtocolInternal(format!(
                    "upload session holds {persisted} bytes after sending {offset}..{end}"
                )));
            }
        }
    }
}
