use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;

use crate::http::transport::{Transport, TransportRequest, TransportResponse};
use crate::http::{check_response_status, objects::Object, parse_json, Error};

#[derive(PartialEq, Debug)]
pub enum UploadStatus {
    Ok(Object),
    /// The session is still open and holds this many bytes.
    ResumeIncomplete(u64),
}

/// The `Content-Range` of a chunk: `len` bytes from `first_byte`, and the
/// object size once it is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSize {
    first_byte: u64,
    len: u64,
    total_object_size: Option<u64>,
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.len == 0 {
            write!(f, "bytes */")?;
        } else {
            write!(f, "bytes {}-{}/", self.first_byte, self.first_byte + self.len - 1)?;
        }

        match self.total_object_size {
            Some(total_object_size) => write!(f, "{total_object_size}"),
            None => write!(f, "*"),
        }
    }
}

impl ChunkSize {
    pub fn new(first_byte: u64, len: u64, total_object_size: Option<u64>) -> ChunkSize {
        Self {
            first_byte,
            len,
            total_object_size,
        }
    }

    pub fn size(&self) -> u64 {
        self.len
    }
}

/// A resumable upload session.
#[derive(Clone, Debug)]
pub struct ResumableUploadClient {
    path: String,
    query: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
}

impl ResumableUploadClient {
    /// Accepts the session URI from the `Location` header, absolute or relative to the endpoint.
    pub fn new(session_url: &str, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        let url = url::Url::parse(session_url)
            .or_else(|_| url::Url::parse(&format!("http://localhost{session_url}")))
            .map_err(|e| Error::ProtocolInternal(format!("invalid upload session {session_url}: {e}")))?;
        Ok(Self {
            path: url.path().to_string(),
            query: url.query_pairs().into_owned().collect(),
            transport,
        })
    }

    fn request(&self, method: Method) -> TransportRequest {
        let mut request = TransportRequest::new(method, self.path.clone());
        request.query = self.query.clone();
        request
    }

    /// https://cloud.google.com/storage/docs/performing-resumable-uploads#chunked-upload
    /// https://cloud.google.com/storage/docs/performing-resumable-uploads#resume-upload
    pub async fn upload_multiple_chunk(&self, data: Bytes, size: &ChunkSize) -> Result<UploadStatus, Error> {
        let request = self
            .request(Method::PUT)
            .header("Content-Range", size)
            .header("Content-Length", size.size())
            .body(data);
        let response = self.transport.send(request).await?;
        Self::map_resume_response(response)
    }

    /// https://cloud.google.com/storage/docs/performing-resumable-uploads#status-check
    pub async fn status(&self, object_size: Option<u64>) -> Result<UploadStatus, Error> {
        self.upload_multiple_chunk(Bytes::new(), &ChunkSize::new(0, 0, object_size))
            .await
    }

    /// https://cloud.google.com/storage/docs/performing-resumable-uploads#cancel-upload
    pub async fn cancel(&self) -> Result<(), Error> {
        let request = self.request(Method::DELETE).header("Content-Length", 0);
        let response = self.transport.send(request).await?;
        if response.status == 499 {
            Ok(())
        } else {
            check_response_status(response)?;
            Ok(())
        }
    }

    fn map_resume_response(response: TransportResponse) -> Result<UploadStatus, Error> {
        if response.status == 308 {
            Ok(UploadStatus::ResumeIncomplete(persisted_size(&response)?))
        } else {
            let response = check_response_status(response)?;
            Ok(UploadStatus::Ok(parse_json(&response)?))
        }
    }
}

/// `Range: bytes=0-N` means `N + 1` bytes are persisted; no header means none.
fn persisted_size(response: &TransportResponse) -> Result<u64, Error> {
    let Some(range) = response.header_value("Range") else {
        return Ok(0);
    };
    range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, last)| last.trim().parse::<u64>().ok())
        .map(|last| last + 1)
        .ok_or_else(|| Error::ProtocolInternal(format!("invalid Range header: {range}")))
}

#[cfg(test)]
mod test {
    use crate::http::resumable_upload_client::{persisted_size, ChunkSize};
    use crate::http::transport::TransportResponse;

    #[test]
    fn test_content_range() {
        assert_eq!(ChunkSize::new(0, 4000, None).to_string(), "bytes 0-3999/*");
        assert_eq!(ChunkSize::new(8000, 1000, Some(9000)).to_string(), "bytes 8000-8999/9000");
        assert_eq!(ChunkSize::new(9000, 0, Some(9000)).to_string(), "bytes */9000");
        assert_eq!(ChunkSize::new(0, 0, None).to_string(), "bytes */*");
    }

    #[test]
    fn test_persisted_size() {
        let response = TransportResponse::new(308).header("Range", "bytes=0-6999");
        assert_eq!(persisted_size(&response).unwrap(), 7000);
        assert_eq!(persisted_size(&TransportResponse::new(308)).unwrap(), 0);
        assert!(persisted_size(&TransportResponse::new(308).header("Range", "7000")).is_err());
    }
}
