use reqwest::Method;

use crate::http::objects::{get, BlobId};
use crate::http::transport::TransportRequest;
use crate::option::Options;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range(pub Option<u64>, pub Option<u64>);

impl Range {
    /// Range: bytes=0-1999 (first 2000 bytes)
    /// Range: bytes=-2000 (last 2000 bytes)
    /// Range: bytes=2000- (from byte 2000 to end of file)
    fn header_value(&self) -> Option<String> {
        match (self.0, self.1) {
            (Some(from), Some(to)) => Some(format!("bytes={from}-{to}")),
            (Some(from), None) => Some(format!("bytes={from}-")),
            (None, Some(last)) => Some(format!("bytes=-{last}")),
            (None, None) => None,
        }
    }
}

pub(crate) fn build(id: &BlobId, options: &Options, range: &Range) -> TransportRequest {
    let mut request = TransportRequest::new(Method::GET, get::path(id)).query("alt", "media");
    if let Some(generation) = id.generation {
        request = request.query("generation", generation);
    }
    if let Some(range) = range.header_value() {
        request = request.header("Range", range);
    }
    request.options(options)
}
