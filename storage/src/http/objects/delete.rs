use reqwest::Method;

use crate::http::objects::{get, BlobId};
use crate::http::transport::TransportRequest;
use crate::option::Options;

pub(crate) fn build(id: &BlobId, options: &Options) -> TransportRequest {
    let mut request = TransportRequest::new(Method::DELETE, get::path(id));
    if let Some(generation) = id.generation {
        request = request.query("generation", generation);
    }
    request.options(options)
}
