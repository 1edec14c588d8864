use reqwest::Method;

use crate::http::objects::BlobId;
use crate::http::transport::TransportRequest;
use crate::http::{Escape, BASE_PATH};
use crate::option::Options;

pub(crate) fn path(id: &BlobId) -> String {
    format!("{}/b/{}/o/{}", BASE_PATH, id.bucket.escape(), id.name.escape())
}

pub(crate) fn build(id: &BlobId, options: &Options) -> TransportRequest {
    let mut request = TransportRequest::new(Method::GET, path(id));
    if let Some(generation) = id.generation {
        request = request.query("generation", generation);
    }
    request.options(options)
}
