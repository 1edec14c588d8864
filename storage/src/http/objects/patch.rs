use reqwest::Method;

use crate::http::objects::{get, Object};
use crate::http::transport::TransportRequest;
use crate::http::Error;
use crate::option::Options;

/// Sends the writable metadata of `object`. Server-managed fields are ignored by the service.
pub(crate) fn build(object: &Object, options: &Options) -> Result<TransportRequest, Error> {
    let mut request = TransportRequest::new(Method::PATCH, get::path(&object.blob_id()));
    if let Some(generation) = object.generation {
        request = request.query("generation", generation);
    }
    request.options(options).json(object)
}
