use reqwest::Method;

use crate::http::transport::TransportRequest;
use crate::http::{Escape, BASE_PATH};
use crate::option::Options;

pub(crate) fn path(bucket: &str) -> String {
    format!("{}/b/{}", BASE_PATH, bucket.escape())
}

pub(crate) fn build(bucket: &str, options: &Options) -> TransportRequest {
    TransportRequest::new(Method::GET, path(bucket)).options(options)
}
