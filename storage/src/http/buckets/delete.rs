use reqwest::Method;

use crate::http::buckets::get;
use crate::http::transport::TransportRequest;
use crate::option::Options;

pub(crate) fn build(bucket: &str, options: &Options) -> TransportRequest {
    TransportRequest::new(Method::DELETE, get::path(bucket)).options(options)
}
