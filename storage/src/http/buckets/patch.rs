use reqwest::Method;

use crate::http::buckets::{get, Bucket};
use crate::http::transport::TransportRequest;
use crate::http::Error;
use crate::option::Options;

pub(crate) fn build(bucket: &Bucket, options: &Options) -> Result<TransportRequest, Error> {
    TransportRequest::new(Method::PATCH, get::path(&bucket.name))
        .options(options)
        .json(bucket)
}
