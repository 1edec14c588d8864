use reqwest::Method;

use crate::http::buckets::Bucket;
use crate::http::transport::TransportRequest;
use crate::http::{Error, BASE_PATH};
use crate::option::Options;

pub(crate) fn build(project: &str, bucket: &Bucket, options: &Options) -> Result<TransportRequest, Error> {
    TransportRequest::new(Method::POST, format!("{BASE_PATH}/b"))
        .query("project", project)
        .options(options)
        .json(bucket)
}
