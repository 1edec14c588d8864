use reqwest::Method;

use crate::http::objects::Object;
use crate::http::transport::TransportRequest;
use crate::http::{Escape, BASE_PATH};
use crate::option::Options;

/// The result of a call to Objects.ListObjects
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ListObjectsResponse {
    /// The list of prefixes of objects matching-but-not-listed up to and including
    /// the requested delimiter.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
    /// The list of items.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Object>,
    /// The continuation token, used to page through large result sets. Provide
    /// this value in a subsequent request to return the next page of results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

pub(crate) fn build(bucket: &str, options: &Options) -> TransportRequest {
    TransportRequest::new(Method::GET, format!("{}/b/{}/o", BASE_PATH, bucket.escape())).options(options)
}
