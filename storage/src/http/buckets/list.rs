use reqwest::Method;

use crate::http::buckets::Bucket;
use crate::http::transport::TransportRequest;
use crate::http::BASE_PATH;
use crate::option::Options;

/// The result of a call to Buckets.ListBuckets
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ListBucketsResponse {
    /// The list of items.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Bucket>,
    /// The continuation token, used to page through large result sets. Provide
    /// this value in a subsequent request to return the next page of results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

pub(crate) fn build(project: &str, options: &Options) -> TransportRequest {
    TransportRequest::new(Method::GET, format!("{BASE_PATH}/b"))
        .query("project", project)
        .options(options)
}
