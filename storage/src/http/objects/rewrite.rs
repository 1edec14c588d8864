use reqwest::Method;

use crate::http::objects::{get, BlobId, Object};
use crate::http::transport::TransportRequest;
use crate::http::{Error, Escape};
use crate::option::{Options, StorageOption};

/// A server-side copy of `source` into `target`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyRequest {
    pub source: BlobId,
    pub source_options: Vec<StorageOption>,
    pub target: Object,
    pub target_options: Vec<StorageOption>,
    /// Caps how much a single rewrite call copies. `None` leaves it to the service.
    pub megabytes_copied_per_chunk: Option<u64>,
}

impl CopyRequest {
    pub fn new(source: BlobId, target: Object) -> Self {
        Self {
            source,
            target,
            ..Default::default()
        }
    }
}

/// A rewrite response.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RewriteObjectResponse {
    /// The total bytes written so far.
    #[serde(deserialize_with = "crate::http::from_str_option")]
    pub total_bytes_rewritten: Option<i64>,
    /// The total size of the object being copied in bytes.
    #[serde(deserialize_with = "crate::http::from_str_option")]
    pub object_size: Option<i64>,
    /// `true` if the copy is finished; otherwise, `false` if the copy is in
    /// progress. This property is always present in the response.
    pub done: bool,
    /// A token to use in subsequent requests to continue copying data. This token
    /// is present in the response only when there is more data to copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_token: Option<String>,
    /// A resource containing the metadata for the copied-to object. This
    /// property is present in the response only when copying completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Object>,
}

pub(crate) fn build(
    source: &BlobId,
    target: &Object,
    options: &Options,
    max_bytes_rewritten_per_call: Option<u64>,
    rewrite_token: Option<&str>,
) -> Result<TransportRequest, Error> {
    let path = format!(
        "{}/rewriteTo/b/{}/o/{}",
        get::path(source),
        target.bucket.escape(),
        target.name.escape()
    );
    let mut request = TransportRequest::new(Method::POST, path);
    if let Some(generation) = source.generation {
        request = request.query("sourceGeneration", generation);
    }
    if let Some(max) = max_bytes_rewritten_per_call {
        request = request.query("maxBytesRewrittenPerCall", max);
    }
    if let Some(token) = rewrite_token {
        request = request.query("rewriteToken", token);
    }
    request.options(options).json(target)
}
