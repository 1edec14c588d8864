use reqwest::Method;

use crate::http::objects::{get, Object, SourceObject};
use crate::http::transport::TransportRequest;
use crate::http::Error;
use crate::option::{Options, StorageOption};

/// Concatenates `sources` into `target`. All objects live in the target's bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComposeRequest {
    pub target: Object,
    pub sources: Vec<SourceObject>,
    pub target_options: Vec<StorageOption>,
}

impl ComposeRequest {
    pub fn new(target: Object, sources: impl IntoIterator<Item = SourceObject>) -> Self {
        Self {
            target,
            sources: sources.into_iter().collect(),
            target_options: vec![],
        }
    }

    pub fn with_target_options(mut self, options: Vec<StorageOption>) -> Self {
        self.target_options = options;
        self
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ComposingTargets<'a> {
    destination: &'a Object,
    source_objects: &'a [SourceObject],
}

pub(crate) fn build(req: &ComposeRequest, options: &Options) -> Result<TransportRequest, Error> {
    if req.sources.is_empty() {
        return Err(Error::InvalidArgument("compose requires at least one source".to_string()));
    }
    let path = format!("{}/compose", get::path(&req.target.blob_id()));
    TransportRequest::new(Method::POST, path)
        .options(options)
        .json(&ComposingTargets {
            destination: &req.target,
            source_objects: &req.sources,
        })
}
