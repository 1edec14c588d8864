use reqwest::Method;

use crate::http::multipart::{self, Part};
use crate::http::objects::Object;
use crate::http::transport::TransportRequest;
use crate::http::{Error, Escape, UPLOAD_PATH};
use crate::option::Options;

fn path(object: &Object) -> String {
    format!("{}/b/{}/o", UPLOAD_PATH, object.bucket.escape())
}

/// One-shot upload of the metadata and the content in a single `multipart/related` body.
pub(crate) fn build_multipart(object: &Object, content: &[u8], options: &Options) -> Result<TransportRequest, Error> {
    let metadata = serde_json::to_vec(object)?;
    let content_type = object
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    let boundary = multipart::boundary();
    let body = multipart::encode(
        &boundary,
        &[
            Part::new(metadata).header("Content-Type", "application/json; charset=UTF-8"),
            Part::new(content.to_vec()).header("Content-Type", content_type),
        ],
    );
    Ok(TransportRequest::new(Method::POST, path(object))
        .query("uploadType", "multipart")
        .options(options)
        .header("Content-Type", format!("multipart/related; boundary={boundary}"))
        .body(body))
}

/// Opens a resumable upload session. The session URI is returned in the `Location` header.
pub(crate) fn build_resumable(object: &Object, options: &Options) -> Result<TransportRequest, Error> {
    TransportRequest::new(Method::POST, path(object))
        .query("uploadType", "resumable")
        .query("name", &object.name)
        .options(options)
        .json(object)
}
