use std::collections::HashMap;
use std::fmt;

use base64::prelude::*;
use time::OffsetDateTime;

pub mod compose;
pub mod delete;
pub mod download;
pub mod get;
pub mod list;
pub mod patch;
pub mod rewrite;
pub mod upload;

/// An object.
#[derive(Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct Object {
    /// The name of the bucket containing this object.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    /// The name of the object.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// The ID of the object, including the bucket name, object name, and
    /// generation number.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// The link to this object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// The media link to this object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_link: Option<String>,
    /// The content generation of this object. Used for object versioning.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "crate::http::from_str_option")]
    pub generation: Option<i64>,
    /// The version of the metadata for this object at this generation. Used for
    /// preconditions and for detecting changes in metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "crate::http::from_str_option")]
    pub metageneration: Option<i64>,
    /// Content-Length of the object data in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "crate::http::from_str_option")]
    pub size: Option<i64>,
    /// Content-Type of the object data. If an object is stored without a
    /// Content-Type, it is served as `application/octet-stream`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// MD5 hash of the data, base64 encoded. Required to sign a URL that
    /// covers the content hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
    /// CRC32c checksum, base64 encoded in big-endian order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc32c: Option<String>,
    /// HTTP 1.1 Entity tag for the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// The creation time of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub time_created: Option<OffsetDateTime>,
    /// The modification time of the object metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
    /// The deletion time of the object. Returned if and only if this version
    /// of the object has been deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub time_deleted: Option<OffsetDateTime>,
    /// User-provided metadata, in key/value pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl Object {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// The identity of this object, pinned to its generation when known.
    pub fn blob_id(&self) -> BlobId {
        BlobId {
            bucket: self.bucket.clone(),
            name: self.name.clone(),
            generation: self.generation,
        }
    }

    /// Sets `md5_hash` and `crc32c` to the checksums of `content`.
    pub(crate) fn with_checksums(mut self, content: &[u8]) -> Self {
        self.md5_hash = Some(BASE64_STANDARD.encode(md5::compute(content).0));
        self.crc32c = Some(BASE64_STANDARD.encode(crc32c::crc32c(content).to_be_bytes()));
        self
    }
}

/// Identifies an object, optionally a single generation of it.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct BlobId {
    pub bucket: String,
    pub name: String,
    pub generation: Option<i64>,
}

impl BlobId {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            generation: None,
        }
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            Some(generation) => write!(f, "{}/{}#{}", self.bucket, self.name, generation),
            None => write!(f, "{}/{}", self.bucket, self.name),
        }
    }
}

impl From<&Object> for BlobId {
    fn from(object: &Object) -> Self {
        object.blob_id()
    }
}

/// Description of a source object for a composition request.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceObject {
    /// The source object's name. All source objects must reside in the same
    /// bucket as the target.
    pub name: String,
    /// The generation of this object to use as the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

impl SourceObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generation: None,
        }
    }
}
