use std::collections::HashMap;

use time::OffsetDateTime;

pub mod delete;
pub mod get;
pub mod insert;
pub mod list;
pub mod patch;

/// A bucket.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Default, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct Bucket {
    /// The ID of the bucket. For buckets, the `id` and `name` properties are the
    /// same.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// The name of the bucket.
    pub name: String,
    /// The project number of the project the bucket belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "crate::http::from_str_option")]
    pub project_number: Option<i64>,
    /// The metadata generation of this bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(deserialize_with = "crate::http::from_str_option")]
    pub metageneration: Option<i64>,
    /// The location of the bucket. Defaults to `US`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// The bucket's default storage class, used whenever no storageClass is
    /// specified for a newly-created object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub time_created: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
    /// The bucket's versioning configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<Versioning>,
    /// User-provided labels, in key/value pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Properties of a bucket related to versioning.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Versioning {
    /// While set to true, versioning is fully enabled for this bucket.
    pub enabled: bool,
}
