//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::metadata_store::{CatalogRecord, RecordKey};

/// One row of a bucket's `objects.csv`.
///
/// `(bucket_name, key)` is the record key. The object bytes live next to the
/// catalog in a file named by the key; this struct stores metadata only.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Object {
    #[serde(rename = "BucketName")]
    pub bucket_name: String,

    #[serde(rename = "ObjectKey")]
    pub key: String,

    /// Content type (MIME type) as declared by the uploader.
    #[serde(rename = "ContentType")]
    pub content_type: String,

    /// Size in bytes, kept as the decimal string it was declared with.
    #[serde(rename = "Size")]
    pub size: String,

    #[serde(rename = "LastModifiedTime", with = "super::rfc3339")]
    pub last_modified: DateTime<Utc>,
}

impl CatalogRecord for Object {
    const HEADER: &'static [&'static str] = &[
        "BucketName",
        "ObjectKey",
        "ContentType",
        "Size",
        "LastModifiedTime",
    ];

    fn key(&self) -> RecordKey<'_> {
        RecordKey::object(&self.bucket_name, &self.key)
    }

    fn refresh(&mut self, incoming: Self) {
        let last_modified = self.last_modified.max(incoming.last_modified);
        *self = incoming;
        self.last_modified = last_modified;
    }
}
