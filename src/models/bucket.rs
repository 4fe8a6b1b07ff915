//! Represents a logical bucket: a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::metadata_store::{CatalogRecord, RecordKey};

/// Lifecycle state of a bucket row.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketStatus {
    Available,
    Deleted,
}

impl fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("Available"),
            Self::Deleted => f.write_str("Deleted"),
        }
    }
}

/// One row of `buckets.csv`.
///
/// The name is the record key and never changes once written. Creation time
/// is kept across updates; last-modified only moves forward.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    #[serde(rename = "BucketName")]
    pub name: String,

    #[serde(rename = "CreationTime", with = "super::rfc3339")]
    pub creation_time: DateTime<Utc>,

    #[serde(rename = "LastModifiedTime", with = "super::rfc3339")]
    pub last_modified_time: DateTime<Utc>,

    #[serde(rename = "Status")]
    pub status: BucketStatus,
}

impl Bucket {
    /// A freshly created bucket: both timestamps set to `now`.
    pub fn available(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            creation_time: now,
            last_modified_time: now,
            status: BucketStatus::Available,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status != BucketStatus::Deleted
    }
}

impl CatalogRecord for Bucket {
    const HEADER: &'static [&'static str] =
        &["BucketName", "CreationTime", "LastModifiedTime", "Status"];

    fn key(&self) -> RecordKey<'_> {
        RecordKey::bucket(&self.name)
    }

    fn refresh(&mut self, incoming: Self) {
        if self.status == BucketStatus::Deleted {
            // a revived name starts a new lifetime
            *self = incoming;
            return;
        }
        self.last_modified_time = self.last_modified_time.max(incoming.last_modified_time);
        self.status = incoming.status;
    }
}
