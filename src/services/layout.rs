//! On-disk layout of the storage root.
//!
//! ```text
//! <root>/buckets.csv
//! <root>/<bucket>/objects.csv
//! <root>/<bucket>/<key>
//! ```

use std::path::{Path, PathBuf};

/// Bucket catalog file name, directly under the storage root.
pub const BUCKET_CATALOG_FILE: &str = "buckets.csv";

/// Object catalog file name, one per bucket directory.
pub const OBJECT_CATALOG_FILE: &str = "objects.csv";

/// Prefix of in-flight upload files inside a bucket directory. Catalog
/// rewrites use it as an infix after the catalog file name.
pub const STAGING_PREFIX: &str = ".tmp-";

pub fn bucket_catalog_path(root: &Path) -> PathBuf {
    root.join(BUCKET_CATALOG_FILE)
}

pub fn bucket_dir(root: &Path, bucket: &str) -> PathBuf {
    root.join(bucket)
}

pub fn object_catalog_path(root: &Path, bucket: &str) -> PathBuf {
    bucket_dir(root, bucket).join(OBJECT_CATALOG_FILE)
}

pub fn blob_path(root: &Path, bucket: &str, key: &str) -> PathBuf {
    bucket_dir(root, bucket).join(key)
}

/// Files that only exist while an upload or a catalog rewrite is in flight,
/// or that a crash during one left behind. They never hold object data.
pub fn is_scratch_file(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
        || name
            .strip_prefix(OBJECT_CATALOG_FILE)
            .is_some_and(|rest| rest.starts_with(STAGING_PREFIX))
}
