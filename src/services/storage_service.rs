//! src/services/storage_service.rs
//!
//! StorageService: the bucket/object operations the HTTP layer calls. It
//! validates names, then delegates metadata to the CSV catalogs and payloads
//! to the blob store under `base_path/{bucket}/{key}`.

use bytes::Bytes;
use futures::Stream;
use std::{io, path::PathBuf};
use tokio::fs::File;
use tracing::info;

use super::{
    blob_store::BlobStore,
    bucket_catalog::BucketCatalog,
    metadata_store::CatalogLocks,
    name_validator::{validate_bucket_name, validate_object_key},
    object_catalog::ObjectCatalog,
};
use crate::{
    errors::{StorageError, StorageResult},
    models::{bucket::Bucket, object::Object},
};

/// Content type recorded when an upload declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// StorageService provides the S3-like operations:
/// - Create / list / delete buckets (root `buckets.csv`)
/// - Upload an object (stream to disk, then upsert its row in `objects.csv`)
/// - Get object (stored metadata plus an open file)
/// - List objects (stored rows of one bucket)
/// - Delete object (remove payload, then its row)
///
/// Cloning is cheap; all clones share the same catalog write locks.
#[derive(Clone, Debug)]
pub struct StorageService {
    /// Root directory holding `buckets.csv` and one directory per bucket.
    pub base_path: PathBuf,

    buckets: BucketCatalog,
    blobs: BlobStore,
}

impl StorageService {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            buckets: BucketCatalog::new(&base_path, CatalogLocks::new()),
            blobs: BlobStore::new(&base_path),
            base_path,
        }
    }

    /// Create the storage root and bucket catalog if they do not exist yet.
    pub async fn init(&self) -> StorageResult<()> {
        self.buckets.init().await
    }

    fn ensure_bucket_name(name: &str) -> StorageResult<()> {
        if validate_bucket_name(name) {
            Ok(())
        } else {
            Err(StorageError::InvalidBucketName(name.to_string()))
        }
    }

    fn ensure_object_key(key: &str) -> StorageResult<()> {
        if validate_object_key(key) {
            Ok(())
        } else {
            Err(StorageError::InvalidObjectKey(key.to_string()))
        }
    }

    /// Object catalog of a validated bucket name.
    fn objects(&self, bucket: &str) -> StorageResult<ObjectCatalog> {
        Self::ensure_bucket_name(bucket)?;
        Ok(self.buckets.objects(bucket))
    }

    pub async fn create_bucket(&self, name: &str) -> StorageResult<Bucket> {
        self.buckets.create(name).await
    }

    pub async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        self.buckets.list().await
    }

    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        self.buckets.delete(name).await
    }

    /// Stream-upload an object and record its metadata.
    ///
    /// `declared_size` is the client's `Content-Length`; it is stored as-is
    /// when present, otherwise the number of bytes received is stored.
    pub async fn put_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        declared_size: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        Self::ensure_object_key(key)?;
        let objects = self.objects(bucket)?;
        if !self.buckets.exists(bucket).await? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }

        let staged = self.blobs.stage(bucket, key, stream).await?;
        let size = declared_size.unwrap_or_else(|| staged.size.to_string());
        let content_type = content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let object = objects.put_staged(staged, &content_type, &size).await?;
        info!("stored object {}/{}", bucket, key);
        Ok(object)
    }

    /// Fetch an object for reading.
    ///
    /// Returns stored metadata and an opened file handle ready for streaming
    /// out. Returns ObjectNotFound if the row exists but the file is missing.
    pub async fn get_object_reader(&self, bucket: &str, key: &str) -> StorageResult<(Object, File)> {
        let object = self.get_object_metadata(bucket, key).await?;
        let file = self.blobs.open(bucket, key).await?;
        Ok((object, file))
    }

    /// Fetch only object metadata.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        Self::ensure_object_key(key)?;
        self.objects(bucket)?.get(key).await
    }

    pub async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<Object>> {
        self.objects(bucket)?.list().await
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        Self::ensure_object_key(key)?;
        let object = self.objects(bucket)?.delete(key).await?;
        info!("deleted object {}/{}", bucket, key);
        Ok(object)
    }
}
