//! Per-bucket object catalog (`<bucket>/objects.csv`).
//!
//! Object lifecycle is `absent -> put -> present -> put -> present -> delete
//! -> absent`; there are no pending states visible to readers.

use std::io::ErrorKind;
use tracing::{debug, warn};

use super::{
    blob_store::{BlobStore, StagedBlob},
    metadata_store::{CatalogTxn, MetadataStore, RecordKey},
};
use crate::{
    errors::{StorageError, StorageResult},
    models::{bucket::Bucket, object::Object, timestamp_now},
};

#[derive(Clone, Debug)]
pub struct ObjectCatalog {
    bucket: String,
    store: MetadataStore<Object>,
    buckets: MetadataStore<Bucket>,
    blobs: BlobStore,
}

impl ObjectCatalog {
    pub(crate) fn new(
        bucket: &str,
        store: MetadataStore<Object>,
        buckets: MetadataStore<Bucket>,
        blobs: BlobStore,
    ) -> Self {
        Self {
            bucket: bucket.to_string(),
            store,
            buckets,
            blobs,
        }
    }

    pub(crate) fn store(&self) -> &MetadataStore<Object> {
        &self.store
    }

    /// Record (or refresh) metadata for `key` without touching its blob.
    pub async fn put(&self, key: &str, content_type: &str, size: &str) -> StorageResult<Object> {
        let mut txn = self.begin().await?;
        let object = txn.upsert(self.record(key, content_type, size));
        txn.commit().await?;
        debug!("recorded object {}/{}", self.bucket, key);
        Ok(object)
    }

    /// Publish a staged upload and record its metadata in one critical section.
    ///
    /// The staged file is dropped, and with it removed, if the bucket vanished
    /// in the meantime or the rename fails.
    pub async fn put_staged(
        &self,
        mut staged: StagedBlob,
        content_type: &str,
        size: &str,
    ) -> StorageResult<Object> {
        debug_assert_eq!(staged.bucket, self.bucket);
        let mut txn = self.begin().await?;
        self.blobs.publish(&mut staged).await?;

        let object = txn.upsert(self.record(&staged.key, content_type, size));
        txn.commit().await?;
        debug!(
            "stored object {}/{} ({} bytes received)",
            self.bucket, staged.key, staged.size
        );
        Ok(object)
    }

    /// Stored records for this bucket, as written at put time.
    pub async fn list(&self) -> StorageResult<Vec<Object>> {
        let mut objects = self.read_existing().await?;
        objects.retain(|o| o.bucket_name == self.bucket);
        Ok(objects)
    }

    pub async fn get(&self, key: &str) -> StorageResult<Object> {
        self.read_existing()
            .await?
            .into_iter()
            .find(|o| o.bucket_name == self.bucket && o.key == key)
            .ok_or_else(|| self.not_found(key))
    }

    /// Remove the blob, then its record.
    ///
    /// If the blob cannot be removed the record stays untouched and the I/O
    /// error is returned. A record whose blob is already gone is still
    /// dropped.
    pub async fn delete(&self, key: &str) -> StorageResult<Object> {
        let mut txn = self.begin().await?;
        let Some(object) = txn.find(RecordKey::object(&self.bucket, key)).cloned() else {
            return Err(self.not_found(key));
        };

        match self.blobs.remove(&self.bucket, key).await {
            Ok(()) => {}
            Err(StorageError::ObjectNotFound { .. }) => {
                warn!(
                    "blob for {}/{} was already missing, dropping its record",
                    self.bucket, key
                );
            }
            Err(err) => return Err(err),
        }

        txn.remove(RecordKey::object(&self.bucket, key));
        txn.commit().await?;
        debug!("deleted object {}/{}", self.bucket, key);
        Ok(object)
    }

    fn record(&self, key: &str, content_type: &str, size: &str) -> Object {
        Object {
            bucket_name: self.bucket.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: size.to_string(),
            last_modified: timestamp_now(),
        }
    }

    fn not_found(&self, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }

    async fn ensure_bucket(&self) -> StorageResult<()> {
        let available = self
            .buckets
            .find(RecordKey::bucket(&self.bucket))
            .await?
            .is_some_and(|b| b.is_available());
        if available {
            Ok(())
        } else {
            Err(StorageError::BucketNotFound(self.bucket.clone()))
        }
    }

    /// Lock the catalog of an existing bucket.
    async fn begin(&self) -> StorageResult<CatalogTxn<'_, Object>> {
        self.ensure_bucket().await?;
        self.store.begin().await.map_err(|err| self.missing_catalog(err))
    }

    async fn read_existing(&self) -> StorageResult<Vec<Object>> {
        self.ensure_bucket().await?;
        self.store
            .read_all()
            .await
            .map_err(|err| self.missing_catalog(err))
    }

    /// The catalog file disappears together with its bucket directory.
    fn missing_catalog(&self, err: StorageError) -> StorageError {
        match err {
            StorageError::Io(io_err) if io_err.kind() == ErrorKind::NotFound => {
                StorageError::BucketNotFound(self.bucket.clone())
            }
            other => other,
        }
    }
}
