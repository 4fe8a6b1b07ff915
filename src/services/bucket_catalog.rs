//! Bucket lifecycle over the root `buckets.csv` catalog.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{
    blob_store::BlobStore,
    layout,
    metadata_store::{CatalogLocks, MetadataStore, RecordKey},
    name_validator::validate_bucket_name,
    object_catalog::ObjectCatalog,
};
use crate::{
    errors::{StorageError, StorageResult},
    models::{bucket::Bucket, timestamp_now},
};

#[derive(Clone, Debug)]
pub struct BucketCatalog {
    root: PathBuf,
    store: MetadataStore<Bucket>,
    blobs: BlobStore,
    locks: Arc<CatalogLocks>,
}

impl BucketCatalog {
    pub fn new(root: impl Into<PathBuf>, locks: Arc<CatalogLocks>) -> Self {
        let root = root.into();
        Self {
            store: MetadataStore::new(layout::bucket_catalog_path(&root), locks.clone()),
            blobs: BlobStore::new(&root),
            root,
            locks,
        }
    }

    /// Create the storage root and an empty bucket catalog if missing.
    ///
    /// Fails if the root path exists but is not a directory.
    pub async fn init(&self) -> StorageResult<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StorageError::Io(io::Error::other(format!(
                    "{} exists but is not a directory",
                    self.root.display()
                ))));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.root).await?;
                info!("created storage directory at {}", self.root.display());
            }
            Err(err) => return Err(err.into()),
        }
        self.store.ensure_exists().await
    }

    /// Catalog handle for one bucket's objects. Performs no checks.
    pub fn objects(&self, name: &str) -> ObjectCatalog {
        ObjectCatalog::new(
            name,
            MetadataStore::new(layout::object_catalog_path(&self.root, name), self.locks.clone()),
            self.store.clone(),
            self.blobs.clone(),
        )
    }

    /// Create a bucket directory, its empty object catalog and an `Available`
    /// record. A `Deleted` record with the same name is revived.
    pub async fn create(&self, name: &str) -> StorageResult<Bucket> {
        if !validate_bucket_name(name) {
            return Err(StorageError::InvalidBucketName(name.to_string()));
        }

        let mut txn = self.store.begin().await?;
        if txn
            .find(RecordKey::bucket(name))
            .is_some_and(Bucket::is_available)
        {
            return Err(StorageError::BucketAlreadyExists(name.to_string()));
        }

        let bucket_dir = layout::bucket_dir(&self.root, name);
        fs::create_dir_all(&bucket_dir).await?;
        let created = async {
            self.objects(name).store().ensure_exists().await?;
            let bucket = txn.upsert(Bucket::available(name, timestamp_now()));
            txn.commit().await?;
            Ok::<_, StorageError>(bucket)
        }
        .await;

        match created {
            Ok(bucket) => {
                info!("created bucket {}", name);
                Ok(bucket)
            }
            Err(err) => {
                let _ = fs::remove_dir_all(&bucket_dir).await;
                Err(err)
            }
        }
    }

    /// Every bucket that is not marked `Deleted`.
    pub async fn list(&self) -> StorageResult<Vec<Bucket>> {
        let mut buckets = self.store.read_all().await?;
        buckets.retain(Bucket::is_available);
        Ok(buckets)
    }

    pub async fn get(&self, name: &str) -> StorageResult<Bucket> {
        self.store
            .find(RecordKey::bucket(name))
            .await?
            .filter(Bucket::is_available)
            .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))
    }

    pub async fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self
            .store
            .find(RecordKey::bucket(name))
            .await?
            .is_some_and(|b| b.is_available()))
    }

    /// True when the bucket directory holds nothing but its object catalog
    /// and the catalog has no rows.
    pub async fn is_empty(&self, name: &str) -> StorageResult<bool> {
        let objects = self.objects(name);
        let txn = objects.store().begin_or_create().await?;
        Ok(txn.records().is_empty() && dir_is_empty(&layout::bucket_dir(&self.root, name)).await?)
    }

    /// Remove an empty bucket's record and its directory subtree.
    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        if !validate_bucket_name(name) {
            return Err(StorageError::InvalidBucketName(name.to_string()));
        }

        let mut txn = self.store.begin().await?;
        if !txn
            .find(RecordKey::bucket(name))
            .is_some_and(Bucket::is_available)
        {
            return Err(StorageError::BucketNotFound(name.to_string()));
        }

        // Holding the object catalog lock keeps uploads from committing into
        // the directory while it is checked and removed.
        let objects = self.objects(name);
        let object_txn = objects.store().begin_or_create().await?;
        let bucket_dir = layout::bucket_dir(&self.root, name);
        if !object_txn.records().is_empty() || !dir_is_empty(&bucket_dir).await? {
            return Err(StorageError::BucketNotEmpty(name.to_string()));
        }

        // The directory goes first so a failed removal leaves the bucket
        // listed and the delete can be retried.
        match fs::remove_dir_all(&bucket_dir).await {
            Ok(()) => debug!("removed bucket directory {}", bucket_dir.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("bucket directory {} already missing", bucket_dir.display());
            }
            Err(err) => {
                warn!(
                    "failed to remove bucket directory {}: {}",
                    bucket_dir.display(),
                    err
                );
                return Err(err.into());
            }
        }

        txn.remove(RecordKey::bucket(name));
        txn.commit().await?;
        drop(object_txn);
        self.locks.forget(objects.store().path());

        info!("deleted bucket {}", name);
        Ok(())
    }
}

/// A bucket directory is empty when it holds nothing but the object catalog
/// and scratch files from interrupted writes. A missing directory counts as
/// empty.
async fn dir_is_empty(dir: &Path) -> StorageResult<bool> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name != layout::OBJECT_CATALOG_FILE && !layout::is_scratch_file(&name) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::ErrorKind as StorageErrorKind, models::bucket::BucketStatus};

    async fn catalog(dir: &Path) -> BucketCatalog {
        let catalog = BucketCatalog::new(dir.join("data"), CatalogLocks::new());
        catalog.init().await.unwrap();
        catalog
    }

    #[tokio::test]
    async fn init_rejects_file_in_place_of_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::write(&root, b"not a dir").unwrap();
        let err = BucketCatalog::new(&root, CatalogLocks::new())
            .init()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Io);
    }

    #[tokio::test]
    async fn create_then_list_shows_one_available_record() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;

        let created = catalog.create("my-bucket.01").await.unwrap();
        assert_eq!(created.status, BucketStatus::Available);

        let listed = catalog.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "my-bucket.01");
        assert!(listed[0].creation_time <= listed[0].last_modified_time);

        let objects_csv = dir.path().join("data/my-bucket.01/objects.csv");
        assert_eq!(
            std::fs::read_to_string(objects_csv).unwrap(),
            "BucketName,ObjectKey,ContentType,Size,LastModifiedTime\n"
        );
    }

    #[tokio::test]
    async fn create_rejects_invalid_names_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        let err = catalog.create("../escape").await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Validation);
        assert_eq!(std::fs::read_dir(dir.path().join("data")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        catalog.create("photos").await.unwrap();
        let err = catalog.create("photos").await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Conflict);
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn name_can_be_reused_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        catalog.create("photos").await.unwrap();
        catalog.delete("photos").await.unwrap();
        assert!(!catalog.exists("photos").await.unwrap());

        catalog.create("photos").await.unwrap();
        assert!(catalog.exists("photos").await.unwrap());
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleted_rows_are_hidden_and_revivable() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        std::fs::write(
            dir.path().join("data/buckets.csv"),
            "BucketName,CreationTime,LastModifiedTime,Status\n\
             archive,2024-01-01T00:00:00Z,2024-01-02T00:00:00Z,Deleted\n",
        )
        .unwrap();

        assert!(catalog.list().await.unwrap().is_empty());
        assert!(!catalog.exists("archive").await.unwrap());
        assert_eq!(
            catalog.get("archive").await.unwrap_err().kind(),
            StorageErrorKind::NotFound
        );

        let revived = catalog.create("archive").await.unwrap();
        assert!(revived.creation_time.timestamp() > 1_704_067_200);
        let rows = catalog.store.read_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, BucketStatus::Available);
    }

    #[tokio::test]
    async fn delete_missing_bucket_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        let err = catalog.delete("ghost").await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_non_empty_bucket_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        catalog.create("photos").await.unwrap();
        catalog
            .objects("photos")
            .put("cat.jpg", "image/jpeg", "3")
            .await
            .unwrap();

        let err = catalog.delete("photos").await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Conflict);
        assert!(catalog.exists("photos").await.unwrap());
        assert!(dir.path().join("data/photos").is_dir());
    }

    #[tokio::test]
    async fn stray_file_in_bucket_dir_blocks_delete() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        catalog.create("photos").await.unwrap();
        std::fs::write(dir.path().join("data/photos/orphan.bin"), b"x").unwrap();

        assert!(!catalog.is_empty("photos").await.unwrap());
        let err = catalog.delete("photos").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotEmpty(_)));
    }

    #[tokio::test]
    async fn leftover_scratch_files_do_not_block_delete() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        catalog.create("photos").await.unwrap();
        let bucket_dir = dir.path().join("data/photos");
        std::fs::write(bucket_dir.join(".tmp-5a1e0c3d"), b"half an upload").unwrap();
        std::fs::write(bucket_dir.join("objects.csv.tmp-5a1e0c3d"), b"BucketName").unwrap();

        assert!(catalog.is_empty("photos").await.unwrap());
        catalog.delete("photos").await.unwrap();
        assert!(!bucket_dir.exists());
        assert!(!catalog.exists("photos").await.unwrap());
    }

    #[tokio::test]
    async fn delete_releases_the_object_catalog_lock() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        let baseline = catalog.locks.len();

        catalog.create("photos").await.unwrap();
        catalog.objects("photos").put("a.txt", "text/plain", "1").await.unwrap();
        catalog.objects("photos").delete("a.txt").await.unwrap();
        assert_eq!(catalog.locks.len(), baseline + 1);

        catalog.delete("photos").await.unwrap();
        assert_eq!(catalog.locks.len(), baseline);

        // the bucket can come back and be written to again
        catalog.create("photos").await.unwrap();
        catalog.objects("photos").put("b.txt", "text/plain", "1").await.unwrap();
        assert_eq!(catalog.objects("photos").list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_empty_bucket_removes_record_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        catalog.create("photos").await.unwrap();
        catalog.create("videos").await.unwrap();
        assert!(catalog.is_empty("photos").await.unwrap());

        catalog.delete("photos").await.unwrap();
        assert!(!dir.path().join("data/photos").exists());
        let names: Vec<_> = catalog
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["videos".to_string()]);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        catalog.create("photos").await.unwrap();
        std::fs::remove_dir_all(dir.path().join("data/photos")).unwrap();

        catalog.delete("photos").await.unwrap();
        assert!(!catalog.exists("photos").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_creates_keep_every_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog(dir.path()).await;
        let mut handles = Vec::new();
        for i in 0..16 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move {
                catalog.create(&format!("bucket-{i}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(catalog.list().await.unwrap().len(), 16);
    }
}
