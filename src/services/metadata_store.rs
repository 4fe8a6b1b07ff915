//! Generic read/modify/write engine over a CSV catalog file.
//!
//! A catalog is a header row followed by one row per record. Lookups are
//! linear scans by record key. Every write serializes the full record set
//! into a sibling temp file and renames it over the catalog, so readers see
//! either the previous or the next content and never a half-written file.
//!
//! Writers to the same file are serialized by a per-path async mutex held for
//! the whole read-modify-write span (see [`CatalogLocks`]). Without it two
//! overlapping updates would both read the old content and the second rename
//! would silently drop the first writer's change. The lock only covers
//! writers inside this process.

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fmt,
    io::{self, ErrorKind},
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempPath;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::{Mutex, OwnedMutexGuard},
};
use tracing::debug;
use uuid::Uuid;

use super::layout::STAGING_PREFIX;
use crate::errors::{StorageError, StorageResult};

/// Composite record key: one or two leading fields of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordKey<'a> {
    pub bucket: &'a str,
    pub object: Option<&'a str>,
}

impl<'a> RecordKey<'a> {
    pub fn bucket(bucket: &'a str) -> Self {
        Self {
            bucket,
            object: None,
        }
    }

    pub fn object(bucket: &'a str, object: &'a str) -> Self {
        Self {
            bucket,
            object: Some(object),
        }
    }
}

impl fmt::Display for RecordKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object {
            Some(object) => write!(f, "{}/{}", self.bucket, object),
            None => f.write_str(self.bucket),
        }
    }
}

/// A row type that can live in a catalog file.
pub trait CatalogRecord: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Column names, written verbatim as the first row.
    const HEADER: &'static [&'static str];

    fn key(&self) -> RecordKey<'_>;

    fn matches(&self, key: RecordKey<'_>) -> bool {
        self.key() == key
    }

    /// Merge an incoming version of this record into the stored one.
    ///
    /// Called by upsert when a row with the same key already exists.
    fn refresh(&mut self, incoming: Self) {
        *self = incoming;
    }
}

/// Registry of per-file write locks shared by every catalog handle.
#[derive(Debug, Default)]
pub struct CatalogLocks {
    inner: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl CatalogLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn for_path(&self, path: &Path) -> Arc<Mutex<()>> {
        self.inner.entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the lock of a catalog that no longer exists.
    ///
    /// The entry is kept while any task still holds or waits on the lock, so
    /// two writers never end up with different mutexes for the same path.
    pub fn forget(&self, path: &Path) {
        self.inner
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Handle on one catalog file.
#[derive(Debug)]
pub struct MetadataStore<R> {
    path: PathBuf,
    locks: Arc<CatalogLocks>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for MetadataStore<R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            locks: self.locks.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: CatalogRecord> MetadataStore<R> {
    pub fn new(path: impl Into<PathBuf>, locks: Arc<CatalogLocks>) -> Self {
        Self {
            path: path.into(),
            locks,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file holding only the header row, unless it already exists.
    pub async fn ensure_exists(&self) -> StorageResult<()> {
        let _guard = self.locks.for_path(&self.path).lock_owned().await;
        match fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.replace(&[]).await?;
                debug!("initialized catalog {}", self.path.display());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse every data row. A missing or unreadable file is an I/O error.
    pub async fn read_all(&self) -> StorageResult<Vec<R>> {
        let bytes = fs::read(&self.path).await?;
        decode(&self.path, &bytes)
    }

    pub async fn find(&self, key: RecordKey<'_>) -> StorageResult<Option<R>> {
        Ok(self.read_all().await?.into_iter().find(|r| r.matches(key)))
    }

    /// Add one record, creating the file with its header if needed.
    pub async fn append(&self, record: R) -> StorageResult<()> {
        let mut txn = self.begin_or_create().await?;
        txn.push(record);
        txn.commit().await
    }

    /// Replace the record sharing `record`'s key, or append it.
    /// Returns the record as stored.
    pub async fn upsert(&self, record: R) -> StorageResult<R> {
        let mut txn = self.begin().await?;
        let stored = txn.upsert(record);
        txn.commit().await?;
        Ok(stored)
    }

    /// Drop every record matching `key`. Returns how many were removed.
    pub async fn delete_by_key(&self, key: RecordKey<'_>) -> StorageResult<usize> {
        let mut txn = self.begin().await?;
        let removed = txn.remove(key);
        if removed > 0 {
            txn.commit().await?;
        }
        Ok(removed)
    }

    /// Lock the file and load its records for a read-modify-write cycle.
    pub async fn begin(&self) -> StorageResult<CatalogTxn<'_, R>> {
        let guard = self.locks.for_path(&self.path).lock_owned().await;
        let records = self.read_all().await?;
        Ok(CatalogTxn {
            store: self,
            records,
            _guard: guard,
        })
    }

    /// Like [`begin`](Self::begin) but a missing file starts out empty.
    pub async fn begin_or_create(&self) -> StorageResult<CatalogTxn<'_, R>> {
        let guard = self.locks.for_path(&self.path).lock_owned().await;
        let records = match fs::read(&self.path).await {
            Ok(bytes) => decode(&self.path, &bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(CatalogTxn {
            store: self,
            records,
            _guard: guard,
        })
    }

    /// Rewrite the whole file via temp file + rename. Caller holds the lock.
    ///
    /// The temp file is removed on error or if the returned future is dropped.
    async fn replace(&self, records: &[R]) -> StorageResult<()> {
        let bytes = encode(records)?;
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalog".into());
        let mut tmp_path = TempPath::from_path(self.path.with_file_name(format!(
            "{}{}{}",
            file_name,
            STAGING_PREFIX,
            Uuid::new_v4()
        )));

        let mut file = File::create(&*tmp_path).await?;
        write_synced(&mut file, &bytes).await?;
        drop(file);

        fs::rename(&*tmp_path, &self.path).await?;
        tmp_path.disable_cleanup(true);
        debug!(
            "rewrote catalog {} with {} records",
            self.path.display(),
            records.len()
        );
        Ok(())
    }
}

/// Records loaded under the file's write lock.
///
/// Mutations stay in memory until [`commit`](Self::commit); dropping the
/// transaction releases the lock and leaves the file untouched.
pub struct CatalogTxn<'a, R: CatalogRecord> {
    store: &'a MetadataStore<R>,
    records: Vec<R>,
    _guard: OwnedMutexGuard<()>,
}

impl<R: CatalogRecord> CatalogTxn<'_, R> {
    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn find(&self, key: RecordKey<'_>) -> Option<&R> {
        self.records.iter().find(|r| r.matches(key))
    }

    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn upsert(&mut self, record: R) -> R {
        let existing = self
            .records
            .iter_mut()
            .find(|r| r.matches(record.key()));
        match existing {
            Some(slot) => {
                slot.refresh(record);
                slot.clone()
            }
            None => {
                self.records.push(record.clone());
                record
            }
        }
    }

    pub fn remove(&mut self, key: RecordKey<'_>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.matches(key));
        before - self.records.len()
    }

    pub async fn commit(self) -> StorageResult<()> {
        self.store.replace(&self.records).await
    }
}

async fn write_synced(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn decode<R: CatalogRecord>(path: &Path, bytes: &[u8]) -> StorageResult<Vec<R>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let header_ok = reader
        .headers()
        .map_err(|err| parse_error(path, err))?
        .iter()
        .eq(R::HEADER.iter().copied());
    if !header_ok {
        return Err(StorageError::Parse {
            path: path.to_path_buf(),
            reason: format!("expected header `{}`", R::HEADER.join(",")),
        });
    }

    reader
        .deserialize::<R>()
        .map(|row| row.map_err(|err| parse_error(path, err)))
        .collect()
}

fn encode<R: CatalogRecord>(records: &[R]) -> StorageResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(R::HEADER).map_err(io::Error::from)?;
    for record in records {
        writer.serialize(record).map_err(io::Error::from)?;
    }
    writer
        .into_inner()
        .map_err(|err| StorageError::Io(err.into_error()))
}

fn parse_error(path: &Path, err: csv::Error) -> StorageError {
    StorageError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::ErrorKind as StorageErrorKind,
        models::{
            bucket::{Bucket, BucketStatus},
            object::Object,
            timestamp_now,
        },
    };
    use chrono::Duration;

    fn bucket_store(dir: &Path) -> MetadataStore<Bucket> {
        MetadataStore::new(dir.join("buckets.csv"), CatalogLocks::new())
    }

    fn object(bucket: &str, key: &str, size: &str) -> Object {
        Object {
            bucket_name: bucket.into(),
            key: key.into(),
            content_type: "text/plain".into(),
            size: size.into(),
            last_modified: timestamp_now(),
        }
    }

    #[tokio::test]
    async fn ensure_exists_writes_only_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = bucket_store(dir.path());
        store.ensure_exists().await.unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "BucketName,CreationTime,LastModifiedTime,Status\n");
        assert!(store.read_all().await.unwrap().is_empty());

        // second call keeps existing rows
        store
            .append(Bucket::available("photos", timestamp_now()))
            .await
            .unwrap();
        store.ensure_exists().await.unwrap();
        assert_eq!(store.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = bucket_store(dir.path());
        store
            .append(Bucket::available("photos", timestamp_now()))
            .await
            .unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("BucketName,CreationTime,LastModifiedTime,Status")
        );
        assert!(lines.next().unwrap().starts_with("photos,"));
    }

    #[tokio::test]
    async fn read_all_on_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = bucket_store(dir.path()).read_all().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Io);
    }

    #[tokio::test]
    async fn wrong_field_count_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = bucket_store(dir.path());
        std::fs::write(
            store.path(),
            "BucketName,CreationTime,LastModifiedTime,Status\nphotos,2024-01-01T00:00:00Z\n",
        )
        .unwrap();
        let err = store.read_all().await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Parse);
    }

    #[tokio::test]
    async fn foreign_header_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = bucket_store(dir.path());
        std::fs::write(store.path(), "Name,Created\nphotos,now\n").unwrap();
        let err = store.read_all().await.unwrap_err();
        assert!(matches!(err, StorageError::Parse { .. }));
    }

    #[tokio::test]
    async fn reads_rows_with_local_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let store = bucket_store(dir.path());
        std::fs::write(
            store.path(),
            "BucketName,CreationTime,LastModifiedTime,Status\n\
             photos,2024-10-01T12:00:00+05:00,2024-10-01T12:00:00+05:00,Available\n\
             old,2024-09-01T00:00:00Z,2024-09-02T00:00:00Z,Deleted\n",
        )
        .unwrap();
        let records = store.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].creation_time.to_rfc3339(),
            "2024-10-01T07:00:00+00:00"
        );
        assert_eq!(records[1].status, BucketStatus::Deleted);
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store: MetadataStore<Object> =
            MetadataStore::new(dir.path().join("objects.csv"), CatalogLocks::new());
        store.ensure_exists().await.unwrap();

        store.upsert(object("docs", "a.txt", "10")).await.unwrap();
        store.upsert(object("docs", "b.txt", "20")).await.unwrap();
        let mut updated = object("docs", "a.txt", "99");
        updated.last_modified += Duration::seconds(1);
        let stored = store.upsert(updated).await.unwrap();
        assert_eq!(stored.size, "99");

        let records = store.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        let a = store
            .find(RecordKey::object("docs", "a.txt"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.size, "99");
    }

    #[tokio::test]
    async fn delete_by_key_removes_only_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store: MetadataStore<Object> =
            MetadataStore::new(dir.path().join("objects.csv"), CatalogLocks::new());
        store.ensure_exists().await.unwrap();
        store.upsert(object("docs", "a.txt", "1")).await.unwrap();
        store.upsert(object("docs", "b.txt", "2")).await.unwrap();

        let removed = store
            .delete_by_key(RecordKey::object("docs", "a.txt"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let removed = store
            .delete_by_key(RecordKey::object("docs", "a.txt"))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let keys: Vec<_> = store
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["b.txt".to_string()]);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = bucket_store(dir.path());
        store.ensure_exists().await.unwrap();
        {
            let mut txn = store.begin().await.unwrap();
            txn.push(Bucket::available("ghost", timestamp_now()));
        }
        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let locks = CatalogLocks::new();
        let path = dir.path().join("objects.csv");
        let store: MetadataStore<Object> = MetadataStore::new(&path, locks.clone());
        store.ensure_exists().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let store: MetadataStore<Object> = MetadataStore::new(&path, locks.clone());
            handles.push(tokio::spawn(async move {
                store
                    .upsert(object("docs", &format!("key-{i}"), "1"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.read_all().await.unwrap().len(), 32);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temp files must not survive a rewrite");
    }

    #[tokio::test]
    async fn fields_with_commas_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store: MetadataStore<Object> =
            MetadataStore::new(dir.path().join("objects.csv"), CatalogLocks::new());
        let mut record = object("docs", "a.txt", "3");
        record.content_type = "text/plain; charset=\"utf-8\", x".into();
        store.append(record.clone()).await.unwrap();
        let back = store.read_all().await.unwrap();
        assert_eq!(back[0].content_type, record.content_type);
    }
}
