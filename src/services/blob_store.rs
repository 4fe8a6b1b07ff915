//! Object payloads on disk: one plain file per key inside the bucket directory.
//!
//! Uploads are streamed into a staging file next to their final location and
//! only renamed into place once the object catalog lock is held, so a blob
//! never becomes visible without its metadata row being written in the same
//! critical section. Staging files left behind by a crash are ignored by the
//! bucket emptiness check and swept when the bucket is deleted.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use tempfile::TempPath;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use super::layout;
use crate::errors::{StorageError, StorageResult};

#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

/// A fully written upload that has not been published yet.
///
/// The staging file is removed when this value is dropped without being
/// published, including when the owning request future is cancelled.
#[derive(Debug)]
pub struct StagedBlob {
    pub bucket: String,
    pub key: String,
    /// Number of bytes received from the stream.
    pub size: u64,
    tmp_path: TempPath,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn blob_path(&self, bucket: &str, key: &str) -> PathBuf {
        layout::blob_path(&self.root, bucket, key)
    }

    /// Stream `stream` into a staging file in the bucket directory.
    ///
    /// The staging file is removed on any error, and also if this future is
    /// dropped before it completes. A missing bucket directory is reported
    /// as [`StorageError::BucketNotFound`].
    pub async fn stage<S>(&self, bucket: &str, key: &str, stream: S) -> StorageResult<StagedBlob>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let tmp_path = TempPath::from_path(
            layout::bucket_dir(&self.root, bucket)
                .join(format!("{}{}", layout::STAGING_PREFIX, Uuid::new_v4())),
        );
        let mut file = File::create(&*tmp_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::BucketNotFound(bucket.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;

        let mut size: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(StagedBlob {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            tmp_path,
        })
    }

    /// Move a staged upload to its final path, replacing any previous blob.
    pub async fn publish(&self, staged: &mut StagedBlob) -> StorageResult<PathBuf> {
        let file_path = self.blob_path(&staged.bucket, &staged.key);
        if let Err(err) = fs::rename(&*staged.tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&*staged.tmp_path, &file_path).await?;
            } else {
                return Err(StorageError::Io(err));
            }
        }
        staged.tmp_path.disable_cleanup(true);
        debug!("published {}", file_path.display());
        Ok(file_path)
    }

    /// Open a blob for streaming out.
    pub async fn open(&self, bucket: &str, key: &str) -> StorageResult<File> {
        File::open(self.blob_path(bucket, key))
            .await
            .map_err(|err| not_found_or_io(err, bucket, key))
    }

    /// Remove a blob. A missing file surfaces as `ObjectNotFound`.
    pub async fn remove(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let file_path = self.blob_path(bucket, key);
        fs::remove_file(&file_path)
            .await
            .map_err(|err| not_found_or_io(err, bucket, key))?;
        debug!("removed physical file {}", file_path.display());
        Ok(())
    }
}

fn not_found_or_io(err: io::Error, bucket: &str, key: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        StorageError::Io(err)
    }
}
