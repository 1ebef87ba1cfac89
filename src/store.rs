use std::io;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{future, Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::record;

/// Result of writing an upload to disk.
#[derive(Debug)]
pub struct StoredUpload {
    /// Server-generated filename the bytes were stored under.
    pub filename: String,
    pub size: u64,
    pub mime: String,
}

/// Wraps a single in-memory buffer as an upload body stream.
pub fn one_shot(data: Bytes) -> impl Stream<Item = io::Result<Bytes>> + Unpin + Send {
    futures::stream::iter(std::iter::once(Ok(data)))
}

/// Byte-level operations on the upload directory tree, independent of the
/// metadata index. Knows nothing about records; the coordinator pairs these
/// operations with index mutations.
pub struct FsStore {
    config: Arc<Config>,
}

impl FsStore {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Streams an upload into the bucket directory under a freshly generated
    /// filename.
    ///
    /// The bucket and the extension of `original_name` are validated against
    /// the configured allow-lists before anything is written. The write is
    /// aborted with `PayloadTooLarge` as soon as the byte count exceeds the
    /// configured limit, and the partial file is removed.
    pub async fn write_upload<S>(
        &self,
        bucket: &str,
        mut body: S,
        original_name: &str,
    ) -> Result<StoredUpload, StoreError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
    {
        if !self.config.bucket_allowed(bucket) {
            return Err(StoreError::BucketNotAllowed(bucket.to_string()));
        }
        let ext = record::extension(original_name)
            .filter(|ext| self.config.extension_allowed(ext))
            .ok_or_else(|| StoreError::ExtensionNotAllowed(original_name.to_string()))?;

        let filename = record::generate_filename(&ext);
        let dir = self.config.bucket_path(bucket);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(&filename);

        let mut file = fs::File::create(&path).await?;
        let written = Self::write_body(&mut file, &mut body, self.config.max_file_size).await;
        // Close the handle before any cleanup; some platforms refuse to
        // unlink a file that is still open.
        drop(file);
        let size = match written {
            Ok(size) => size,
            Err(e) => {
                self.discard_partial(&path).await;
                return Err(e);
            }
        };

        debug!(bucket, filename = %filename, size, "Stored upload");
        Ok(StoredUpload {
            filename,
            size,
            mime: record::mime_for_extension(&ext).to_string(),
        })
    }

    async fn write_body<S>(
        file: &mut fs::File,
        body: &mut S,
        limit: u64,
    ) -> Result<u64, StoreError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
    {
        let mut size: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            if size > limit {
                return Err(StoreError::PayloadTooLarge(limit));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(size)
    }

    async fn discard_partial(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            warn!("Failed to remove partial upload {}: {}", path.display(), e);
        }
    }

    /// Removes one file from the bucket directory. Returns `false` if the
    /// file was already gone (not an error); any other I/O failure is
    /// propagated.
    pub async fn delete_one(&self, bucket: &str, filename: &str) -> Result<bool, StoreError> {
        let path = self.config.file_path(bucket, filename);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists the immediate children of the bucket directory. A missing
    /// directory yields an empty list.
    pub async fn list_names(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.config.bucket_path(bucket);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Deletes every file currently in the bucket directory, best effort per
    /// file; the directory itself is kept. Returns the number of names the
    /// sweep attempted.
    pub async fn empty_bucket(&self, bucket: &str) -> Result<usize, StoreError> {
        let names = self.list_names(bucket).await?;
        let dir = self.config.bucket_path(bucket);
        let deletes = names.iter().map(|name| {
            let path = dir.join(name);
            async move {
                if let Err(e) = fs::remove_file(&path).await {
                    warn!("Failed to delete {}: {}", path.display(), e);
                }
            }
        });
        future::join_all(deletes).await;
        Ok(names.len())
    }
}
