use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::{future, Stream};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::index::{FileIndex, Page};
use crate::record::{self, FileRecord};
use crate::store::FsStore;

/// A record together with its derived public download URL.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub record: FileRecord,
    pub url: String,
}

/// Per-record outcome of a compound delete.
#[derive(Debug)]
pub struct DeletedItem {
    pub id: String,
    pub bucket: String,
    pub filename: String,
    /// Whether the physical file was actually removed from disk. `false`
    /// means the file was already gone or the delete failed; the metadata
    /// removal stands either way.
    pub removed_disk: bool,
}

/// Outcome of [`FileDepot::delete_by_filename`] and
/// [`FileDepot::delete_by_id`].
#[derive(Debug)]
pub struct SingleDelete {
    pub record: FileRecord,
    pub removed_disk: bool,
}

/// Outcome of [`FileDepot::delete_many_by_ids`].
#[derive(Debug)]
pub struct ManyDelete {
    pub requested: usize,
    pub removed: usize,
    /// Ids that were not present in the index.
    pub missing: Vec<String>,
    pub items: Vec<DeletedItem>,
}

/// Outcome of [`FileDepot::delete_bucket`].
#[derive(Debug)]
pub struct BucketDelete {
    pub bucket: String,
    pub count: usize,
    pub items: Vec<DeletedItem>,
}

/// Outcome of [`FileDepot::delete_all`].
#[derive(Debug)]
pub struct FullDelete {
    pub total: usize,
    pub items: Vec<DeletedItem>,
}

/// Coordinates the physical store and the metadata index.
///
/// The index is authoritative for whether a file is considered present; the
/// physical side is best-effort janitorial work. A record with no backing
/// file, or a file with no record, is a tolerated divergence, never a crash.
/// Compound deletes resolve the affected records from the index first, fan
/// out the physical deletes in parallel, and finish with exactly one index
/// removal covering the whole set.
pub struct FileDepot {
    config: Arc<Config>,
    store: FsStore,
    index: FileIndex,
}

impl FileDepot {
    pub fn new(config: Arc<Config>) -> Self {
        let index = FileIndex::new(config.index_path.clone());
        let store = FsStore::new(Arc::clone(&config));
        Self {
            config,
            store,
            index,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn entry(&self, record: FileRecord) -> FileEntry {
        let url = self.config.public_url(&record.bucket, &record.filename);
        FileEntry { record, url }
    }

    /// Stores an upload and registers it in the index. An empty `bucket`
    /// falls back to the configured default bucket.
    ///
    /// The physical write happens first; if the index insert fails after the
    /// bytes already hit the disk, the orphaned file is left in place and the
    /// error surfaces to the caller.
    pub async fn upload<S>(
        &self,
        bucket: &str,
        body: S,
        original_name: &str,
    ) -> Result<FileEntry, StoreError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
    {
        if original_name.trim().is_empty() {
            return Err(StoreError::NoFile);
        }
        let bucket = match bucket.trim() {
            "" => self.config.default_bucket().to_string(),
            b => b.to_string(),
        };
        if !self.config.bucket_allowed(&bucket) {
            return Err(StoreError::BucketNotAllowed(bucket));
        }

        let stored = self.store.write_upload(&bucket, body, original_name).await?;
        let record = FileRecord::new(
            &bucket,
            stored.filename,
            original_name,
            stored.mime,
            stored.size,
        );
        let filename = record.filename.clone();
        let record = match self.index.insert(record).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    "Index insert failed after physical write, orphaning {}/{}: {}",
                    bucket, filename, e
                );
                return Err(e);
            }
        };
        info!(
            bucket = %record.bucket,
            filename = %record.filename,
            size = record.size,
            "Upload stored"
        );
        Ok(self.entry(record))
    }

    /// Lists records newest first, optionally scoped to one bucket.
    pub async fn list(
        &self,
        bucket: Option<&str>,
        limit: usize,
        cursor: Option<i64>,
    ) -> Result<Page, StoreError> {
        if let Some(bucket) = bucket {
            if !self.config.bucket_allowed(bucket) {
                return Err(StoreError::BucketNotAllowed(bucket.to_string()));
            }
        }
        self.index.list(bucket, limit, cursor).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<FileEntry, StoreError> {
        match self.index.get_by_id(id).await? {
            Some(record) => Ok(self.entry(record)),
            None => Err(StoreError::NotFound),
        }
    }

    pub async fn get_by_filename(&self, name: &str) -> Result<FileEntry, StoreError> {
        if !record::is_safe_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        match self.index.get_by_filename(name).await? {
            Some(record) => Ok(self.entry(record)),
            None => Err(StoreError::NotFound),
        }
    }

    /// Deletes one file by its server-generated name. The physical delete is
    /// attempted first and its outcome recorded; the index entry is removed
    /// regardless, since the index is authoritative for presence.
    pub async fn delete_by_filename(&self, name: &str) -> Result<SingleDelete, StoreError> {
        if !record::is_safe_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let record = self
            .index
            .get_by_filename(name)
            .await?
            .ok_or(StoreError::NotFound)?;
        let removed_disk = self.delete_physical(&record).await;
        let record = self
            .index
            .remove_by_filename(name)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(SingleDelete {
            record,
            removed_disk,
        })
    }

    /// Deletes one file by id, with the same reconciliation policy as
    /// [`FileDepot::delete_by_filename`].
    pub async fn delete_by_id(&self, id: &str) -> Result<SingleDelete, StoreError> {
        let record = self
            .index
            .get_by_id(id)
            .await?
            .ok_or(StoreError::NotFound)?;
        let removed_disk = self.delete_physical(&record).await;
        let record = self
            .index
            .remove_by_id(id)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(SingleDelete {
            record,
            removed_disk,
        })
    }

    /// Deletes a batch of ids. Missing ids are reported, not errors; the
    /// whole batch is covered by a single index persist.
    pub async fn delete_many_by_ids(&self, ids: &[String]) -> Result<ManyDelete, StoreError> {
        if ids.is_empty() {
            return Err(StoreError::NoIds);
        }
        // Resolve the affected records up front so the physical deletes can
        // run before the metadata goes away.
        let mut records = Vec::new();
        for id in ids {
            if let Some(record) = self.index.get_by_id(id).await? {
                records.push(record);
            }
        }
        let items = self.delete_physical_all(&records).await;
        let removal = self.index.remove_many_by_id(ids).await?;
        Ok(ManyDelete {
            requested: ids.len(),
            removed: removal.removed.len(),
            missing: removal.missing,
            items,
        })
    }

    /// Empties a bucket: every indexed record is removed with one persist,
    /// physical files are deleted in parallel, and the bucket directory is
    /// swept afterwards to catch files that were never indexed.
    pub async fn delete_bucket(&self, bucket: &str) -> Result<BucketDelete, StoreError> {
        if !self.config.bucket_allowed(bucket) {
            return Err(StoreError::BucketNotAllowed(bucket.to_string()));
        }
        let records = self.index.all(Some(bucket)).await?;
        let items = self.delete_physical_all(&records).await;
        self.index.remove_by_bucket(bucket).await?;
        if let Err(e) = self.store.empty_bucket(bucket).await {
            warn!("Sweep of bucket {} failed: {}", bucket, e);
        }
        info!(bucket, count = items.len(), "Bucket emptied");
        Ok(BucketDelete {
            bucket: bucket.to_string(),
            count: items.len(),
            items,
        })
    }

    /// Removes every record and attempts every physical delete, then sweeps
    /// all allowed bucket directories. Requires the explicit confirmation
    /// flag; without it nothing is touched.
    pub async fn delete_all(&self, confirm: bool) -> Result<FullDelete, StoreError> {
        if !confirm {
            return Err(StoreError::ConfirmationRequired);
        }
        let records = self.index.all(None).await?;
        let items = self.delete_physical_all(&records).await;
        self.index.clear_all().await?;
        for bucket in &self.config.allowed_buckets {
            if let Err(e) = self.store.empty_bucket(bucket).await {
                warn!("Sweep of bucket {} failed: {}", bucket, e);
            }
        }
        info!(total = items.len(), "Store cleared");
        Ok(FullDelete {
            total: items.len(),
            items,
        })
    }

    /// Number of records currently in the index.
    pub async fn num_records(&self) -> Result<usize, StoreError> {
        self.index.num_records().await
    }

    /// Best-effort physical delete of one record's file. Failures are logged
    /// and reported as `false`, never propagated.
    async fn delete_physical(&self, record: &FileRecord) -> bool {
        match self.store.delete_one(&record.bucket, &record.filename).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(
                    "Physical delete of {}/{} failed: {}",
                    record.bucket, record.filename, e
                );
                false
            }
        }
    }

    /// Fires physical deletes for all records in parallel and collects a
    /// per-record outcome. No individual failure aborts its siblings.
    async fn delete_physical_all(&self, records: &[FileRecord]) -> Vec<DeletedItem> {
        let deletes = records.iter().map(|record| async move {
            DeletedItem {
                id: record.id.clone(),
                bucket: record.bucket.clone(),
                filename: record.filename.clone(),
                removed_disk: self.delete_physical(record).await,
            }
        });
        future::join_all(deletes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::one_shot;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> Arc<Config> {
        Arc::new(Config {
            allowed_buckets: vec!["photos".to_string(), "docs".to_string()],
            allowed_extensions: vec!["png".to_string(), "pdf".to_string()],
            max_file_size: 1024,
            base_url: "http://localhost:8080".to_string(),
            upload_root: root.join("public"),
            index_path: root.join("data").join("index.json"),
        })
    }

    fn depot_at(root: &Path) -> FileDepot {
        FileDepot::new(test_config(root))
    }

    fn body(data: &[u8]) -> impl Stream<Item = io::Result<Bytes>> + Unpin + Send {
        one_shot(Bytes::copy_from_slice(data))
    }

    #[tokio::test]
    async fn upload_then_lookup_roundtrip() {
        let dir = tempdir().unwrap();
        let depot = depot_at(dir.path());

        let entry = depot
            .upload("photos", body(b"0123456789"), "cat.png")
            .await
            .unwrap();
        assert_eq!(entry.record.bucket, "photos");
        assert_eq!(entry.record.original_name, "cat.png");
        assert_eq!(entry.record.mime, "image/png");
        assert_eq!(entry.record.size, 10);
        assert!(record::is_safe_name(&entry.record.filename));
        assert_eq!(
            entry.url,
            format!(
                "http://localhost:8080/files/photos/{}",
                entry.record.filename
            )
        );

        let by_id = depot.get_by_id(&entry.record.id).await.unwrap();
        assert_eq!(by_id.record, entry.record);
        let by_name = depot.get_by_filename(&entry.record.filename).await.unwrap();
        assert_eq!(by_name.record, entry.record);

        let page = depot.list(Some("photos"), 50, None).await.unwrap();
        assert_eq!(page.items, vec![entry.record]);
    }

    #[tokio::test]
    async fn upload_to_unknown_bucket_leaves_no_state() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let depot = FileDepot::new(Arc::clone(&config));

        let err = depot
            .upload("scratch", body(b"x"), "cat.png")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BucketNotAllowed(_)));
        assert_eq!(depot.num_records().await.unwrap(), 0);
        assert!(!config.bucket_path("scratch").exists());
    }

    #[tokio::test]
    async fn upload_input_validation() {
        let dir = tempdir().unwrap();
        let depot = depot_at(dir.path());

        let err = depot.upload("photos", body(b"x"), "  ").await.unwrap_err();
        assert!(matches!(err, StoreError::NoFile));

        let err = depot
            .upload("photos", body(b"x"), "virus.exe")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ExtensionNotAllowed(_)));

        // Empty bucket falls back to the first configured one.
        let entry = depot.upload("", body(b"x"), "cat.png").await.unwrap();
        assert_eq!(entry.record.bucket, "photos");
    }

    #[tokio::test]
    async fn delete_by_filename_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let depot = FileDepot::new(Arc::clone(&config));

        let entry = depot.upload("photos", body(b"x"), "cat.png").await.unwrap();
        let name = entry.record.filename.clone();

        let out = depot.delete_by_filename(&name).await.unwrap();
        assert!(out.removed_disk);
        assert!(!config.file_path("photos", &name).exists());

        // Second delete is a clean NotFound, not a crash.
        let err = depot.delete_by_filename(&name).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        let err = depot
            .delete_by_filename("../../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
    }

    #[tokio::test]
    async fn delete_by_id_tolerates_missing_disk_file() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let depot = FileDepot::new(Arc::clone(&config));

        let entry = depot.upload("photos", body(b"x"), "cat.png").await.unwrap();
        std::fs::remove_file(config.file_path("photos", &entry.record.filename)).unwrap();

        let out = depot.delete_by_id(&entry.record.id).await.unwrap();
        assert!(!out.removed_disk);
        assert_eq!(depot.num_records().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_many_reports_missing_ids() {
        let dir = tempdir().unwrap();
        let depot = depot_at(dir.path());

        let mut ids = Vec::new();
        for name in ["a.png", "b.png", "c.png"] {
            ids.push(depot.upload("photos", body(b"x"), name).await.unwrap().record.id);
        }
        ids.push("missing-1".to_string());
        ids.push("missing-2".to_string());

        let out = depot.delete_many_by_ids(&ids).await.unwrap();
        assert_eq!(out.requested, 5);
        assert_eq!(out.removed, 3);
        assert_eq!(out.missing.len(), 2);
        assert_eq!(out.items.len(), 3);
        assert!(out.items.iter().all(|item| item.removed_disk));
        assert_eq!(depot.num_records().await.unwrap(), 0);

        let err = depot.delete_many_by_ids(&[]).await.unwrap_err();
        assert!(matches!(err, StoreError::NoIds));
    }

    #[tokio::test]
    async fn delete_bucket_leaves_other_buckets_untouched() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let depot = FileDepot::new(Arc::clone(&config));

        depot.upload("photos", body(b"x"), "a.png").await.unwrap();
        depot.upload("photos", body(b"x"), "b.png").await.unwrap();
        let kept = depot.upload("docs", body(b"x"), "c.pdf").await.unwrap();

        let out = depot.delete_bucket("photos").await.unwrap();
        assert_eq!(out.count, 2);
        assert!(out.items.iter().all(|item| item.removed_disk));

        let page = depot.list(None, 50, None).await.unwrap();
        assert_eq!(page.items, vec![kept.record.clone()]);
        assert!(config
            .file_path("docs", &kept.record.filename)
            .exists());
    }

    #[tokio::test]
    async fn delete_bucket_sweeps_unindexed_files() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let depot = FileDepot::new(Arc::clone(&config));

        depot.upload("photos", body(b"x"), "a.png").await.unwrap();
        // A file on disk that the index never saw.
        let stray = config.bucket_path("photos").join("stray.png");
        std::fs::write(&stray, b"x").unwrap();

        depot.delete_bucket("photos").await.unwrap();
        assert!(!stray.exists());
    }

    #[tokio::test]
    async fn delete_all_requires_confirmation() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let depot = FileDepot::new(Arc::clone(&config));

        let entry = depot.upload("photos", body(b"x"), "a.png").await.unwrap();

        let err = depot.delete_all(false).await.unwrap_err();
        assert!(matches!(err, StoreError::ConfirmationRequired));
        assert_eq!(depot.num_records().await.unwrap(), 1);
        assert!(config
            .file_path("photos", &entry.record.filename)
            .exists());

        let out = depot.delete_all(true).await.unwrap();
        assert_eq!(out.total, 1);
        assert_eq!(depot.num_records().await.unwrap(), 0);
        assert!(!config
            .file_path("photos", &entry.record.filename)
            .exists());
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let dir = tempdir().unwrap();
        let entry;
        {
            let depot = depot_at(dir.path());
            entry = depot.upload("photos", body(b"x"), "a.png").await.unwrap();
        }
        let depot = depot_at(dir.path());
        let found = depot.get_by_id(&entry.record.id).await.unwrap();
        assert_eq!(found.record, entry.record);
    }
}
