use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::record::FileRecord;

/// Hard cap on the page size accepted by [`FileIndex::list`].
pub const MAX_PAGE_SIZE: usize = 200;

/// One page of index records, newest first.
#[derive(Debug)]
pub struct Page {
    pub items: Vec<FileRecord>,
    /// `createdAt` of the last item, to be passed back as the cursor for the
    /// next page. `None` when the page is empty.
    pub next_cursor: Option<i64>,
}

/// Outcome of [`FileIndex::remove_many_by_id`].
#[derive(Debug)]
pub struct BulkRemoval {
    pub removed: Vec<FileRecord>,
    /// Ids that were not present in the index.
    pub missing: Vec<String>,
}

#[derive(Default)]
struct IndexState {
    loaded: bool,
    /// Authoritative record map, keyed by id.
    by_id: HashMap<String, FileRecord>,
    /// filename -> id, rebuilt from `by_id` on every commit.
    by_name: HashMap<String, String>,
}

/// Durable, queryable record of every stored file.
///
/// The in-memory maps are backed by a JSON snapshot that is atomically
/// rewritten on every mutation: the new record set is serialized to a
/// temporary file next to the snapshot and renamed over it, so the file on
/// disk is always a complete prior or complete new state. Mutations build the
/// successor state first and only swap it in once the persist succeeds, which
/// keeps memory and disk converged even when a write fails.
///
/// Every operation serializes behind one lock, so concurrent callers cannot
/// interleave a read-modify-write and readers never observe a half-applied
/// mutation. The snapshot is read lazily on first access.
pub struct FileIndex {
    path: PathBuf,
    state: Mutex<IndexState>,
    persists: AtomicU64,
}

impl FileIndex {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(IndexState::default()),
            persists: AtomicU64::new(0),
        }
    }

    /// Reads the snapshot from disk on first call; later calls are no-ops.
    /// Every operation loads lazily as well, so calling this up front is
    /// optional.
    pub async fn load(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await
    }

    async fn ensure_loaded(&self, state: &mut IndexState) -> Result<(), StoreError> {
        if state.loaded {
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await?;
            }
        }
        // A missing or unparsable snapshot is an empty index, never fatal.
        let records: Vec<FileRecord> = match fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!(
                    "Unparsable index snapshot at {}, starting empty: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(
                        "Could not read index snapshot at {}, starting empty: {}",
                        self.path.display(),
                        e
                    );
                }
                Vec::new()
            }
        };
        let by_id = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self::install(state, by_id);
        state.loaded = true;
        debug!(records = state.by_id.len(), "Loaded index snapshot");
        Ok(())
    }

    /// Installs `by_id` as the authoritative state and rebuilds the filename
    /// index from it. Every mutation commits through here, so the two maps
    /// cannot drift.
    fn install(state: &mut IndexState, by_id: HashMap<String, FileRecord>) {
        state.by_name = by_id
            .values()
            .map(|r| (r.filename.clone(), r.id.clone()))
            .collect();
        state.by_id = by_id;
    }

    /// Serializes the full record set, newest first, to a temporary file in
    /// the snapshot's directory, then renames it over the snapshot.
    async fn persist(&self, by_id: &HashMap<String, FileRecord>) -> Result<(), StoreError> {
        let mut records: Vec<&FileRecord> = by_id.values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let raw = serde_json::to_vec_pretty(&records).map_err(|e| StoreError::Io(e.into()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, raw).await?;
        fs::rename(&tmp, &self.path).await?;
        self.persists.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Adds a new record and returns it. Fails with `DuplicateKey` if the id
    /// or the filename is already present; the index never silently
    /// overwrites an entry.
    pub async fn insert(&self, record: FileRecord) -> Result<FileRecord, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        if state.by_id.contains_key(&record.id) {
            return Err(StoreError::DuplicateKey(record.id.clone()));
        }
        if state.by_name.contains_key(&record.filename) {
            return Err(StoreError::DuplicateKey(record.filename.clone()));
        }
        let mut next = state.by_id.clone();
        next.insert(record.id.clone(), record.clone());
        self.persist(&next).await?;
        Self::install(&mut state, next);
        debug!(id = %record.id, filename = %record.filename, "Inserted record");
        Ok(record)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.by_id.get(id).cloned())
    }

    pub async fn get_by_filename(&self, name: &str) -> Result<Option<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        match state.by_name.get(name) {
            Some(id) => Ok(state.by_id.get(id).cloned()),
            None => Ok(None),
        }
    }

    /// Returns a page of records sorted by `createdAt` descending, optionally
    /// filtered to one bucket.
    ///
    /// `cursor` is the `createdAt` of the last item of the previous page;
    /// records with `createdAt >= cursor` are excluded, so an in-progress
    /// walk never sees a record twice even while inserts land at the head.
    pub async fn list(
        &self,
        bucket: Option<&str>,
        limit: usize,
        cursor: Option<i64>,
    ) -> Result<Page, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        let mut items: Vec<FileRecord> = state
            .by_id
            .values()
            .filter(|r| bucket.map_or(true, |b| r.bucket == b))
            .filter(|r| cursor.map_or(true, |c| r.created_at < c))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit.min(MAX_PAGE_SIZE));
        let next_cursor = items.last().map(|r| r.created_at);
        Ok(Page { items, next_cursor })
    }

    /// Unpaginated full dump, newest first. Loads every matching record into
    /// memory; meant for the bulk delete paths only.
    pub async fn all(&self, bucket: Option<&str>) -> Result<Vec<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        let mut records: Vec<FileRecord> = state
            .by_id
            .values()
            .filter(|r| bucket.map_or(true, |b| r.bucket == b))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Removes the record with the given id. Returns the removed record, or
    /// `None` if it was not present (not an error).
    pub async fn remove_by_id(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        if !state.by_id.contains_key(id) {
            return Ok(None);
        }
        let mut next = state.by_id.clone();
        let removed = next.remove(id);
        self.persist(&next).await?;
        Self::install(&mut state, next);
        Ok(removed)
    }

    /// Removes the record with the given filename. Returns the removed
    /// record, or `None` if it was not present (not an error).
    pub async fn remove_by_filename(&self, name: &str) -> Result<Option<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        let id = match state.by_name.get(name) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        let mut next = state.by_id.clone();
        let removed = next.remove(&id);
        self.persist(&next).await?;
        Self::install(&mut state, next);
        Ok(removed)
    }

    /// Removes a batch of ids, partitioning them into removed records and
    /// missing ids. The whole batch is covered by a single snapshot rewrite,
    /// not one per id.
    pub async fn remove_many_by_id(&self, ids: &[String]) -> Result<BulkRemoval, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        let mut next = state.by_id.clone();
        let mut removed = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match next.remove(id) {
                Some(record) => removed.push(record),
                None => missing.push(id.clone()),
            }
        }
        if !removed.is_empty() {
            self.persist(&next).await?;
            Self::install(&mut state, next);
        }
        debug!(
            removed = removed.len(),
            missing = missing.len(),
            "Bulk removal"
        );
        Ok(BulkRemoval { removed, missing })
    }

    /// Removes every record in the given bucket with a single snapshot
    /// rewrite. Returns the removed records, newest first, so the caller can
    /// drive physical deletion.
    pub async fn remove_by_bucket(&self, bucket: &str) -> Result<Vec<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        let mut next = state.by_id.clone();
        let mut removed: Vec<FileRecord> = Vec::new();
        next.retain(|_, record| {
            if record.bucket == bucket {
                removed.push(record.clone());
                false
            } else {
                true
            }
        });
        if removed.is_empty() {
            return Ok(removed);
        }
        removed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.persist(&next).await?;
        Self::install(&mut state, next);
        Ok(removed)
    }

    /// Removes every record with a single snapshot rewrite. Returns the
    /// pre-clear record set, newest first.
    pub async fn clear_all(&self) -> Result<Vec<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        let mut removed: Vec<FileRecord> = state.by_id.values().cloned().collect();
        removed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if !removed.is_empty() {
            self.persist(&HashMap::new()).await?;
            Self::install(&mut state, HashMap::new());
        }
        Ok(removed)
    }

    /// Number of records currently in the index.
    pub async fn num_records(&self) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;
        Ok(state.by_id.len())
    }

    #[cfg(test)]
    pub(crate) fn persist_count(&self) -> u64 {
        self.persists.load(Ordering::Relaxed)
    }
}
