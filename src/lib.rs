//! # filedepot
//!
//! A bucketed file-upload store: uploads land on disk under per-bucket
//! directories while their metadata (id, bucket, generated filename,
//! original name, MIME type, size, creation time) is tracked in a single
//! JSON index snapshot that is atomically rewritten on every mutation.
//!
//! The crate is split along the same seams as the data:
//!
//! - [`index::FileIndex`]: the durable metadata index, with keyset pagination
//!   and single-write bulk removal
//! - [`store::FsStore`]: byte-level operations on the upload directory tree
//! - [`depot::FileDepot`]: pairs the two and defines the reconciliation
//!   policy when they disagree (metadata is authoritative, physical cleanup
//!   is best effort)
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use filedepot::{store::one_shot, Config, FileDepot};
//!
//! # async fn example() -> Result<(), filedepot::StoreError> {
//! let depot = FileDepot::new(Arc::new(Config::from_env()));
//!
//! let entry = depot
//!     .upload("photos", one_shot(Bytes::from_static(b"...")), "cat.png")
//!     .await?;
//! println!("stored as {}", entry.url);
//!
//! let page = depot.list(Some("photos"), 50, None).await?;
//! println!("{} file(s)", page.items.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod depot;
pub mod error;
pub mod index;
pub mod record;
pub mod store;

pub use config::Config;
pub use depot::{
    BucketDelete, DeletedItem, FileDepot, FileEntry, FullDelete, ManyDelete, SingleDelete,
};
pub use error::StoreError;
pub use index::{BulkRemoval, FileIndex, Page, MAX_PAGE_SIZE};
pub use record::FileRecord;
pub use store::{FsStore, StoredUpload};
