//! Immutable in-memory cache of a file system
//!
//! The cache is built once by walking a [`FileSystem`](crate::fs::FileSystem):
//! every file is read and stored uncompressed alongside one compressed variant
//! per configured [`Encoding`], and every directory keeps the listing of its
//! immediate children. After construction the index is never mutated, so the
//! resulting [`CachedFs`] can be shared between any number of concurrent
//! requests without locking.
//!
//! ```rust,no_run
//! use reinhardt_httpfs::cache::CachedFs;
//! use reinhardt_httpfs::fs::DirFs;
//! use reinhardt_httpfs::CacheOptions;
//!
//! # async fn example() -> reinhardt_httpfs::Result<()> {
//! let assets = DirFs::new("./assets")?;
//! let cached = CachedFs::build(&assets, &CacheOptions::default()).await?;
//! cached.log_report();
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod entry;
pub mod provider;
pub mod report;

pub use builder::build_index;
pub use entry::{DirCacheEntry, FileCacheEntry};
pub use provider::CachedFs;
pub use report::CacheReport;

use crate::codec::Encoding;
use std::collections::HashMap;
use std::time::Duration;

/// Frozen result of a cache build
#[derive(Debug, Default)]
pub struct CacheIndex {
	pub(crate) files: HashMap<String, FileCacheEntry>,
	pub(crate) dirs: HashMap<String, DirCacheEntry>,
	pub(crate) encodings: Vec<Encoding>,
	pub(crate) elapsed: Duration,
}

impl CacheIndex {
	/// Cached file by absolute path
	pub fn file(&self, path: &str) -> Option<&FileCacheEntry> {
		self.files.get(path)
	}

	/// Cached directory by absolute path
	pub fn dir(&self, path: &str) -> Option<&DirCacheEntry> {
		self.dirs.get(path)
	}

	/// All cached files
	pub fn files(&self) -> impl Iterator<Item = &FileCacheEntry> {
		self.files.values()
	}

	/// All cached directories
	pub fn dirs(&self) -> impl Iterator<Item = &DirCacheEntry> {
		self.dirs.values()
	}

	/// Number of cached files
	pub fn file_count(&self) -> usize {
		self.files.len()
	}

	/// Number of cached directories
	pub fn dir_count(&self) -> usize {
		self.dirs.len()
	}

	/// Encodings the cache was configured with, in preference order
	pub fn encodings(&self) -> &[Encoding] {
		&self.encodings
	}

	/// Time spent building the index
	pub fn elapsed(&self) -> Duration {
		self.elapsed
	}
}
