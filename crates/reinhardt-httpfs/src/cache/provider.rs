//! File system backed by a frozen cache index

use super::{build_index, CacheIndex, CacheReport};
use crate::codec::{self, Encoding};
use crate::config::CacheOptions;
use crate::error::{HttpFsError, Result};
use crate::fs::{Entry, FileSystem, NegotiatingFileSystem};
use crate::path;
use async_trait::async_trait;
use std::sync::Arc;

/// Serves files from an immutable in-memory index
///
/// Cloning is cheap; clones share the same index.
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::cache::CachedFs;
/// use reinhardt_httpfs::fs::{Entry, MemoryFs, NegotiatingFileSystem};
/// use reinhardt_httpfs::{CacheOptions, Encoding};
///
/// # tokio_test::block_on(async {
/// let source = MemoryFs::new().with_file("/app.css", "body { margin: 0 }\n".repeat(30));
/// let cached = CachedFs::build(&source, &CacheOptions::default()).await.unwrap();
///
/// let (entry, encoding) = cached.open_negotiated("/app.css", "br, gzip").await.unwrap();
/// assert_eq!(encoding, Some(Encoding::Brotli));
/// assert!(matches!(entry, Entry::File(ref f) if f.is_cached()));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CachedFs {
	index: Arc<CacheIndex>,
}

impl CachedFs {
	/// Builds the cache from `fs`
	///
	/// # Errors
	///
	/// Propagates any error from [`build_index`]; the caller decides whether to
	/// fall back to the uncached provider.
	pub async fn build(fs: &dyn FileSystem, options: &CacheOptions) -> Result<Self> {
		Ok(Self::from_index(build_index(fs, options).await?))
	}

	/// Wraps an already built index
	pub fn from_index(index: CacheIndex) -> Self {
		Self {
			index: Arc::new(index),
		}
	}

	/// The underlying index
	pub fn index(&self) -> &CacheIndex {
		&self.index
	}

	/// Size and compression summary
	pub fn report(&self) -> CacheReport {
		CacheReport::from_index(&self.index)
	}

	/// Logs [`CachedFs::report`] at `info` level
	pub fn log_report(&self) {
		let report = self.report();
		for line in report.to_string().lines() {
			tracing::info!("{}", line);
		}
	}

	fn normalize(name: &str) -> String {
		path::clean(&path::with_leading_slash(&path::to_slash(name)))
	}
}

#[async_trait]
impl FileSystem for CachedFs {
	async fn open(&self, name: &str) -> Result<Entry> {
		let name = Self::normalize(name);

		if let Some(dir) = self.index.dir(&name) {
			return Ok(Entry::Dir(dir.handle()));
		}
		if let Some(file) = self.index.file(&name) {
			return Ok(Entry::File(file.handle(None)));
		}
		Err(HttpFsError::NotFound(name))
	}

	fn as_negotiating(&self) -> Option<&dyn NegotiatingFileSystem> {
		Some(self)
	}
}

#[async_trait]
impl NegotiatingFileSystem for CachedFs {
	async fn open_negotiated(
		&self,
		name: &str,
		accept_encoding: &str,
	) -> Result<(Entry, Option<Encoding>)> {
		let name = Self::normalize(name);

		if let Some(dir) = self.index.dir(&name) {
			return Ok((Entry::Dir(dir.handle()), None));
		}

		let Some(file) = self.index.file(&name) else {
			return Err(HttpFsError::NotFound(name));
		};

		// Only offer what was actually stored for this file.
		let offers: Vec<Encoding> = self
			.index
			.encodings()
			.iter()
			.copied()
			.filter(|encoding| file.has_variant(*encoding))
			.collect();
		let encoding = codec::negotiate(accept_encoding, &offers);

		let handle = file.handle(encoding);
		let selected = handle.content_encoding();
		Ok((Entry::File(handle), selected))
	}
}
