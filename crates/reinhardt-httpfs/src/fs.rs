//! Virtual file system abstraction
//!
//! A [`FileSystem`] exposes a hierarchical, slash-separated namespace through a
//! single `open` operation. Opening a path yields an [`Entry`], which is either
//! a [`FileHandle`] (metadata plus readable content) or a [`DirHandle`]
//! (metadata plus the immediate children).
//!
//! Two providers ship with the crate:
//! - [`DirFs`] serves a physical directory
//! - [`MemoryFs`] serves an in-memory tree, handy for embedded assets and tests
//!
//! The cached provider lives in [`crate::cache::CachedFs`].

pub mod dir;
pub mod memory;

pub use dir::DirFs;
pub use memory::MemoryFs;

use crate::codec::Encoding;
use crate::error::{HttpFsError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Unix-style mode bits of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileMode(u32);

impl FileMode {
	/// Directory flag
	pub const DIR: u32 = 0o040000;

	/// Wraps raw mode bits
	pub const fn new(bits: u32) -> Self {
		Self(bits)
	}

	/// Mode of a directory with the given permission bits
	pub const fn dir(perm: u32) -> Self {
		Self(Self::DIR | (perm & 0o777))
	}

	/// Mode of a regular file with the given permission bits
	pub const fn file(perm: u32) -> Self {
		Self(perm & 0o777)
	}

	/// Raw mode bits
	pub const fn bits(self) -> u32 {
		self.0
	}

	/// Permission bits only
	pub const fn permissions(self) -> u32 {
		self.0 & 0o777
	}

	/// Whether the directory flag is set
	pub const fn is_dir(self) -> bool {
		self.0 & Self::DIR != 0
	}
}

/// Lightweight stat record of a file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
	/// Base name
	pub name: String,
	/// Size in bytes (0 for directories)
	pub size: u64,
	/// Mode bits, directories carry [`FileMode::DIR`]
	pub mode: FileMode,
	/// Modification time, `None` when unknown
	pub modified: Option<DateTime<Utc>>,
}

impl FileInfo {
	/// Creates a stat record
	pub fn new(
		name: impl Into<String>,
		size: u64,
		mode: FileMode,
		modified: Option<DateTime<Utc>>,
	) -> Self {
		Self {
			name: name.into(),
			size,
			mode,
			modified,
		}
	}

	/// Whether this record describes a directory
	pub fn is_dir(&self) -> bool {
		self.mode.is_dir()
	}

	pub(crate) fn from_metadata(name: impl Into<String>, metadata: &std::fs::Metadata) -> Self {
		let is_dir = metadata.is_dir();
		let perm = permissions_of(metadata, is_dir);
		Self {
			name: name.into(),
			size: if is_dir { 0 } else { metadata.len() },
			mode: if is_dir {
				FileMode::dir(perm)
			} else {
				FileMode::file(perm)
			},
			modified: metadata.modified().ok().map(DateTime::<Utc>::from),
		}
	}
}

#[cfg(unix)]
fn permissions_of(metadata: &std::fs::Metadata, _is_dir: bool) -> u32 {
	use std::os::unix::fs::PermissionsExt;
	metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permissions_of(metadata: &std::fs::Metadata, is_dir: bool) -> u32 {
	match (is_dir, metadata.permissions().readonly()) {
		(true, _) => 0o755,
		(false, true) => 0o444,
		(false, false) => 0o644,
	}
}

/// Where the bytes of a file live
#[derive(Debug, Clone)]
pub enum Content {
	/// Content held in memory
	Memory(Bytes),
	/// Content read lazily from disk
	Disk {
		/// Host path
		path: PathBuf,
		/// Length at open time
		len: u64,
	},
}

impl Content {
	/// Length of the content in bytes
	pub fn len(&self) -> u64 {
		match self {
			Content::Memory(bytes) => bytes.len() as u64,
			Content::Disk { len, .. } => *len,
		}
	}

	/// Whether the content is empty
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Reads the whole content
	pub async fn read_all(&self) -> io::Result<Bytes> {
		match self {
			Content::Memory(bytes) => Ok(bytes.clone()),
			Content::Disk { path, .. } => tokio::fs::read(path).await.map(Bytes::from),
		}
	}

	/// Opens a reader over `len` bytes starting at `start`
	pub async fn reader(&self, start: u64, len: u64) -> io::Result<ContentReader> {
		let total = self.len();
		if start > total {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				"range start beyond end of content",
			));
		}
		let len = len.min(total - start);

		let source = match self {
			Content::Memory(bytes) => {
				ReaderSource::Memory(bytes.slice(start as usize..(start + len) as usize))
			}
			Content::Disk { path, .. } => {
				let mut file = tokio::fs::File::open(path).await?;
				file.seek(SeekFrom::Start(start)).await?;
				ReaderSource::Disk(file)
			}
		};

		Ok(ContentReader {
			source,
			remaining: len,
		})
	}
}

enum ReaderSource {
	Memory(Bytes),
	Disk(tokio::fs::File),
}

/// Sequential reader over a byte range of a [`Content`]
pub struct ContentReader {
	source: ReaderSource,
	remaining: u64,
}

impl ContentReader {
	/// Bytes not yet read
	pub fn remaining(&self) -> u64 {
		self.remaining
	}

	/// Reads at most `max` bytes, `None` once the range is exhausted
	pub async fn read_chunk(&mut self, max: usize) -> io::Result<Option<Bytes>> {
		if self.remaining == 0 || max == 0 {
			return Ok(None);
		}
		let want = (max as u64).min(self.remaining) as usize;

		let chunk = match &mut self.source {
			ReaderSource::Memory(bytes) => bytes.split_to(want),
			ReaderSource::Disk(file) => {
				let mut buf = vec![0u8; want];
				let n = file.read(&mut buf).await?;
				if n == 0 {
					return Err(io::Error::new(
						io::ErrorKind::UnexpectedEof,
						"file shrank while being served",
					));
				}
				buf.truncate(n);
				Bytes::from(buf)
			}
		};

		self.remaining -= chunk.len() as u64;
		Ok(Some(chunk))
	}
}

/// An opened file
#[derive(Debug, Clone)]
pub struct FileHandle {
	path: String,
	info: FileInfo,
	content: Content,
	cached: bool,
	encoding: Option<Encoding>,
	negotiable: bool,
}

impl FileHandle {
	/// Creates a handle produced by a plain provider
	pub fn new(path: impl Into<String>, info: FileInfo, content: Content) -> Self {
		Self {
			path: path.into(),
			info,
			content,
			cached: false,
			encoding: None,
			negotiable: false,
		}
	}

	pub(crate) fn cached(
		path: impl Into<String>,
		info: FileInfo,
		content: Bytes,
		encoding: Option<Encoding>,
		negotiable: bool,
	) -> Self {
		Self {
			path: path.into(),
			info,
			content: Content::Memory(content),
			cached: true,
			encoding,
			negotiable,
		}
	}

	/// Full slash-separated path
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Base name
	pub fn name(&self) -> &str {
		&self.info.name
	}

	/// Stat record
	pub fn info(&self) -> &FileInfo {
		&self.info
	}

	/// Content of the selected representation
	pub fn content(&self) -> &Content {
		&self.content
	}

	/// Whether this handle was produced by the in-memory cache
	pub fn is_cached(&self) -> bool {
		self.cached
	}

	/// Encoding of the cached representation, `None` for the original bytes
	pub fn content_encoding(&self) -> Option<Encoding> {
		self.encoding
	}

	/// Whether the representation depends on `Accept-Encoding`
	///
	/// True for cached files holding at least one compressed variant, even
	/// when the original bytes were selected.
	pub fn is_negotiable(&self) -> bool {
		self.negotiable
	}

	/// Reads the whole content of the selected representation
	pub async fn read_all(&self) -> Result<Bytes> {
		self.content
			.read_all()
			.await
			.map_err(|err| HttpFsError::from_io(&self.path, err))
	}
}

/// An opened directory
#[derive(Debug, Clone)]
pub struct DirHandle {
	path: String,
	info: FileInfo,
	entries: Arc<[FileInfo]>,
}

impl DirHandle {
	/// Creates a directory handle
	pub fn new(
		path: impl Into<String>,
		info: FileInfo,
		entries: impl Into<Arc<[FileInfo]>>,
	) -> Self {
		Self {
			path: path.into(),
			info,
			entries: entries.into(),
		}
	}

	/// Full slash-separated path
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Base name
	pub fn name(&self) -> &str {
		&self.info.name
	}

	/// Stat record
	pub fn info(&self) -> &FileInfo {
		&self.info
	}

	/// Immediate children
	pub fn entries(&self) -> &[FileInfo] {
		&self.entries
	}
}

/// Result of opening a path
#[derive(Debug, Clone)]
pub enum Entry {
	/// A regular file
	File(FileHandle),
	/// A directory
	Dir(DirHandle),
}

impl Entry {
	/// Stat record of the entry
	pub fn info(&self) -> &FileInfo {
		match self {
			Entry::File(file) => file.info(),
			Entry::Dir(dir) => dir.info(),
		}
	}

	/// Full path of the entry
	pub fn path(&self) -> &str {
		match self {
			Entry::File(file) => file.path(),
			Entry::Dir(dir) => dir.path(),
		}
	}

	/// Base name of the entry
	pub fn name(&self) -> &str {
		&self.info().name
	}

	/// Whether the entry is a directory
	pub fn is_dir(&self) -> bool {
		matches!(self, Entry::Dir(_))
	}
}

/// Hierarchical file provider
#[async_trait]
pub trait FileSystem: Send + Sync {
	/// Opens a file or directory by absolute slash-separated path
	///
	/// # Errors
	///
	/// Returns [`HttpFsError::NotFound`] when the path does not exist.
	async fn open(&self, path: &str) -> Result<Entry>;

	/// Lists the immediate children of a directory
	async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
		match self.open(path).await? {
			Entry::Dir(dir) => Ok(dir.entries().to_vec()),
			Entry::File(_) => Err(HttpFsError::NotADirectory(path.to_string())),
		}
	}

	/// Returns the content-negotiating extension when the provider has one
	fn as_negotiating(&self) -> Option<&dyn NegotiatingFileSystem> {
		None
	}
}

/// Provider extension that picks a pre-encoded representation per request
#[async_trait]
pub trait NegotiatingFileSystem: FileSystem {
	/// Opens `path`, selecting the best stored representation for `accept_encoding`
	///
	/// Returns the entry together with the chosen encoding (`None` = original bytes).
	async fn open_negotiated(
		&self,
		path: &str,
		accept_encoding: &str,
	) -> Result<(Entry, Option<Encoding>)>;
}
