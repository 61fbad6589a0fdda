//! In-memory provider

use super::{Content, DirHandle, Entry, FileHandle, FileInfo, FileMode, FileSystem};
use crate::error::{HttpFsError, Result};
use crate::path;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct MemoryFile {
	data: Bytes,
	mode: FileMode,
	modified: Option<DateTime<Utc>>,
}

/// File system held entirely in memory
///
/// Directories are implied by the paths of inserted files; empty ones can be
/// added with [`MemoryFs::insert_dir`].
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::fs::{FileSystem, MemoryFs};
///
/// # tokio_test::block_on(async {
/// let fs = MemoryFs::new()
///     .with_file("/index.html", "<h1>hi</h1>")
///     .with_file("/css/app.css", "body {}");
///
/// let entries = fs.read_dir("/").await.unwrap();
/// assert_eq!(entries.len(), 2);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFs {
	files: Arc<RwLock<HashMap<String, MemoryFile>>>,
	dirs: Arc<RwLock<BTreeSet<String>>>,
	modified: Option<DateTime<Utc>>,
	self_reference: bool,
}

impl MemoryFs {
	/// Creates an empty tree whose entries are stamped with the current time
	pub fn new() -> Self {
		Self {
			files: Arc::new(RwLock::new(HashMap::new())),
			dirs: Arc::new(RwLock::new(BTreeSet::from(["/".to_string()]))),
			modified: Some(Utc::now()),
			self_reference: false,
		}
	}

	/// Sets the modification time applied to entries inserted afterwards
	pub fn with_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
		self.modified = modified;
		self
	}

	/// Makes every directory list itself as a `.` child
	///
	/// Mimics misconfigured providers whose listings loop back to the directory.
	pub fn with_self_reference(mut self, enabled: bool) -> Self {
		self.self_reference = enabled;
		self
	}

	/// Adds a file, builder style
	pub fn with_file(self, name: &str, data: impl Into<Bytes>) -> Self {
		self.insert(name, data);
		self
	}

	/// Adds or replaces a file
	pub fn insert(&self, name: &str, data: impl Into<Bytes>) {
		let name = path::clean(&path::with_leading_slash(&path::to_slash(name)));
		let mut dir = path::dir(&name);
		{
			let mut dirs = self.dirs.write();
			loop {
				dirs.insert(dir.clone());
				if dir == "/" {
					break;
				}
				dir = path::dir(&dir);
			}
		}
		self.files.write().insert(
			name,
			MemoryFile {
				data: data.into(),
				mode: FileMode::file(0o644),
				modified: self.modified,
			},
		);
	}

	/// Adds an (empty) directory and its ancestors
	pub fn insert_dir(&self, name: &str) {
		let mut dir = path::clean(&path::with_leading_slash(&path::to_slash(name)));
		let mut dirs = self.dirs.write();
		loop {
			dirs.insert(dir.clone());
			if dir == "/" {
				break;
			}
			dir = path::dir(&dir);
		}
	}

	/// Removes a file
	pub fn remove(&self, name: &str) -> Option<Bytes> {
		let name = path::clean(&path::with_leading_slash(name));
		self.files.write().remove(&name).map(|file| file.data)
	}

	fn dir_info(&self, name: &str) -> FileInfo {
		FileInfo::new(path::base(name), 0, FileMode::dir(0o755), self.modified)
	}

	fn children(&self, dir: &str) -> Vec<FileInfo> {
		let mut children: BTreeMap<String, FileInfo> = BTreeMap::new();

		for sub in self.dirs.read().iter() {
			if sub != dir && path::dir(sub) == dir {
				let base = path::base(sub).to_string();
				children.insert(base, self.dir_info(sub));
			}
		}
		for (name, file) in self.files.read().iter() {
			if path::dir(name) == dir {
				let base = path::base(name).to_string();
				children.insert(
					base.clone(),
					FileInfo::new(base, file.data.len() as u64, file.mode, file.modified),
				);
			}
		}

		let mut entries: Vec<FileInfo> = children.into_values().collect();
		if self.self_reference {
			entries.push(FileInfo::new(".", 0, FileMode::dir(0o755), self.modified));
		}
		entries
	}
}

impl Default for MemoryFs {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl FileSystem for MemoryFs {
	async fn open(&self, name: &str) -> Result<Entry> {
		let name = path::clean(&path::with_leading_slash(&path::to_slash(name)));

		let file = self.files.read().get(&name).cloned();
		if let Some(file) = file {
			let info = FileInfo::new(
				path::base(&name),
				file.data.len() as u64,
				file.mode,
				file.modified,
			);
			return Ok(Entry::File(FileHandle::new(
				name,
				info,
				Content::Memory(file.data),
			)));
		}

		if self.dirs.read().contains(&name) {
			let children = self.children(&name);
			return Ok(Entry::Dir(DirHandle::new(
				name.clone(),
				self.dir_info(&name),
				children,
			)));
		}

		Err(HttpFsError::NotFound(name))
	}
}
