//! Physical directory provider

use super::{Content, DirHandle, Entry, FileHandle, FileInfo, FileSystem};
use crate::error::{HttpFsError, Result};
use crate::path;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Serves files from a directory on disk
///
/// Request paths are cleaned before being joined to the root, so `..`
/// segments can never escape it.
///
/// # Examples
///
/// ```rust,no_run
/// use reinhardt_httpfs::fs::{DirFs, FileSystem};
///
/// # async fn example() -> reinhardt_httpfs::Result<()> {
/// let assets = DirFs::new("./assets")?;
/// let entry = assets.open("/index.html").await?;
/// assert!(!entry.is_dir());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DirFs {
	root: PathBuf,
}

impl DirFs {
	/// Creates a provider rooted at `root`
	///
	/// # Errors
	///
	/// Returns [`HttpFsError::Config`] if `root` is not an existing directory.
	pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		if !root.is_dir() {
			return Err(HttpFsError::Config(format!(
				"root is not a directory: {}",
				root.display()
			)));
		}
		Ok(Self { root })
	}

	/// Root directory on disk
	pub fn root(&self) -> &std::path::Path {
		&self.root
	}

	fn host_path(&self, name: &str) -> (String, PathBuf) {
		let cleaned = path::clean(&path::with_leading_slash(&path::to_slash(name)));
		let relative = cleaned.trim_start_matches('/');
		let host = if relative.is_empty() {
			self.root.clone()
		} else {
			self.root.join(relative)
		};
		(cleaned, host)
	}
}

#[async_trait]
impl FileSystem for DirFs {
	async fn open(&self, name: &str) -> Result<Entry> {
		let (virtual_path, host) = self.host_path(name);

		let metadata = fs::metadata(&host)
			.await
			.map_err(|err| HttpFsError::from_io(&virtual_path, err))?;
		let info = FileInfo::from_metadata(path::base(&virtual_path), &metadata);

		if !metadata.is_dir() {
			let len = metadata.len();
			return Ok(Entry::File(FileHandle::new(
				virtual_path,
				info,
				Content::Disk { path: host, len },
			)));
		}

		let mut children = Vec::new();
		let mut read_dir = fs::read_dir(&host)
			.await
			.map_err(|err| HttpFsError::from_io(&virtual_path, err))?;
		while let Some(child) = read_dir.next_entry().await? {
			let child_name = child.file_name().to_string_lossy().into_owned();
			// Follow symlinks so linked assets are served like regular files.
			match fs::metadata(child.path()).await {
				Ok(child_meta) => children.push(FileInfo::from_metadata(child_name, &child_meta)),
				Err(err) => {
					tracing::warn!("Skipping unreadable entry {}: {}", child.path().display(), err);
				}
			}
		}
		children.sort_by(|a, b| a.name.cmp(&b.name));

		Ok(Entry::Dir(DirHandle::new(virtual_path, info, children)))
	}
}
