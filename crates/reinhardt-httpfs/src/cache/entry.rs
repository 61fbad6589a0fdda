//! Cached file and directory entries

use crate::codec::Encoding;
use crate::fs::{DirHandle, FileHandle, FileInfo};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// A cached file with its original bytes and compressed variants
#[derive(Debug, Clone)]
pub struct FileCacheEntry {
	path: String,
	info: FileInfo,
	original: Bytes,
	variants: HashMap<Encoding, Bytes>,
}

impl FileCacheEntry {
	pub(crate) fn new(path: String, info: FileInfo, original: Bytes) -> Self {
		Self {
			path,
			info,
			original,
			variants: HashMap::new(),
		}
	}

	pub(crate) fn insert_variant(&mut self, encoding: Encoding, data: Bytes) {
		self.variants.insert(encoding, data);
	}

	/// Absolute path
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

	/// Uncompressed bytes
	pub fn original(&self) -> &Bytes {
		&self.original
	}

	/// Stored bytes for `encoding` (`None` selects the original)
	pub fn variant(&self, encoding: Option<Encoding>) -> Option<&Bytes> {
		match encoding {
			None => Some(&self.original),
			Some(encoding) => self.variants.get(&encoding),
		}
	}

	/// Whether a compressed variant exists for `encoding`
	pub fn has_variant(&self, encoding: Encoding) -> bool {
		self.variants.contains_key(&encoding)
	}

	/// Compressed variants
	pub fn variants(&self) -> impl Iterator<Item = (Encoding, &Bytes)> {
		self.variants.iter().map(|(encoding, data)| (*encoding, data))
	}

	/// Opens the `encoding` variant, falling back to the original when it is missing
	pub fn handle(&self, encoding: Option<Encoding>) -> FileHandle {
		let selected = encoding.filter(|encoding| self.has_variant(*encoding));
		let data = self.variant(selected).unwrap_or(&self.original).clone();
		FileHandle::cached(
			self.path.clone(),
			self.info.clone(),
			data,
			selected,
			!self.variants.is_empty(),
		)
	}
}

/// A cached directory and its immediate children
#[derive(Debug, Clone)]
pub struct DirCacheEntry {
	path: String,
	info: FileInfo,
	children: Arc<[FileInfo]>,
}

impl DirCacheEntry {
	pub(crate) fn new(path: String, info: FileInfo, children: Vec<FileInfo>) -> Self {
		Self {
			path,
			info,
			children: children.into(),
		}
	}

	/// Absolute path
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
	pub fn children(&self) -> &[FileInfo] {
		&self.children
	}

	/// Opens the directory
	pub fn handle(&self) -> DirHandle {
		DirHandle::new(self.path.clone(), self.info.clone(), Arc::clone(&self.children))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::FileMode;
	use rstest::rstest;

	#[rstest]
	fn test_handle_falls_back_to_original() {
		let info = FileInfo::new("a.txt", 3, FileMode::file(0o644), None);
		let mut entry = FileCacheEntry::new("/a.txt".into(), info, Bytes::from_static(b"abc"));
		entry.insert_variant(Encoding::Gzip, Bytes::from_static(b"gz"));

		let gzip = entry.handle(Some(Encoding::Gzip));
		assert!(gzip.is_cached());
		assert_eq!(gzip.content_encoding(), Some(Encoding::Gzip));

		let brotli = entry.handle(Some(Encoding::Brotli));
		assert_eq!(brotli.content_encoding(), None);
		assert_eq!(brotli.content().len(), 3);
		assert!(brotli.is_negotiable());
	}

	#[rstest]
	fn test_handle_without_variants_is_not_negotiable() {
		let info = FileInfo::new("a.txt", 3, FileMode::file(0o644), None);
		let entry = FileCacheEntry::new("/a.txt".into(), info, Bytes::from_static(b"abc"));

		assert!(!entry.handle(Some(Encoding::Gzip)).is_negotiable());
	}
}
