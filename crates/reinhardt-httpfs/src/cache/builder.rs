//! Cache construction
//!
//! The build runs in three steps:
//!
//! 1. Walk the provider depth-first from `/`, collecting every file and
//!    directory. Entries that resolve back to an already visited path (a
//!    directory listing itself, for example) are skipped.
//! 2. Sort the discovered files deepest first and register each one, and then
//!    each walked directory, with its parent. Missing ancestors are created on
//!    the way, so every directory appears exactly once in its parent's listing.
//! 3. Read every file once and compress it with each configured encoding
//!    unless it is smaller than the minimum size or matches the ignore pattern.
//!
//! Any error aborts the build; no partial index is returned.

use super::entry::{DirCacheEntry, FileCacheEntry};
use super::CacheIndex;
use crate::codec::{self, Encoding};
use crate::config::CacheOptions;
use crate::error::Result;
use crate::fs::{Entry, FileHandle, FileInfo, FileMode, FileSystem};
use crate::path;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Walks `fs` and builds a frozen cache index
///
/// # Errors
///
/// Returns the first open, read or compression error encountered.
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::cache::build_index;
/// use reinhardt_httpfs::fs::MemoryFs;
/// use reinhardt_httpfs::{CacheOptions, Encoding};
///
/// # tokio_test::block_on(async {
/// let fs = MemoryFs::new().with_file("/app.js", "console.log(1);\n".repeat(40));
/// let index = build_index(&fs, &CacheOptions::default()).await.unwrap();
///
/// let app = index.file("/app.js").unwrap();
/// assert!(app.has_variant(Encoding::Gzip));
/// assert!(index.dir("/").is_some());
/// # });
/// ```
pub async fn build_index(fs: &dyn FileSystem, options: &CacheOptions) -> Result<CacheIndex> {
	let start = Instant::now();
	tracing::debug!(
		"Building file cache (min size {} bytes, {} encodings)",
		options.compress_min_size,
		options.encodings.len()
	);

	let walk = walk(fs, "/").await?;
	let dirs = build_dirs(&walk);

	let mut files = HashMap::with_capacity(walk.files.len());
	for handle in &walk.files {
		let entry = cache_file(handle, options).await?;
		files.insert(entry.path().to_string(), entry);
	}

	let index = CacheIndex {
		files,
		dirs,
		encodings: options.encodings.clone(),
		elapsed: start.elapsed(),
	};

	tracing::info!(
		"Cached {} files in {} directories in {:?}",
		index.file_count(),
		index.dir_count(),
		index.elapsed
	);

	Ok(index)
}

/// Files and directories discovered by a walk, deepest first
#[derive(Debug, Default)]
pub(crate) struct Walk {
	pub(crate) files: Vec<FileHandle>,
	pub(crate) dirs: Vec<(String, FileInfo)>,
}

/// Depth-first walk of everything below `root`, skipping entries that resolve to visited paths
pub(crate) async fn walk(fs: &dyn FileSystem, root: &str) -> Result<Walk> {
	let mut walk = Walk::default();
	let mut visited: HashSet<String> = HashSet::new();
	let mut stack = vec![root.to_string()];
	visited.insert(root.to_string());

	while let Some(name) = stack.pop() {
		match fs.open(&name).await? {
			Entry::File(handle) => walk.files.push(handle),
			Entry::Dir(dir) => {
				// Children are pushed in reverse so they are visited in listing order.
				for child in dir.entries().iter().rev() {
					let child_path = path::join(&name, &path::to_base_name(&child.name));
					if child_path == name || !visited.insert(child_path.clone()) {
						tracing::trace!("Skipping self-referencing entry {}", child_path);
						continue;
					}
					stack.push(child_path);
				}
				walk.dirs.push((name, dir.info().clone()));
			}
		}
	}

	// Deepest paths first; ties broken by name for a stable layout.
	walk.files.sort_by(|a, b| {
		path::depth(b.path())
			.cmp(&path::depth(a.path()))
			.then_with(|| a.path().cmp(b.path()))
	});
	walk.dirs
		.sort_by(|(a, _), (b, _)| path::depth(b).cmp(&path::depth(a)).then_with(|| a.cmp(b)));

	Ok(walk)
}

struct DirBuilder {
	info: FileInfo,
	children: Vec<FileInfo>,
}

fn build_dirs(walk: &Walk) -> HashMap<String, DirCacheEntry> {
	let walked: HashMap<&str, &FileInfo> = walk
		.dirs
		.iter()
		.map(|(name, info)| (name.as_str(), info))
		.collect();
	let mut dirs: HashMap<String, DirBuilder> = HashMap::new();

	for handle in &walk.files {
		let parent = path::dir(handle.path());
		ensure_dir(&mut dirs, &walked, &parent, handle.info());
		if let Some(dir) = dirs.get_mut(&parent) {
			dir.children.push(child_info(handle.path(), handle.info()));
		}
	}
	for (name, info) in &walk.dirs {
		ensure_dir(&mut dirs, &walked, name, info);
	}

	dirs.into_iter()
		.map(|(name, mut dir)| {
			dir.children.sort_by(|a, b| a.name.cmp(&b.name));
			let entry = DirCacheEntry::new(name.clone(), dir.info, dir.children);
			(name, entry)
		})
		.collect()
}

/// Creates `name` and any missing ancestors, registering each new directory with its parent
fn ensure_dir(
	dirs: &mut HashMap<String, DirBuilder>,
	walked: &HashMap<&str, &FileInfo>,
	name: &str,
	hint: &FileInfo,
) {
	let mut missing = Vec::new();
	let mut current = name.to_string();
	while !dirs.contains_key(&current) {
		let parent = path::dir(&current);
		let is_root = parent == current;
		missing.push(current);
		if is_root {
			break;
		}
		current = parent;
	}

	// Top-down, so the parent exists when a child registers with it.
	for dir_name in missing.into_iter().rev() {
		let info = match walked.get(dir_name.as_str()) {
			Some(info) => FileInfo::new(
				path::base(&dir_name),
				0,
				FileMode::dir(info.mode.permissions()),
				info.modified,
			),
			None => FileInfo::new(path::base(&dir_name), 0, FileMode::dir(0o755), hint.modified),
		};

		let parent_name = path::dir(&dir_name);
		if parent_name != dir_name
			&& let Some(parent) = dirs.get_mut(&parent_name)
		{
			parent.children.push(info.clone());
		}
		dirs.insert(
			dir_name,
			DirBuilder {
				info,
				children: Vec::new(),
			},
		);
	}
}

fn child_info(file_path: &str, info: &FileInfo) -> FileInfo {
	FileInfo::new(path::base(file_path), info.size, info.mode, info.modified)
}

async fn cache_file(handle: &FileHandle, options: &CacheOptions) -> Result<FileCacheEntry> {
	let original: Bytes = handle.read_all().await?;
	let mut info = child_info(handle.path(), handle.info());
	info.size = original.len() as u64;

	let mut entry = FileCacheEntry::new(handle.path().to_string(), info, original.clone());

	if !options.should_compress(handle.path(), original.len() as u64) {
		tracing::trace!("Storing {} uncompressed ({} bytes)", handle.path(), original.len());
		return Ok(entry);
	}

	for encoding in dedup(&options.encodings) {
		let compressed = codec::compress(&original, encoding)?;
		tracing::trace!(
			"Compressed {} with {}: {} -> {} bytes",
			handle.path(),
			encoding,
			original.len(),
			compressed.len()
		);
		entry.insert_variant(encoding, Bytes::from(compressed));
	}

	Ok(entry)
}

fn dedup(encodings: &[Encoding]) -> Vec<Encoding> {
	let mut seen = Vec::with_capacity(encodings.len());
	for encoding in encodings {
		if !seen.contains(encoding) {
			seen.push(*encoding);
		}
	}
	seen
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::MemoryFs;
	use rstest::rstest;

	fn names(index: &CacheIndex, dir: &str) -> Vec<String> {
		index
			.dir(dir)
			.unwrap()
			.children()
			.iter()
			.map(|info| info.name.clone())
			.collect()
	}

	#[rstest]
	#[tokio::test]
	async fn test_directory_tree_is_complete() {
		let fs = MemoryFs::new()
			.with_file("/a/b.txt", "b")
			.with_file("/a/c/d.txt", "d");

		let index = build_index(&fs, &CacheOptions::default()).await.unwrap();

		assert_eq!(names(&index, "/"), vec!["a"]);
		assert_eq!(names(&index, "/a"), vec!["b.txt", "c"]);
		assert_eq!(names(&index, "/a/c"), vec!["d.txt"]);
		assert!(index.dir("/a").unwrap().children()[1].is_dir());
	}

	#[rstest]
	#[tokio::test]
	async fn test_empty_directories_are_listed() {
		let fs = MemoryFs::new().with_file("/a.txt", "a");
		fs.insert_dir("/empty/nested");

		let index = build_index(&fs, &CacheOptions::default()).await.unwrap();

		assert_eq!(names(&index, "/"), vec!["a.txt", "empty"]);
		assert_eq!(names(&index, "/empty"), vec!["nested"]);
		assert!(names(&index, "/empty/nested").is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_self_reference_terminates() {
		let fs = MemoryFs::new()
			.with_self_reference(true)
			.with_file("/a/b.txt", "b");

		let index = build_index(&fs, &CacheOptions::default()).await.unwrap();

		assert_eq!(index.file_count(), 1);
		assert_eq!(names(&index, "/"), vec!["a"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_min_size_boundary() {
		let fs = MemoryFs::new()
			.with_file("/at.txt", "x".repeat(300))
			.with_file("/below.txt", "x".repeat(299));

		let index = build_index(&fs, &CacheOptions::default()).await.unwrap();

		assert!(index.file("/at.txt").unwrap().has_variant(Encoding::Gzip));
		assert_eq!(index.file("/below.txt").unwrap().variants().count(), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_ignored_files_are_not_compressed() {
		let fs = MemoryFs::new().with_file("/photo.jpg", vec![0u8; 10_000]);

		let index = build_index(&fs, &CacheOptions::default()).await.unwrap();

		let photo = index.file("/photo.jpg").unwrap();
		assert_eq!(photo.variants().count(), 0);
		assert_eq!(photo.original().len(), 10_000);
	}

	#[rstest]
	#[tokio::test]
	async fn test_duplicate_encodings_are_compressed_once() {
		let fs = MemoryFs::new().with_file("/app.css", "a{}".repeat(200));
		let options = CacheOptions::new().with_encodings(vec![Encoding::Gzip, Encoding::Gzip]);

		let index = build_index(&fs, &options).await.unwrap();

		assert_eq!(index.file("/app.css").unwrap().variants().count(), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_missing_root_aborts() {
		struct Broken;

		#[async_trait::async_trait]
		impl FileSystem for Broken {
			async fn open(&self, path: &str) -> Result<Entry> {
				Err(crate::error::HttpFsError::NotFound(path.to_string()))
			}
		}

		assert!(build_index(&Broken, &CacheOptions::default()).await.is_err());
	}
}
