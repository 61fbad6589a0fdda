//! Shared fixtures for reinhardt-httpfs integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use reinhardt_httpfs::fs::MemoryFs;
use reinhardt_httpfs::{HttpFsError, Pusher};
use std::fs;
use std::path::Path;
use tempfile::TempDir as TempDirType;

/// Temporary asset tree on disk
pub struct AssetDir {
	inner: TempDirType,
}

impl AssetDir {
	fn new(temp_dir: TempDirType) -> Self {
		Self { inner: temp_dir }
	}

	pub fn path(&self) -> &Path {
		self.inner.path()
	}
}

/// Highly compressible text of roughly `size` bytes
pub fn large_text(size: usize) -> String {
	"body { color: red; }\n".repeat(size / 21 + 1)[..size].to_string()
}

/// Fixed modification time used by the in-memory trees
pub fn fixed_time() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Creates an asset tree on disk
///
/// ```text
/// index.html
/// app.css         (large)
/// app.js          (large)
/// small.txt       (below the compression threshold)
/// logo.png        (large, ignored by the image preset)
/// docs/readme.txt
/// docs/guide/intro.txt
/// empty/
/// ```
pub fn asset_dir() -> AssetDir {
	let temp_dir = TempDirType::new().unwrap();
	let root = temp_dir.path();

	fs::write(root.join("index.html"), "<html><body>home</body></html>").unwrap();
	fs::write(root.join("app.css"), large_text(4096)).unwrap();
	fs::write(root.join("app.js"), "console.log('test');\n".repeat(200)).unwrap();
	fs::write(root.join("small.txt"), "small content").unwrap();
	fs::write(root.join("logo.png"), vec![0u8; 2048]).unwrap();

	fs::create_dir_all(root.join("docs/guide")).unwrap();
	fs::write(root.join("docs/readme.txt"), large_text(1000)).unwrap();
	fs::write(root.join("docs/guide/intro.txt"), "intro").unwrap();

	fs::create_dir(root.join("empty")).unwrap();

	AssetDir::new(temp_dir)
}

/// Creates an in-memory asset tree stamped with [`fixed_time`]
///
/// ```text
/// /index.html
/// /app2/index.html
/// /app2/main.js
/// /app2/style.css
/// /app2/img/logo.png
/// /docs/a.txt
/// /docs/b.txt
/// /files/report.pdf
/// ```
pub fn memory_assets() -> MemoryFs {
	MemoryFs::new()
		.with_modified(Some(fixed_time()))
		.with_file("/index.html", "<h1>root</h1>")
		.with_file("/app2/index.html", "<h1>app2</h1>")
		.with_file("/app2/main.js", "console.log('main');\n".repeat(50))
		.with_file("/app2/style.css", large_text(1200))
		.with_file("/app2/img/logo.png", vec![1u8; 64])
		.with_file("/docs/a.txt", "a")
		.with_file("/docs/b.txt", "b")
		.with_file("/files/report.pdf", "%PDF-1.4 report")
}

/// Records pushed targets, optionally failing from the `fail_at`-th push on
#[derive(Default)]
pub struct RecordingPusher {
	pushed: Mutex<Vec<String>>,
	fail_at: Option<usize>,
}

impl RecordingPusher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn failing_at(index: usize) -> Self {
		Self {
			pushed: Mutex::new(Vec::new()),
			fail_at: Some(index),
		}
	}

	pub fn pushed(&self) -> Vec<String> {
		self.pushed.lock().clone()
	}
}

#[async_trait]
impl Pusher for RecordingPusher {
	async fn push(&self, target: &str) -> reinhardt_httpfs::Result<()> {
		let mut pushed = self.pushed.lock();
		if self.fail_at == Some(pushed.len()) {
			return Err(HttpFsError::Push(format!("refused {}", target)));
		}
		pushed.push(target.to_string());
		Ok(())
	}
}
