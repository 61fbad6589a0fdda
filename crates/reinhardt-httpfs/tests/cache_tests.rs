//! Cache builder and cached provider tests


use fixtures::{asset_dir, large_text, memory_assets};
use flate2::read::GzDecoder;
use reinhardt_httpfs::cache::{CachedFs, build_index};
use reinhardt_httpfs::fs::{DirFs, Entry, FileSystem, MemoryFs, NegotiatingFileSystem};
use reinhardt_httpfs::{CacheOptions, Encoding};
use rstest::rstest;
use std::io::Read;

fn decompress(data: &[u8], encoding: Encoding) -> Vec<u8> {
	let mut out = Vec::new();
	match encoding {
		Encoding::Gzip => {
			GzDecoder::new(data).read_to_end(&mut out).unwrap();
		}
		Encoding::Deflate => {
			flate2::read::DeflateDecoder::new(data)
				.read_to_end(&mut out)
				.unwrap();
		}
		Encoding::Brotli => {
			brotli::Decompressor::new(data, 4096)
				.read_to_end(&mut out)
				.unwrap();
		}
	}
	out
}

#[rstest]
#[tokio::test]
async fn test_disk_tree_is_cached_completely() {
	let assets = asset_dir();
	let source = DirFs::new(assets.path()).unwrap();

	let index = build_index(&source, &CacheOptions::default()).await.unwrap();

	let mut files: Vec<&str> = index.files().map(|f| f.path()).collect();
	files.sort_unstable();
	assert_eq!(
		files,
		vec![
			"/app.css",
			"/app.js",
			"/docs/guide/intro.txt",
			"/docs/readme.txt",
			"/index.html",
			"/logo.png",
			"/small.txt",
		]
	);

	let root: Vec<&str> = index
		.dir("/")
		.unwrap()
		.children()
		.iter()
		.map(|c| c.name.as_str())
		.collect();
	assert_eq!(
		root,
		vec![
			"app.css",
			"app.js",
			"docs",
			"empty",
			"index.html",
			"logo.png",
			"small.txt"
		]
	);
	assert!(index.dir("/empty").unwrap().children().is_empty());
	assert_eq!(index.dir("/docs/guide").unwrap().children().len(), 1);
}

#[rstest]
#[case(Encoding::Gzip)]
#[case(Encoding::Deflate)]
#[case(Encoding::Brotli)]
#[tokio::test]
async fn test_variants_decompress_to_original(#[case] encoding: Encoding) {
	let assets = asset_dir();
	let source = DirFs::new(assets.path()).unwrap();
	let options = CacheOptions::new().with_encodings(vec![encoding]);

	let index = build_index(&source, &options).await.unwrap();

	let css = index.file("/app.css").unwrap();
	let variant = css.variant(Some(encoding)).unwrap();
	assert!(variant.len() < css.original().len());
	assert_eq!(decompress(variant, encoding), css.original().to_vec());
}

#[rstest]
#[tokio::test]
async fn test_thresholds_and_ignore_pattern() {
	let assets = asset_dir();
	let source = DirFs::new(assets.path()).unwrap();

	let index = build_index(&source, &CacheOptions::default()).await.unwrap();

	// Below the default 300 byte threshold.
	assert_eq!(index.file("/small.txt").unwrap().variants().count(), 0);
	assert_eq!(index.file("/docs/guide/intro.txt").unwrap().variants().count(), 0);
	// Matched by the image preset.
	assert_eq!(index.file("/logo.png").unwrap().variants().count(), 0);
	// Large text gets every encoding.
	assert_eq!(
		index.file("/app.js").unwrap().variants().count(),
		Encoding::ALL.len()
	);
}

#[rstest]
#[tokio::test]
async fn test_zero_min_size_compresses_everything_not_ignored() {
	let source = MemoryFs::new()
		.with_file("/a.txt", "a")
		.with_file("/b.gif", "gif");
	let options = CacheOptions::new().with_min_size(0);

	let index = build_index(&source, &options).await.unwrap();

	assert!(index.file("/a.txt").unwrap().has_variant(Encoding::Gzip));
	assert!(!index.file("/b.gif").unwrap().has_variant(Encoding::Gzip));
}

#[rstest]
#[tokio::test]
async fn test_rebuild_yields_identical_index() {
	let source = memory_assets();
	let options = CacheOptions::default();

	let first = build_index(&source, &options).await.unwrap();
	let second = build_index(&source, &options).await.unwrap();

	assert_eq!(first.file_count(), second.file_count());
	assert_eq!(first.dir_count(), second.dir_count());
	for file in first.files() {
		let other = second.file(file.path()).unwrap();
		assert_eq!(file.original(), other.original());
		for (encoding, data) in file.variants() {
			assert_eq!(other.variant(Some(encoding)), Some(data));
		}
	}
}

#[rstest]
#[tokio::test]
async fn test_cached_provider_serves_original_and_variants() {
	let source = MemoryFs::new().with_file("/style.css", large_text(2000));
	let cached = CachedFs::build(&source, &CacheOptions::default()).await.unwrap();

	let Entry::File(plain) = cached.open("/style.css").await.unwrap() else {
		panic!("expected a file");
	};
	assert_eq!(plain.read_all().await.unwrap(), large_text(2000));
	assert_eq!(plain.info().size, 2000);

	let (entry, encoding) = cached
		.open_negotiated("/style.css", "gzip;q=0.5, br;q=0.9")
		.await
		.unwrap();
	assert_eq!(encoding, Some(Encoding::Brotli));
	let Entry::File(encoded) = entry else {
		panic!("expected a file");
	};
	let body = encoded.read_all().await.unwrap();
	assert_eq!(decompress(&body, Encoding::Brotli), large_text(2000).into_bytes());
	// Metadata keeps describing the original.
	assert_eq!(encoded.info().size, 2000);
}

#[rstest]
#[tokio::test]
async fn test_cache_survives_source_changes() {
	let source = memory_assets();
	let cached = CachedFs::build(&source, &CacheOptions::default()).await.unwrap();

	source.remove("/docs/a.txt");
	source.insert("/docs/new.txt", "new");

	assert!(cached.open("/docs/a.txt").await.is_ok());
	assert!(cached.open("/docs/new.txt").await.unwrap_err().is_not_found());
}

#[rstest]
#[tokio::test]
async fn test_report_counts_compressed_files() {
	let source = memory_assets();
	let cached = CachedFs::build(&source, &CacheOptions::default()).await.unwrap();

	let report = cached.report();

	assert_eq!(report.files, 8);
	// main.js and style.css exceed the threshold; logo.png is ignored.
	assert_eq!(report.compressed_files, 2);
	assert_eq!(report.per_encoding.len(), Encoding::ALL.len());
	assert!(report.to_string().starts_with("Compressed and cached [2/8] files"));
}
