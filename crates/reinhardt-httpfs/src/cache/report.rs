//! Summary of what the cache holds

use super::CacheIndex;
use crate::codec::Encoding;
use crate::config::format_bytes;
use std::fmt;
use std::time::Duration;

/// Totals for one encoding
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingTotal {
	/// The encoding
	pub encoding: Encoding,
	/// Sum of the compressed variant sizes
	pub size: u64,
	/// `1 - compressed / original` over the compressed files
	pub reduced_ratio: f64,
}

/// Size and compression figures of a built cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheReport {
	/// Number of cached files
	pub files: usize,
	/// Files stored with at least one compressed variant
	pub compressed_files: usize,
	/// Sum of the original sizes
	pub total_size: u64,
	/// Per-encoding totals, in configured order
	pub per_encoding: Vec<EncodingTotal>,
	/// Build time
	pub elapsed: Duration,
}

impl CacheReport {
	/// Computes the report from an index
	pub fn from_index(index: &CacheIndex) -> Self {
		let mut total_size = 0u64;
		let mut compressed_files = 0usize;
		let mut per_encoding: Vec<(Encoding, u64, u64)> = Vec::new();

		for file in index.files() {
			let original = file.original().len() as u64;
			total_size += original;

			let mut compressed = false;
			for (encoding, data) in file.variants() {
				compressed = true;
				match per_encoding.iter_mut().find(|(e, _, _)| *e == encoding) {
					Some((_, size, source)) => {
						*size += data.len() as u64;
						*source += original;
					}
					None => per_encoding.push((encoding, data.len() as u64, original)),
				}
			}
			if compressed {
				compressed_files += 1;
			}
		}

		let order = |encoding: &Encoding| {
			index
				.encodings()
				.iter()
				.position(|e| e == encoding)
				.unwrap_or(usize::MAX)
		};
		per_encoding.sort_by_key(|(encoding, _, _)| order(encoding));

		Self {
			files: index.file_count(),
			compressed_files,
			total_size,
			per_encoding: per_encoding
				.into_iter()
				.map(|(encoding, size, source)| EncodingTotal {
					encoding,
					size,
					reduced_ratio: if source == 0 {
						0.0
					} else {
						1.0 - size as f64 / source as f64
					},
				})
				.collect(),
			elapsed: index.elapsed(),
		}
	}
}

impl fmt::Display for CacheReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(
			f,
			"Compressed and cached [{}/{}] files in {:?}",
			self.compressed_files, self.files, self.elapsed
		)?;
		write!(f, "Total size: {}", format_bytes(self.total_size))?;
		for total in &self.per_encoding {
			write!(
				f,
				"\n{:<7} ({}) [{:.2}%]",
				total.encoding.as_str(),
				format_bytes(total.size),
				total.reduced_ratio * 100.0
			)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::cache::CachedFs;
	use crate::codec::Encoding;
	use crate::config::CacheOptions;
	use crate::fs::MemoryFs;
	use rstest::rstest;

	#[rstest]
	#[tokio::test]
	async fn test_report_totals() {
		let source = MemoryFs::new()
			.with_file("/a.css", "a { color: red }\n".repeat(100))
			.with_file("/small.txt", "tiny");
		let options = CacheOptions::new().with_encodings(vec![Encoding::Brotli, Encoding::Gzip]);
		let cached = CachedFs::build(&source, &options).await.unwrap();

		let report = cached.report();

		assert_eq!(report.files, 2);
		assert_eq!(report.compressed_files, 1);
		assert_eq!(report.total_size, 1704);
		assert_eq!(report.per_encoding.len(), 2);
		assert_eq!(report.per_encoding[0].encoding, Encoding::Brotli);
		assert!(report.per_encoding.iter().all(|t| t.reduced_ratio > 0.5));

		let text = report.to_string();
		assert!(text.contains("[1/2]"));
		assert!(text.contains("gzip"));
	}
}
