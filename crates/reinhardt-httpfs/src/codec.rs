//! Content codecs and `Accept-Encoding` negotiation
//!
//! The registry knows three encodings:
//!
//! - **gzip** (`Content-Encoding: gzip`)
//! - **deflate** (`Content-Encoding: deflate`)
//! - **brotli** (`Content-Encoding: br`)
//!
//! [`compress`] produces a whole representation up front (used when building the
//! cache) and [`StreamEncoder`] compresses a body chunk by chunk (used for live
//! compression of non-cached providers).

use crate::error::{HttpFsError, Result};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_LGWIN: u32 = 22;
// Lower quality for per-request compression, quality 11 is too slow on the hot path.
const BROTLI_STREAM_QUALITY: u32 = 5;

/// Supported content encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
	/// Gzip (`gzip`)
	Gzip,
	/// Raw deflate (`deflate`)
	Deflate,
	/// Brotli (`br`)
	Brotli,
}

impl Encoding {
	/// All built-in encodings in their default preference order
	pub const ALL: [Encoding; 3] = [Encoding::Gzip, Encoding::Deflate, Encoding::Brotli];

	/// `Content-Encoding` token
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_httpfs::Encoding;
	///
	/// assert_eq!(Encoding::Brotli.as_str(), "br");
	/// ```
	pub const fn as_str(self) -> &'static str {
		match self {
			Encoding::Gzip => "gzip",
			Encoding::Deflate => "deflate",
			Encoding::Brotli => "br",
		}
	}

	/// Parses an encoding name, case-insensitively
	///
	/// Accepts the `brotli` and `x-gzip` aliases.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_httpfs::Encoding;
	///
	/// assert_eq!(Encoding::from_name("BROTLI"), Some(Encoding::Brotli));
	/// assert_eq!(Encoding::from_name("x-gzip"), Some(Encoding::Gzip));
	/// assert_eq!(Encoding::from_name("snappy"), None);
	/// ```
	pub fn from_name(name: &str) -> Option<Self> {
		match name.trim().to_ascii_lowercase().as_str() {
			"gzip" | "x-gzip" => Some(Encoding::Gzip),
			"deflate" => Some(Encoding::Deflate),
			"br" | "brotli" => Some(Encoding::Brotli),
			_ => None,
		}
	}
}

impl fmt::Display for Encoding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Encoding {
	type Err = HttpFsError;

	fn from_str(s: &str) -> Result<Self> {
		Encoding::from_name(s).ok_or_else(|| HttpFsError::UnsupportedEncoding(s.to_string()))
	}
}

/// Compresses `data` with `encoding`
///
/// Output is deterministic for a given input.
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::codec::compress;
/// use reinhardt_httpfs::Encoding;
///
/// let data = "body { color: red; }".repeat(50);
/// let gz = compress(data.as_bytes(), Encoding::Gzip).unwrap();
/// assert!(gz.len() < data.len());
/// ```
pub fn compress(data: &[u8], encoding: Encoding) -> Result<Vec<u8>> {
	let wrap = |source: io::Error| HttpFsError::Compression {
		encoding: encoding.as_str(),
		source,
	};

	match encoding {
		Encoding::Gzip => {
			let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
			encoder.write_all(data).map_err(wrap)?;
			encoder.finish().map_err(wrap)
		}
		Encoding::Deflate => {
			let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
			encoder.write_all(data).map_err(wrap)?;
			encoder.finish().map_err(wrap)
		}
		Encoding::Brotli => {
			let mut compressed = Vec::new();
			{
				let mut encoder = brotli::CompressorWriter::new(
					&mut compressed,
					BROTLI_BUFFER_SIZE,
					BROTLI_QUALITY,
					BROTLI_LGWIN,
				);
				encoder.write_all(data).map_err(wrap)?;
				encoder.flush().map_err(wrap)?;
			}
			Ok(compressed)
		}
	}
}

/// Parsed `Accept-Encoding` entry
#[derive(Debug, Clone)]
struct AcceptEncoding {
	coding: String,
	quality: f32,
}

impl AcceptEncoding {
	/// Parses an entry such as `gzip;q=0.8` or `br`
	fn parse(s: &str) -> Option<Self> {
		let mut parts = s.split(';');
		let coding = parts.next()?.trim().to_ascii_lowercase();
		if coding.is_empty() {
			return None;
		}

		let quality = parts
			.filter_map(|param| param.trim().strip_prefix("q="))
			.find_map(|q| q.trim().parse::<f32>().ok())
			.unwrap_or(1.0)
			.clamp(0.0, 1.0);

		Some(Self { coding, quality })
	}
}

/// Selects the best encoding from `offers` for a client's `Accept-Encoding`
///
/// Higher q-values win, ties keep the client's order, `q=0` refuses a coding,
/// `*` matches the first offer not explicitly refused and `identity` means no
/// compression. Returns `None` when nothing acceptable is offered.
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::codec::negotiate;
/// use reinhardt_httpfs::Encoding;
///
/// let offers = [Encoding::Gzip, Encoding::Brotli];
/// assert_eq!(negotiate("gzip, br;q=0.9", &offers), Some(Encoding::Gzip));
/// assert_eq!(negotiate("br, gzip", &offers), Some(Encoding::Brotli));
/// assert_eq!(negotiate("deflate", &offers), None);
/// assert_eq!(negotiate("", &offers), None);
/// ```
pub fn negotiate(accept_encoding: &str, offers: &[Encoding]) -> Option<Encoding> {
	if offers.is_empty() {
		return None;
	}

	let mut accepted: Vec<AcceptEncoding> = accept_encoding
		.split(',')
		.filter_map(AcceptEncoding::parse)
		.collect();

	let refused: Vec<Encoding> = accepted
		.iter()
		.filter(|entry| entry.quality == 0.0)
		.filter_map(|entry| Encoding::from_name(&entry.coding))
		.collect();

	// Stable sort keeps the client's order among equal q-values.
	accepted.sort_by(|a, b| b.quality.total_cmp(&a.quality));

	for entry in accepted.iter().filter(|entry| entry.quality > 0.0) {
		match entry.coding.as_str() {
			"*" => {
				return offers
					.iter()
					.copied()
					.find(|offer| !refused.contains(offer));
			}
			"identity" => return None,
			coding => {
				if let Some(encoding) = Encoding::from_name(coding)
					&& offers.contains(&encoding)
				{
					return Some(encoding);
				}
			}
		}
	}

	None
}

/// Shared sink the incremental encoders write into
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
	fn take(&self) -> Bytes {
		Bytes::from(std::mem::take(&mut *self.0.lock()))
	}
}

impl Write for SharedBuf {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

enum Inner {
	Gzip(GzEncoder<SharedBuf>),
	Deflate(DeflateEncoder<SharedBuf>),
	Brotli(Box<brotli::CompressorWriter<SharedBuf>>),
}

/// Incremental compressor for streamed response bodies
///
/// Each [`write`](StreamEncoder::write) returns whatever compressed bytes are
/// ready after flushing, so a slow (rate-limited) source still produces a
/// steady stream of output.
pub struct StreamEncoder {
	encoding: Encoding,
	sink: SharedBuf,
	inner: Option<Inner>,
}

impl StreamEncoder {
	/// Creates an encoder producing `encoding`
	pub fn new(encoding: Encoding) -> Self {
		let sink = SharedBuf::default();
		let inner = match encoding {
			Encoding::Gzip => Inner::Gzip(GzEncoder::new(sink.clone(), Compression::default())),
			Encoding::Deflate => {
				Inner::Deflate(DeflateEncoder::new(sink.clone(), Compression::default()))
			}
			Encoding::Brotli => Inner::Brotli(Box::new(brotli::CompressorWriter::new(
				sink.clone(),
				BROTLI_BUFFER_SIZE,
				BROTLI_STREAM_QUALITY,
				BROTLI_LGWIN,
			))),
		};
		Self {
			encoding,
			sink,
			inner: Some(inner),
		}
	}

	/// Encoding produced by this encoder
	pub fn encoding(&self) -> Encoding {
		self.encoding
	}

	/// Compresses `chunk` and returns the output flushed so far
	pub fn write(&mut self, chunk: &[u8]) -> Result<Bytes> {
		let encoding = self.encoding.as_str();
		let wrap = |source: io::Error| HttpFsError::Compression { encoding, source };

		match self.inner.as_mut() {
			Some(Inner::Gzip(w)) => w.write_all(chunk).and_then(|_| w.flush()),
			Some(Inner::Deflate(w)) => w.write_all(chunk).and_then(|_| w.flush()),
			Some(Inner::Brotli(w)) => w.write_all(chunk).and_then(|_| w.flush()),
			None => Err(io::Error::other("encoder already finished")),
		}
		.map_err(wrap)?;

		Ok(self.sink.take())
	}

	/// Finishes the stream and returns the trailing bytes
	pub fn finish(&mut self) -> Result<Bytes> {
		let encoding = self.encoding.as_str();
		let wrap = |source: io::Error| HttpFsError::Compression { encoding, source };

		match self.inner.take() {
			Some(Inner::Gzip(w)) => {
				w.finish().map_err(wrap)?;
			}
			Some(Inner::Deflate(w)) => {
				w.finish().map_err(wrap)?;
			}
			// Brotli writes its final block when the writer is released.
			Some(Inner::Brotli(w)) => {
				w.into_inner();
			}
			None => {}
		}

		Ok(self.sink.take())
	}
}
