//! Final delivery of file content
//!
//! [`serve_content`] answers a request for a single file: it fills in
//! `Content-Type` and `Last-Modified`, answers validators with
//! `304 Not Modified`, honors single `bytes=` ranges and streams the body,
//! optionally through a rate limiter and a live compressor.

use crate::codec::{Encoding, StreamEncoder};
use crate::conditional::{check_if_modified_since, write_last_modified, write_not_modified};
use crate::error::Result;
use crate::fs::{Content, ContentReader};
use crate::message::{Body, Request, Response};
use crate::rate::{RateLimitedReader, TokenBucket};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use http::header::{
	ACCEPT_RANGES, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG,
	HeaderValue, IF_NONE_MATCH, IF_RANGE, LAST_MODIFIED, RANGE, VARY,
};
use http::{Method, StatusCode};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Bytes left unescaped in an RFC 5987 `filename*` value
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'!')
	.remove(b'#')
	.remove(b'$')
	.remove(b'&')
	.remove(b'+')
	.remove(b'-')
	.remove(b'.')
	.remove(b'^')
	.remove(b'_')
	.remove(b'`')
	.remove(b'|')
	.remove(b'~');

/// Size of the chunks read from the content while streaming
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Optional decorations applied while streaming the body
#[derive(Debug, Clone, Default)]
pub struct Delivery {
	/// Paces the body through a token bucket bound to the request's cancellation
	pub limiter: Option<TokenBucket>,
	/// Compresses the body on the fly
	pub encoder: Option<Encoding>,
}

impl Delivery {
	/// Plain delivery without decorations
	pub fn plain() -> Self {
		Self::default()
	}
}

/// Outcome of evaluating a `Range` header against a content length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
	/// Serve the whole content
	Full,
	/// Serve `len` bytes starting at `start`
	Partial {
		/// First byte
		start: u64,
		/// Number of bytes
		len: u64,
	},
	/// The range cannot be satisfied
	Unsatisfiable,
}

/// Evaluates a `Range` header
///
/// Only a single `bytes=` range is honored; multiple ranges and other units
/// fall back to the full content.
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::content::{parse_range, ByteRange};
///
/// assert_eq!(parse_range("bytes=0-9", 100), ByteRange::Partial { start: 0, len: 10 });
/// assert_eq!(parse_range("bytes=-10", 100), ByteRange::Partial { start: 90, len: 10 });
/// assert_eq!(parse_range("bytes=90-", 100), ByteRange::Partial { start: 90, len: 10 });
/// assert_eq!(parse_range("bytes=100-", 100), ByteRange::Unsatisfiable);
/// assert_eq!(parse_range("bytes=0-1,5-6", 100), ByteRange::Full);
/// ```
pub fn parse_range(header: &str, size: u64) -> ByteRange {
	let Some(spec) = header.trim().strip_prefix("bytes=") else {
		return ByteRange::Full;
	};
	if spec.contains(',') {
		return ByteRange::Full;
	}
	let Some((first, last)) = spec.trim().split_once('-') else {
		return ByteRange::Unsatisfiable;
	};
	let (first, last) = (first.trim(), last.trim());

	if first.is_empty() {
		// Suffix range: the last N bytes.
		return match last.parse::<u64>() {
			Ok(0) | Err(_) => ByteRange::Unsatisfiable,
			Ok(n) => {
				let len = n.min(size);
				if len == 0 {
					ByteRange::Unsatisfiable
				} else {
					ByteRange::Partial {
						start: size - len,
						len,
					}
				}
			}
		};
	}

	let Ok(start) = first.parse::<u64>() else {
		return ByteRange::Unsatisfiable;
	};
	if start >= size {
		return ByteRange::Unsatisfiable;
	}
	let end = if last.is_empty() {
		size - 1
	} else {
		match last.parse::<u64>() {
			Ok(end) if end >= start => end.min(size - 1),
			_ => return ByteRange::Unsatisfiable,
		}
	};
	ByteRange::Partial {
		start,
		len: end - start + 1,
	}
}

/// `Content-Disposition` value offering `name` as a download
///
/// Names made of token characters keep the compact `attachment;filename=<name>`
/// form. Anything else gets a quoted ASCII fallback plus an RFC 6266
/// `filename*` parameter carrying the UTF-8 name.
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::content::content_disposition;
///
/// assert_eq!(content_disposition("report.pdf"), "attachment;filename=report.pdf");
/// assert_eq!(
/// 	content_disposition("résumé 1.pdf"),
/// 	"attachment; filename=\"r_sum_ 1.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%201.pdf"
/// );
/// ```
pub fn content_disposition(name: &str) -> String {
	if !name.is_empty() && name.bytes().all(is_token_byte) {
		return format!("attachment;filename={}", name);
	}

	let fallback: String = name
		.chars()
		.map(|c| match c {
			' ' => ' ',
			'"' | '\\' => '_',
			c if c.is_ascii_graphic() => c,
			_ => '_',
		})
		.collect();
	format!(
		"attachment; filename=\"{}\"; filename*=UTF-8''{}",
		fallback,
		utf8_percent_encode(name, ATTR_CHAR)
	)
}

fn is_token_byte(byte: u8) -> bool {
	byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

/// Weak validator derived from the modification time and size
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use reinhardt_httpfs::content::weak_etag;
///
/// let modified = Utc.timestamp_opt(0x5f5e100, 0).unwrap();
/// assert_eq!(weak_etag(Some(modified), 0x400), "W/\"5f5e100-400\"");
/// ```
pub fn weak_etag(modified: Option<DateTime<Utc>>, size: u64) -> String {
	let secs = modified.map(|m| m.timestamp().max(0)).unwrap_or(0);
	format!("W/\"{:x}-{:x}\"", secs, size)
}

fn etag_matches(current: &str, header: &str) -> bool {
	let strip = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
	let current = strip(current);
	header
		.split(',')
		.any(|candidate| candidate.trim() == "*" || strip(candidate) == current)
}

fn header_str<'a>(request: &'a Request, name: http::header::HeaderName) -> Option<&'a str> {
	request.headers.get(name).and_then(|value| value.to_str().ok())
}

/// Reports whether the client's copy is current, per `If-None-Match` or `If-Modified-Since`
fn is_not_modified(
	request: &Request,
	response: &Response,
	modified: Option<DateTime<Utc>>,
) -> bool {
	if request.method != Method::GET && request.method != Method::HEAD {
		return false;
	}
	if let Some(if_none_match) = header_str(request, IF_NONE_MATCH) {
		return response
			.header(ETAG.as_str())
			.is_some_and(|etag| etag_matches(etag, if_none_match));
	}
	// Unparseable dates and missing preconditions both mean "modified".
	matches!(
		check_if_modified_since(&request.method, &request.headers, modified),
		Ok(false)
	)
}

/// `If-Range` allows the range only when it names the current validator
fn if_range_allows(request: &Request, response: &Response) -> bool {
	let Some(if_range) = header_str(request, IF_RANGE) else {
		return true;
	};
	let if_range = if_range.trim();
	if if_range.starts_with('"') || if_range.starts_with("W/") {
		return response.header(ETAG.as_str()) == Some(if_range) && !if_range.starts_with("W/");
	}
	response.header(LAST_MODIFIED.as_str()) == Some(if_range)
}

/// Writes `content` (named `name`, last changed at `modified`) into `response`
///
/// An `ETag` already present on the response is used for `If-None-Match`.
///
/// # Errors
///
/// Returns an error when the content cannot be opened; errors raised while
/// the body streams (I/O, cancellation) end the stream instead.
pub async fn serve_content(
	request: &Request,
	response: &mut Response,
	name: &str,
	modified: Option<DateTime<Utc>>,
	content: Content,
	delivery: Delivery,
) -> Result<()> {
	if !response.headers.contains_key(CONTENT_TYPE) {
		let mime = mime_guess::from_path(name).first_or_octet_stream();
		if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
			response.headers.insert(CONTENT_TYPE, value);
		}
	}
	write_last_modified(&mut response.headers, modified);

	if is_not_modified(request, response, modified) {
		tracing::debug!("Not modified: {}", request.path());
		write_not_modified(response);
		return Ok(());
	}

	let size = content.len();
	let mut start = 0;
	let mut len = size;

	match delivery.encoder {
		Some(encoding) => {
			response
				.headers
				.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
			response
				.headers
				.append(VARY, HeaderValue::from_static("Accept-Encoding"));
			response.headers.remove(CONTENT_LENGTH);
		}
		None => {
			response
				.headers
				.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

			if let Some(range) = header_str(request, RANGE)
				&& if_range_allows(request, response)
			{
				match parse_range(range, size) {
					ByteRange::Full => {}
					ByteRange::Partial {
						start: range_start,
						len: range_len,
					} => {
						start = range_start;
						len = range_len;
						response.status = StatusCode::PARTIAL_CONTENT;
						response.set_header(
							CONTENT_RANGE.as_str(),
							&format!("bytes {}-{}/{}", start, start + len - 1, size),
						);
					}
					ByteRange::Unsatisfiable => {
						response.status = StatusCode::RANGE_NOT_SATISFIABLE;
						response.set_header(CONTENT_RANGE.as_str(), &format!("bytes */{}", size));
						response.headers.remove(CONTENT_TYPE);
						response.clear_body();
						return Ok(());
					}
				}
			}
			response.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
		}
	}

	if request.is_head() {
		response.clear_body();
		return Ok(());
	}

	if delivery.limiter.is_none()
		&& delivery.encoder.is_none()
		&& let Content::Memory(bytes) = &content
	{
		response.body = Body::Full(bytes.slice(start as usize..(start + len) as usize));
		return Ok(());
	}

	let reader = content.reader(start, len).await?;
	let source = match delivery.limiter {
		Some(limiter) => Source::Limited(RateLimitedReader::new(
			reader,
			limiter,
			request.cancel.clone(),
		)),
		None => Source::Plain(reader),
	};
	response.body = body_stream(source, delivery.encoder.map(StreamEncoder::new));
	Ok(())
}

enum Source {
	Plain(ContentReader),
	Limited(RateLimitedReader),
}

impl Source {
	async fn next(&mut self) -> Result<Option<Bytes>> {
		match self {
			Source::Plain(reader) => Ok(reader.read_chunk(CHUNK_SIZE).await?),
			Source::Limited(reader) => reader.read_chunk(CHUNK_SIZE).await,
		}
	}
}

struct StreamState {
	source: Source,
	encoder: Option<StreamEncoder>,
	done: bool,
}

fn body_stream(source: Source, encoder: Option<StreamEncoder>) -> Body {
	let state = StreamState {
		source,
		encoder,
		done: false,
	};
	Body::Stream(Box::pin(stream::try_unfold(state, next_chunk)))
}

async fn next_chunk(mut state: StreamState) -> Result<Option<(Bytes, StreamState)>> {
	while !state.done {
		match state.source.next().await? {
			Some(chunk) => {
				let out = match state.encoder.as_mut() {
					Some(encoder) => encoder.write(&chunk)?,
					None => chunk,
				};
				if !out.is_empty() {
					return Ok(Some((out, state)));
				}
			}
			None => {
				state.done = true;
				if let Some(encoder) = state.encoder.as_mut() {
					let trailer = encoder.finish()?;
					if !trailer.is_empty() {
						return Ok(Some((trailer, state)));
					}
				}
			}
		}
	}
	Ok(None)
}
