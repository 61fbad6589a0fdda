//! `If-Modified-Since` / `Last-Modified` handling

use crate::error::{HttpFsError, Result};
use crate::message::Response;
use chrono::{DateTime, Duration, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, LAST_MODIFIED};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::time::SystemTime;

/// Reports whether a resource changed since the client's `If-Modified-Since`
///
/// Returns `Ok(false)` only when the header proves the client copy is current:
/// the modification time is strictly before the header time plus one second,
/// which absorbs the sub-second precision HTTP dates cannot carry.
///
/// # Errors
///
/// - [`HttpFsError::Precondition`] when the check does not apply (method other
///   than GET/HEAD, no header, unknown modification time)
/// - [`HttpFsError::InvalidDate`] when the header is not an HTTP date
///
/// Callers treat both as "modified".
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use http::{HeaderMap, Method};
/// use reinhardt_httpfs::conditional::check_if_modified_since;
///
/// let modified = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
/// let mut headers = HeaderMap::new();
/// headers.insert("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
///
/// let changed = check_if_modified_since(&Method::GET, &headers, Some(modified)).unwrap();
/// assert!(!changed);
/// ```
pub fn check_if_modified_since(
	method: &Method,
	headers: &HeaderMap,
	modified: Option<DateTime<Utc>>,
) -> Result<bool> {
	if method != Method::GET && method != Method::HEAD {
		return Err(HttpFsError::Precondition("method"));
	}

	let since = headers
		.get(IF_MODIFIED_SINCE)
		.map(|value| value.to_str().unwrap_or_default())
		.unwrap_or_default();
	let Some(modified) = modified.filter(|_| !since.is_empty()) else {
		return Err(HttpFsError::Precondition("zero time"));
	};

	let since: DateTime<Utc> = httpdate::parse_http_date(since)
		.map(DateTime::<Utc>::from)
		.map_err(|_| HttpFsError::InvalidDate(since.to_string()))?;

	Ok(modified >= since + Duration::seconds(1))
}

/// Turns `response` into a `304 Not Modified`
///
/// Representation headers are dropped; `Last-Modified` is kept only when no
/// `ETag` is present.
pub fn write_not_modified(response: &mut Response) {
	response.headers.remove(CONTENT_TYPE);
	response.headers.remove(CONTENT_LENGTH);
	if response.headers.contains_key(ETAG) {
		response.headers.remove(LAST_MODIFIED);
	}
	response.status = StatusCode::NOT_MODIFIED;
	response.clear_body();
}

/// Sets `Last-Modified` when the modification time is known
pub fn write_last_modified(headers: &mut HeaderMap, modified: Option<DateTime<Utc>>) {
	if let Some(modified) = modified
		&& let Ok(value) = HeaderValue::from_str(&format_http_date(modified))
	{
		headers.insert(LAST_MODIFIED, value);
	}
}

/// Formats a timestamp as an IMF-fixdate
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use reinhardt_httpfs::conditional::format_http_date;
///
/// let time = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
/// assert_eq!(format_http_date(time), "Wed, 21 Oct 2015 07:28:00 GMT");
/// ```
pub fn format_http_date(time: DateTime<Utc>) -> String {
	httpdate::fmt_http_date(SystemTime::from(time))
}
