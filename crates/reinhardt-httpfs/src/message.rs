//! Request and response types used by the file server
//!
//! These are transport-agnostic; [`crate::service`] converts them to and from
//! hyper's types.

use crate::error::{HttpFsError, Result};
use crate::path;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use http::header::{ACCEPT_ENCODING, HeaderName, HeaderValue, LOCATION};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::borrow::Cow;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Server push capability of the transport (HTTP/2 `PUSH_PROMISE`)
#[async_trait]
pub trait Pusher: Send + Sync {
	/// Initiates a push of `target`, an absolute request path
	async fn push(&self, target: &str) -> Result<()>;
}

/// Incoming request
#[derive(Clone)]
pub struct Request {
	/// HTTP method
	pub method: Method,
	/// Request target
	pub uri: Uri,
	/// Protocol version
	pub version: Version,
	/// Request headers
	pub headers: HeaderMap,
	/// Fires when the client goes away
	pub cancel: CancellationToken,
	pusher: Option<Arc<dyn Pusher>>,
}

impl Request {
	/// Creates a request with a fresh cancellation token and no push support
	///
	/// # Examples
	///
	/// ```
	/// use http::{HeaderMap, Method, Uri, Version};
	/// use reinhardt_httpfs::Request;
	///
	/// let request = Request::new(
	///     Method::GET,
	///     Uri::from_static("/app/index.html?x=1"),
	///     Version::HTTP_11,
	///     HeaderMap::new(),
	/// );
	/// assert_eq!(request.path(), "/app/index.html");
	/// assert_eq!(request.query(), Some("x=1"));
	/// ```
	pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap) -> Self {
		Self {
			method,
			uri,
			version,
			headers,
			cancel: CancellationToken::new(),
			pusher: None,
		}
	}

	/// Shorthand for a bodyless `GET` of `uri`
	///
	/// An unparseable `uri` falls back to `/`.
	pub fn get(uri: &str) -> Self {
		let uri = uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
		Self::new(Method::GET, uri, Version::HTTP_11, HeaderMap::new())
	}

	/// Adds a header, builder style
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		if let (Ok(name), Ok(value)) = (
			HeaderName::from_bytes(name.as_bytes()),
			HeaderValue::from_str(value),
		) {
			self.headers.insert(name, value);
		}
		self
	}

	/// Replaces the method, builder style
	pub fn with_method(mut self, method: Method) -> Self {
		self.method = method;
		self
	}

	/// Binds the request to an existing cancellation token
	pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;
		self
	}

	/// Attaches the transport's push capability
	pub fn with_pusher(mut self, pusher: Arc<dyn Pusher>) -> Self {
		self.pusher = Some(pusher);
		self
	}

	/// Push capability, `None` when the transport cannot push
	pub fn pusher(&self) -> Option<&Arc<dyn Pusher>> {
		self.pusher.as_ref()
	}

	/// Path component of the URI, still percent-encoded
	pub fn path(&self) -> &str {
		self.uri.path()
	}

	/// Percent-decoded path, `None` when it does not decode to UTF-8
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_httpfs::Request;
	///
	/// let request = Request::get("/docs/my%20file.txt?x=1");
	/// assert_eq!(request.decoded_path().as_deref(), Some("/docs/my file.txt"));
	/// ```
	pub fn decoded_path(&self) -> Option<Cow<'_, str>> {
		path::decode(self.uri.path())
	}

	/// Raw query string
	pub fn query(&self) -> Option<&str> {
		self.uri.query()
	}

	/// `Accept-Encoding` header, empty when absent
	pub fn accept_encoding(&self) -> &str {
		self.headers
			.get(ACCEPT_ENCODING)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
	}

	/// Whether this is a `HEAD` request
	pub fn is_head(&self) -> bool {
		self.method == Method::HEAD
	}
}

impl fmt::Debug for Request {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Request")
			.field("method", &self.method)
			.field("uri", &self.uri)
			.field("version", &self.version)
			.field("headers", &self.headers)
			.field("pusher", &self.pusher.is_some())
			.finish()
	}
}

/// Boxed stream of body chunks
pub type StreamBody = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Response body
#[derive(Default)]
pub enum Body {
	/// No body
	#[default]
	Empty,
	/// Whole body in memory
	Full(Bytes),
	/// Body produced incrementally
	Stream(StreamBody),
}

impl Body {
	/// Whether the body is known to be empty
	pub fn is_empty(&self) -> bool {
		match self {
			Body::Empty => true,
			Body::Full(bytes) => bytes.is_empty(),
			Body::Stream(_) => false,
		}
	}
}

impl fmt::Debug for Body {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Body::Empty => f.write_str("Empty"),
			Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
			Body::Stream(_) => f.write_str("Stream"),
		}
	}
}

/// Outgoing response
#[derive(Debug)]
pub struct Response {
	/// Status code
	pub status: StatusCode,
	/// Response headers
	pub headers: HeaderMap,
	/// Response body
	pub body: Body,
}

impl Response {
	/// Creates an empty response with `status`
	///
	/// # Examples
	///
	/// ```
	/// use http::StatusCode;
	/// use reinhardt_httpfs::Response;
	///
	/// let response = Response::new(StatusCode::OK);
	/// assert_eq!(response.status, StatusCode::OK);
	/// assert!(response.body.is_empty());
	/// ```
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			headers: HeaderMap::new(),
			body: Body::Empty,
		}
	}

	/// `200 OK`
	pub fn ok() -> Self {
		Self::new(StatusCode::OK)
	}

	/// `404 Not Found`
	pub fn not_found() -> Self {
		Self::new(StatusCode::NOT_FOUND)
	}

	/// `400 Bad Request`
	pub fn bad_request() -> Self {
		Self::new(StatusCode::BAD_REQUEST)
	}

	/// `500 Internal Server Error`
	pub fn internal_server_error() -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR)
	}

	/// `301 Moved Permanently` to `location`
	///
	/// # Examples
	///
	/// ```
	/// use http::StatusCode;
	/// use reinhardt_httpfs::Response;
	///
	/// let response = Response::permanent_redirect("/app/?x=1");
	/// assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
	/// assert_eq!(response.headers["location"], "/app/?x=1");
	/// ```
	pub fn permanent_redirect(location: impl AsRef<str>) -> Self {
		let mut response = Self::new(StatusCode::MOVED_PERMANENTLY);
		if let Ok(value) = HeaderValue::from_str(location.as_ref()) {
			response.headers.insert(LOCATION, value);
		}
		response
	}

	/// Sets a full body
	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = Body::Full(body.into());
		self
	}

	/// Adds a header, ignoring invalid names or values
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		self.set_header(name, value);
		self
	}

	/// Sets a header in place, ignoring invalid names or values
	pub fn set_header(&mut self, name: &str, value: &str) {
		if let (Ok(name), Ok(value)) = (
			HeaderName::from_bytes(name.as_bytes()),
			HeaderValue::from_str(value),
		) {
			self.headers.insert(name, value);
		}
	}

	/// Replaces the body with [`Body::Empty`]
	pub fn clear_body(&mut self) {
		self.body = Body::Empty;
	}

	/// Header value as a string
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Collects the body into memory
	///
	/// # Errors
	///
	/// Returns the first error produced by a streamed body.
	pub async fn into_bytes(self) -> Result<Bytes> {
		match self.body {
			Body::Empty => Ok(Bytes::new()),
			Body::Full(bytes) => Ok(bytes),
			Body::Stream(mut stream) => {
				let mut buf = BytesMut::new();
				while let Some(chunk) = stream.next().await {
					buf.extend_from_slice(&chunk?);
				}
				Ok(buf.freeze())
			}
		}
	}
}

impl From<HttpFsError> for Response {
	fn from(err: HttpFsError) -> Self {
		if err.is_not_found() {
			Response::not_found()
		} else {
			Response::internal_server_error()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::stream;
	use rstest::rstest;

	#[rstest]
	fn test_accept_encoding_defaults_to_empty() {
		let request = Request::get("/a.css");
		assert_eq!(request.accept_encoding(), "");

		let request = request.with_header("accept-encoding", "gzip, br");
		assert_eq!(request.accept_encoding(), "gzip, br");
	}

	#[rstest]
	#[tokio::test]
	async fn test_into_bytes_collects_stream() {
		let chunks = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
		let mut response = Response::ok();
		response.body = Body::Stream(Box::pin(stream::iter(chunks)));

		assert_eq!(response.into_bytes().await.unwrap(), "abcd");
	}

	#[rstest]
	#[tokio::test]
	async fn test_into_bytes_surfaces_stream_error() {
		let chunks = vec![Ok(Bytes::from_static(b"ab")), Err(HttpFsError::Cancelled)];
		let mut response = Response::ok();
		response.body = Body::Stream(Box::pin(stream::iter(chunks)));

		assert!(matches!(
			response.into_bytes().await,
			Err(HttpFsError::Cancelled)
		));
	}

	#[rstest]
	fn test_error_maps_to_status() {
		let not_found: Response = HttpFsError::NotFound("/x".into()).into();
		assert_eq!(not_found.status, StatusCode::NOT_FOUND);

		let internal: Response = HttpFsError::Render("boom".into()).into();
		assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
	}
}
