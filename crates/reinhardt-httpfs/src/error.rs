//! Error types for cached file serving

use std::io;

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, HttpFsError>;

/// Errors raised while building the cache or serving a request
#[derive(Debug, thiserror::Error)]
pub enum HttpFsError {
	/// The requested path does not exist in the file system
	#[error("file does not exist: {0}")]
	NotFound(String),

	/// A directory operation was attempted on a file
	#[error("not a directory: {0}")]
	NotADirectory(String),

	/// Underlying storage I/O failure
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	/// A codec failed to compress a file
	#[error("{encoding} compression failed: {source}")]
	Compression {
		/// Content encoding that was being produced
		encoding: &'static str,
		/// Codec error
		#[source]
		source: io::Error,
	},

	/// The encoding name is not known to the codec registry
	#[error("unsupported content encoding: {0}")]
	UnsupportedEncoding(String),

	/// Conditional request could not be evaluated (wrong method, missing header or mod time)
	#[error("precondition failed: {0}")]
	Precondition(&'static str),

	/// `If-Modified-Since` header is not a valid HTTP date
	#[error("invalid HTTP date: {0}")]
	InvalidDate(String),

	/// The request was cancelled while waiting
	#[error("request cancelled")]
	Cancelled,

	/// Rate limiter refused the reservation
	#[error("rate limit: {0}")]
	RateLimit(String),

	/// Invalid configuration
	#[error("configuration error: {0}")]
	Config(String),

	/// Directory listing renderer failure
	#[error("render error: {0}")]
	Render(String),

	/// Server push failure
	#[error("push failed: {0}")]
	Push(String),
}

impl HttpFsError {
	/// Reports whether this error means "the path does not exist"
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_httpfs::HttpFsError;
	///
	/// assert!(HttpFsError::NotFound("/a".into()).is_not_found());
	/// assert!(!HttpFsError::Cancelled.is_not_found());
	/// ```
	pub fn is_not_found(&self) -> bool {
		match self {
			HttpFsError::NotFound(_) => true,
			HttpFsError::Io(err) => err.kind() == io::ErrorKind::NotFound,
			_ => false,
		}
	}

	/// Maps an I/O error for `path` onto the typed not-found variant when applicable
	pub(crate) fn from_io(path: &str, err: io::Error) -> Self {
		if err.kind() == io::ErrorKind::NotFound {
			HttpFsError::NotFound(path.to_string())
		} else {
			HttpFsError::Io(err)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_io_not_found_is_mapped() {
		let err = HttpFsError::from_io("/x", io::Error::new(io::ErrorKind::NotFound, "gone"));
		assert!(matches!(err, HttpFsError::NotFound(ref p) if p == "/x"));
	}

	#[rstest]
	fn test_other_io_errors_are_kept() {
		let err = HttpFsError::from_io(
			"/x",
			io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
		);
		assert!(!err.is_not_found());
		assert!(matches!(err, HttpFsError::Io(_)));
	}
}
