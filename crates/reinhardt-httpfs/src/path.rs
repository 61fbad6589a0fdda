//! Slash-separated virtual path helpers
//!
//! All paths handed to a [`FileSystem`](crate::fs::FileSystem) are absolute and
//! use `/` regardless of the host separator.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::borrow::Cow;

/// Characters escaped when a virtual path is placed in a URL
///
/// `?` and `#` must be escaped so they stay part of the path instead of
/// starting a query or fragment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
	.add(b' ')
	.add(b'"')
	.add(b'#')
	.add(b'%')
	.add(b'<')
	.add(b'>')
	.add(b'?')
	.add(b'`')
	.add(b'{')
	.add(b'}');

/// Ensures `name` starts with `/`
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::path::with_leading_slash;
///
/// assert_eq!(with_leading_slash("css/app.css"), "/css/app.css");
/// assert_eq!(with_leading_slash("/index.html"), "/index.html");
/// assert_eq!(with_leading_slash(""), "/");
/// ```
pub fn with_leading_slash(name: &str) -> Cow<'_, str> {
	if name.starts_with('/') {
		Cow::Borrowed(name)
	} else {
		Cow::Owned(format!("/{}", name))
	}
}

/// Converts host separators to `/`
pub fn to_slash(name: &str) -> Cow<'_, str> {
	if name.contains('\\') {
		Cow::Owned(name.replace('\\', "/"))
	} else {
		Cow::Borrowed(name)
	}
}

/// Returns the last element of a provider-reported name
///
/// Providers may report either a base name or a full path (with any separator).
pub fn to_base_name(name: &str) -> String {
	base(&to_slash(name)).to_string()
}

/// Lexically cleans a slash-separated path
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::path::clean;
///
/// assert_eq!(clean("/a/./b/../c/"), "/a/c");
/// assert_eq!(clean("/../a"), "/a");
/// assert_eq!(clean(""), ".");
/// assert_eq!(clean("//"), "/");
/// ```
pub fn clean(path: &str) -> String {
	if path.is_empty() {
		return ".".to_string();
	}

	let rooted = path.starts_with('/');
	let mut parts: Vec<&str> = Vec::new();

	for segment in path.split('/') {
		match segment {
			"" | "." => {}
			".." => {
				if parts.last().is_some_and(|last| *last != "..") {
					parts.pop();
				} else if !rooted {
					parts.push("..");
				}
			}
			other => parts.push(other),
		}
	}

	let joined = parts.join("/");
	match (rooted, joined.is_empty()) {
		(true, _) => format!("/{}", joined),
		(false, true) => ".".to_string(),
		(false, false) => joined,
	}
}

/// Joins path elements and cleans the result
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::path::join;
///
/// assert_eq!(join("/", "a"), "/a");
/// assert_eq!(join("/a/", "b.txt"), "/a/b.txt");
/// assert_eq!(join("/a", ""), "/a");
/// ```
pub fn join(base: &str, name: &str) -> String {
	match (base.is_empty(), name.is_empty()) {
		(true, true) => String::new(),
		(true, false) => clean(name),
		(false, true) => clean(base),
		(false, false) => clean(&format!("{}/{}", base, name)),
	}
}

/// Returns all but the last element of `path`
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::path::dir;
///
/// assert_eq!(dir("/a/b.txt"), "/a");
/// assert_eq!(dir("/a"), "/");
/// assert_eq!(dir("/"), "/");
/// ```
pub fn dir(path: &str) -> String {
	match path.rfind('/') {
		Some(idx) => clean(&path[..=idx]),
		None => ".".to_string(),
	}
}

/// Returns the last element of `path`
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::path::base;
///
/// assert_eq!(base("/a/b.txt"), "b.txt");
/// assert_eq!(base("/a/"), "a");
/// assert_eq!(base("/"), "/");
/// ```
pub fn base(path: &str) -> &str {
	if path.is_empty() {
		return ".";
	}
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() {
		return "/";
	}
	match trimmed.rfind('/') {
		Some(idx) => &trimmed[idx + 1..],
		None => trimmed,
	}
}

/// Number of `/` separators in `path`, used to order paths by depth
pub fn depth(path: &str) -> usize {
	path.bytes().filter(|b| *b == b'/').count()
}

/// Percent-encodes a virtual path for use in a URL, keeping `/` separators
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::path::encode;
///
/// assert_eq!(encode("/docs/my file?.txt"), "/docs/my%20file%3F.txt");
/// assert_eq!(encode("/café"), "/caf%C3%A9");
/// ```
pub fn encode(path: &str) -> Cow<'_, str> {
	utf8_percent_encode(path, PATH_SEGMENT).into()
}

/// Percent-decodes a URL path, `None` when the bytes are not UTF-8
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::path::decode;
///
/// assert_eq!(decode("/docs/my%20file.txt").as_deref(), Some("/docs/my file.txt"));
/// assert_eq!(decode("/%FF"), None);
/// ```
pub fn decode(path: &str) -> Option<Cow<'_, str>> {
	percent_decode_str(path).decode_utf8().ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("/", "/")]
	#[case("/a/b/../../..", "/")]
	#[case("a/../../b", "../b")]
	#[case("/a//b///c", "/a/b/c")]
	#[case("./a", "a")]
	fn test_clean(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(clean(input), expected);
	}

	#[rstest]
	#[case("/app2", "index.html", "/app2/index.html")]
	#[case("/app2/", "/index.html", "/app2/index.html")]
	#[case("/", "../etc/passwd", "/etc/passwd")]
	fn test_join(#[case] base: &str, #[case] name: &str, #[case] expected: &str) {
		assert_eq!(join(base, name), expected);
	}

	#[rstest]
	fn test_to_base_name_handles_windows_separators() {
		assert_eq!(to_base_name("assets\\css\\app.css"), "app.css");
		assert_eq!(to_base_name("/assets/js/app.js"), "app.js");
		assert_eq!(to_base_name("favicon.ico"), "favicon.ico");
	}

	#[rstest]
	#[case("/docs/my file.txt")]
	#[case("/résumé/100% done#1.txt")]
	#[case("/plain/app.css")]
	fn test_encoded_path_decodes_back(#[case] path: &str) {
		let encoded = encode(path);
		assert!(encoded.is_ascii());
		assert!(!encoded.contains(' ') && !encoded.contains('#'));
		assert_eq!(decode(&encoded).unwrap(), path);
	}

	#[rstest]
	fn test_depth() {
		assert_eq!(depth("/"), 1);
		assert_eq!(depth("/a/c/d.txt"), 3);
	}
}
