//! Cache and serving configuration
//!
//! [`CacheOptions`] drives the cache builder, [`ServeOptions`] drives the
//! request pipeline of [`FileServer`](crate::server::FileServer). Both can be
//! built in code or loaded from TOML through [`HttpFsSettings`].

use crate::codec::Encoding;
use crate::error::{HttpFsError, Result};
use crate::listing::DirList;
use crate::message::{Request, Response};
use crate::path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// One byte
pub const B: u64 = 1;
/// 1024 bytes
pub const KB: u64 = B << 10;
/// 1024 kilobytes
pub const MB: u64 = KB << 10;
/// 1024 megabytes
pub const GB: u64 = MB << 10;

/// Default minimum size for a file to be compressed
pub const DEFAULT_COMPRESS_MIN_SIZE: u64 = 300 * B;

/// Default index document
pub const DEFAULT_INDEX_NAME: &str = "/index.html";

/// Already-compressed images and documents, the default compression ignore pattern
pub static IMAGES: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"((.*).pdf|(.*).jpg|(.*).jpeg|(.*).gif|(.*).tif|(.*).tiff)$")
		.expect("IMAGES: invalid regex pattern")
});

/// Common front-end assets (scripts, styles, fonts, icons and images)
///
/// Meant for [`ServeOptions::with_push_targets_regexp`] on single page applications.
pub static MATCH_COMMON_ASSETS: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r"((.*).js|(.*).css|(.*).ico|(.*).png|(.*).ttf|(.*).svg|(.*).webp|(.*).gif)$",
	)
	.expect("MATCH_COMMON_ASSETS: invalid regex pattern")
});

/// Options for building the in-memory cache
#[derive(Debug, Clone)]
pub struct CacheOptions {
	/// Files smaller than this many bytes are stored uncompressed (0 disables the check)
	pub compress_min_size: u64,
	/// Files whose path matches are never compressed
	pub compress_ignore: Option<Regex>,
	/// Encodings produced for every compressible file, in preference order
	pub encodings: Vec<Encoding>,
}

impl Default for CacheOptions {
	fn default() -> Self {
		Self {
			compress_min_size: DEFAULT_COMPRESS_MIN_SIZE,
			compress_ignore: Some(IMAGES.clone()),
			encodings: Encoding::ALL.to_vec(),
		}
	}
}

impl CacheOptions {
	/// Creates the default options
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_httpfs::{CacheOptions, Encoding};
	///
	/// let options = CacheOptions::new()
	///     .with_min_size(1400)
	///     .with_encodings(vec![Encoding::Brotli, Encoding::Gzip]);
	/// assert_eq!(options.compress_min_size, 1400);
	/// assert!(options.compress_ignore.is_some());
	/// ```
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the minimum compressible size
	pub fn with_min_size(mut self, size: u64) -> Self {
		self.compress_min_size = size;
		self
	}

	/// Sets (or clears) the compression ignore pattern
	pub fn with_ignore(mut self, pattern: Option<Regex>) -> Self {
		self.compress_ignore = pattern;
		self
	}

	/// Sets the encodings to produce
	pub fn with_encodings(mut self, encodings: Vec<Encoding>) -> Self {
		self.encodings = encodings;
		self
	}

	/// Reports whether a file of `size` bytes at `path` should be compressed
	pub fn should_compress(&self, path: &str, size: u64) -> bool {
		if self.compress_min_size > 0 && self.compress_min_size > size {
			return false;
		}
		!self
			.compress_ignore
			.as_ref()
			.is_some_and(|pattern| pattern.is_match(path))
	}
}

/// Renames an attachment before it is sent
pub type NameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Per-request access check
///
/// Receives the response under construction, the request and the file's base
/// name. Returning `false` stops processing; the predicate is expected to set
/// its own status on the response.
pub type AllowFn = Arc<dyn Fn(&mut Response, &Request, &str) -> bool + Send + Sync>;

/// Download policy for served files
#[derive(Clone, Default)]
pub struct Attachments {
	/// Serve files with `Content-Disposition: attachment`
	pub enable: bool,
	/// Byte rate limit per second, `0` disables limiting
	pub limit: f64,
	/// Burst size in bytes for the limiter
	pub burst: usize,
	/// Optional rename hook for the downloaded file name
	pub name_fn: Option<NameFn>,
}

impl Attachments {
	/// Enables attachments without a rate limit
	pub fn enabled() -> Self {
		Self {
			enable: true,
			..Self::default()
		}
	}

	/// Limits attachment delivery to `limit` bytes per second with a `burst` bucket
	pub fn with_rate_limit(mut self, limit: f64, burst: usize) -> Self {
		self.limit = limit;
		self.burst = burst;
		self
	}

	/// Sets the rename hook
	pub fn with_name_fn<F>(mut self, name_fn: F) -> Self
	where
		F: Fn(&str) -> String + Send + Sync + 'static,
	{
		self.name_fn = Some(Arc::new(name_fn));
		self
	}

	/// Name sent in `Content-Disposition` for a file called `name`
	pub fn attachment_name(&self, name: &str) -> String {
		match &self.name_fn {
			Some(name_fn) => name_fn(name),
			None => name.to_string(),
		}
	}

	pub(crate) fn is_rate_limited(&self) -> bool {
		self.enable && self.limit > 0.0
	}
}

impl fmt::Debug for Attachments {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Attachments")
			.field("enable", &self.enable)
			.field("limit", &self.limit)
			.field("burst", &self.burst)
			.field("name_fn", &self.name_fn.is_some())
			.finish()
	}
}

/// Options of the request pipeline
#[derive(Clone)]
pub struct ServeOptions {
	/// Document served for directory requests, empty to disable
	pub index_name: String,
	/// Compress responses of non-cached providers on the fly
	pub compress: bool,
	/// List directories without an index document
	pub show_list: bool,
	/// Custom listing renderer, [`PlainDirList`](crate::listing::PlainDirList) when unset
	pub dir_list: Option<Arc<dyn DirList>>,
	/// Download policy
	pub attachments: Attachments,
	/// Per-request access check
	pub allow: Option<AllowFn>,
	/// Request path to assets pushed alongside its index document
	pub push_targets: HashMap<String, Vec<String>>,
	/// Request path to a pattern matched against every file below that directory
	pub push_targets_regexp: HashMap<String, Regex>,
	/// Emit a weak `ETag` derived from modification time and size
	pub etag: bool,
}

impl Default for ServeOptions {
	fn default() -> Self {
		Self {
			index_name: DEFAULT_INDEX_NAME.to_string(),
			compress: true,
			show_list: false,
			dir_list: None,
			attachments: Attachments::default(),
			allow: None,
			push_targets: HashMap::new(),
			push_targets_regexp: HashMap::new(),
			etag: false,
		}
	}
}

impl ServeOptions {
	/// Creates the default options
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_httpfs::ServeOptions;
	///
	/// let options = ServeOptions::new().with_show_list(true).with_index_name("home.html");
	/// let options = options.normalized();
	/// assert_eq!(options.index_name, "/home.html");
	/// assert!(options.compress);
	/// ```
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the index document name
	pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
		self.index_name = name.into();
		self
	}

	/// Enables or disables live compression
	pub fn with_compress(mut self, compress: bool) -> Self {
		self.compress = compress;
		self
	}

	/// Enables or disables directory listing
	pub fn with_show_list(mut self, show_list: bool) -> Self {
		self.show_list = show_list;
		self
	}

	/// Sets a custom listing renderer
	pub fn with_dir_list(mut self, dir_list: impl DirList + 'static) -> Self {
		self.dir_list = Some(Arc::new(dir_list));
		self
	}

	/// Sets the download policy
	pub fn with_attachments(mut self, attachments: Attachments) -> Self {
		self.attachments = attachments;
		self
	}

	/// Sets the access check
	pub fn with_allow<F>(mut self, allow: F) -> Self
	where
		F: Fn(&mut Response, &Request, &str) -> bool + Send + Sync + 'static,
	{
		self.allow = Some(Arc::new(allow));
		self
	}

	/// Adds literal push targets for `request_path`
	pub fn with_push_targets<I, S>(mut self, request_path: impl Into<String>, targets: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.push_targets.insert(
			request_path.into(),
			targets.into_iter().map(Into::into).collect(),
		);
		self
	}

	/// Adds a push pattern for `request_path`
	pub fn with_push_targets_regexp(
		mut self,
		request_path: impl Into<String>,
		pattern: Regex,
	) -> Self {
		self.push_targets_regexp.insert(request_path.into(), pattern);
		self
	}

	/// Enables or disables weak `ETag` generation
	pub fn with_etag(mut self, etag: bool) -> Self {
		self.etag = etag;
		self
	}

	/// Returns the options in canonical form
	///
	/// The index name gains a leading `/` and push target entries use `/`
	/// separators.
	pub fn normalized(mut self) -> Self {
		if !self.index_name.is_empty() {
			self.index_name = path::with_leading_slash(&self.index_name).into_owned();
		}
		for targets in self.push_targets.values_mut() {
			for target in targets.iter_mut() {
				*target = path::to_slash(target).into_owned();
			}
		}
		self
	}
}

impl fmt::Debug for ServeOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServeOptions")
			.field("index_name", &self.index_name)
			.field("compress", &self.compress)
			.field("show_list", &self.show_list)
			.field("dir_list", &self.dir_list.is_some())
			.field("attachments", &self.attachments)
			.field("allow", &self.allow.is_some())
			.field("push_targets", &self.push_targets)
			.field("push_targets_regexp", &self.push_targets_regexp)
			.field("etag", &self.etag)
			.finish()
	}
}

/// Serializable settings, typically read from a `[httpfs]` TOML table
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::HttpFsSettings;
///
/// let settings = HttpFsSettings::from_toml_str(r#"
///     compress_min_size = 1400
///     encodings = ["br", "gzip"]
///     show_list = true
///
///     [push_targets]
///     "/" = ["favicon.ico", "js/main.js"]
/// "#).unwrap();
///
/// let cache = settings.cache_options().unwrap();
/// assert_eq!(cache.compress_min_size, 1400);
/// assert_eq!(cache.encodings.len(), 2);
///
/// let serve = settings.serve_options().unwrap();
/// assert!(serve.show_list);
/// assert_eq!(serve.push_targets["/"].len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpFsSettings {
	/// See [`CacheOptions::compress_min_size`]
	pub compress_min_size: u64,
	/// Ignore pattern; `None` keeps the image preset, an empty string disables it
	pub compress_ignore: Option<String>,
	/// Encoding names (`gzip`, `deflate`, `br`)
	pub encodings: Vec<String>,
	/// See [`ServeOptions::index_name`]
	pub index_name: String,
	/// See [`ServeOptions::compress`]
	pub compress: bool,
	/// See [`ServeOptions::show_list`]
	pub show_list: bool,
	/// See [`ServeOptions::etag`]
	pub etag: bool,
	/// See [`Attachments::enable`]
	pub attachments: bool,
	/// See [`Attachments::limit`]
	pub attachment_limit: f64,
	/// See [`Attachments::burst`]
	pub attachment_burst: usize,
	/// See [`ServeOptions::push_targets`]
	pub push_targets: HashMap<String, Vec<String>>,
	/// Patterns for [`ServeOptions::push_targets_regexp`]
	pub push_targets_regexp: HashMap<String, String>,
}

impl Default for HttpFsSettings {
	fn default() -> Self {
		Self {
			compress_min_size: DEFAULT_COMPRESS_MIN_SIZE,
			compress_ignore: None,
			encodings: Encoding::ALL.iter().map(|e| e.as_str().to_string()).collect(),
			index_name: DEFAULT_INDEX_NAME.to_string(),
			compress: true,
			show_list: false,
			etag: false,
			attachments: false,
			attachment_limit: 0.0,
			attachment_burst: 0,
			push_targets: HashMap::new(),
			push_targets_regexp: HashMap::new(),
		}
	}
}

impl HttpFsSettings {
	/// Parses settings from a TOML document
	///
	/// # Errors
	///
	/// Returns [`HttpFsError::Config`] if the document is malformed.
	pub fn from_toml_str(source: &str) -> Result<Self> {
		toml::from_str(source).map_err(|err| HttpFsError::Config(err.to_string()))
	}

	/// Converts into cache options
	///
	/// # Errors
	///
	/// Returns [`HttpFsError::Config`] for unknown encodings or invalid patterns.
	pub fn cache_options(&self) -> Result<CacheOptions> {
		let encodings = self
			.encodings
			.iter()
			.map(|name| {
				Encoding::from_name(name)
					.ok_or_else(|| HttpFsError::Config(format!("unknown encoding: {}", name)))
			})
			.collect::<Result<Vec<_>>>()?;

		let compress_ignore = match self.compress_ignore.as_deref() {
			None => Some(IMAGES.clone()),
			Some("") => None,
			Some(pattern) => Some(compile(pattern)?),
		};

		Ok(CacheOptions {
			compress_min_size: self.compress_min_size,
			compress_ignore,
			encodings,
		})
	}

	/// Converts into serve options
	///
	/// # Errors
	///
	/// Returns [`HttpFsError::Config`] for invalid push patterns.
	pub fn serve_options(&self) -> Result<ServeOptions> {
		let push_targets_regexp = self
			.push_targets_regexp
			.iter()
			.map(|(request_path, pattern)| Ok((request_path.clone(), compile(pattern)?)))
			.collect::<Result<HashMap<_, _>>>()?;

		let options = ServeOptions {
			index_name: self.index_name.clone(),
			compress: self.compress,
			show_list: self.show_list,
			etag: self.etag,
			attachments: Attachments {
				enable: self.attachments,
				limit: self.attachment_limit,
				burst: self.attachment_burst,
				name_fn: None,
			},
			push_targets: self.push_targets.clone(),
			push_targets_regexp,
			..ServeOptions::default()
		};
		Ok(options.normalized())
	}
}

fn compile(pattern: &str) -> Result<Regex> {
	Regex::new(pattern)
		.map_err(|err| HttpFsError::Config(format!("invalid pattern {:?}: {}", pattern, err)))
}

/// Formats a byte count with SI (1000-based) units
///
/// # Examples
///
/// ```
/// use reinhardt_httpfs::config::format_bytes;
///
/// assert_eq!(format_bytes(999), "999 B");
/// assert_eq!(format_bytes(1500), "1.5 kB");
/// assert_eq!(format_bytes(2_000_000), "2.0 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
	const UNIT: u64 = 1000;
	const PREFIXES: [char; 6] = ['k', 'M', 'G', 'T', 'P', 'E'];

	if bytes < UNIT {
		return format!("{} B", bytes);
	}
	let mut div = UNIT;
	let mut exp = 0;
	let mut n = bytes / UNIT;
	while n >= UNIT {
		div *= UNIT;
		exp += 1;
		n /= UNIT;
	}
	format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("/css/app.css", 300, true)]
	#[case("/css/app.css", 299, false)]
	#[case("/img/logo.jpg", 10_000, false)]
	#[case("/docs/manual.pdf", 10_000, false)]
	fn test_should_compress_default(#[case] path: &str, #[case] size: u64, #[case] expected: bool) {
		assert_eq!(CacheOptions::default().should_compress(path, size), expected);
	}

	#[rstest]
	fn test_zero_min_size_compresses_everything() {
		let options = CacheOptions::new().with_min_size(0).with_ignore(None);
		assert!(options.should_compress("/a.jpg", 0));
	}

	#[rstest]
	fn test_normalized_push_targets() {
		let options = ServeOptions::new()
			.with_index_name("")
			.with_push_targets("/", ["js\\main.js"])
			.normalized();
		assert_eq!(options.index_name, "");
		assert_eq!(options.push_targets["/"], vec!["js/main.js".to_string()]);
	}

	#[rstest]
	fn test_attachment_name_fn() {
		let attachments = Attachments::enabled().with_name_fn(|name| format!("copy-{}", name));
		assert_eq!(attachments.attachment_name("a.zip"), "copy-a.zip");
		assert!(!attachments.is_rate_limited());
	}

	#[rstest]
	fn test_settings_reject_unknown_encoding() {
		let settings = HttpFsSettings {
			encodings: vec!["snappy".to_string()],
			..HttpFsSettings::default()
		};
		assert!(matches!(settings.cache_options(), Err(HttpFsError::Config(_))));
	}

	#[rstest]
	fn test_settings_empty_ignore_disables_preset() {
		let settings = HttpFsSettings::from_toml_str(r#"compress_ignore = """#).unwrap();
		assert!(settings.cache_options().unwrap().compress_ignore.is_none());
	}

	#[rstest]
	fn test_settings_bad_regexp() {
		let settings = HttpFsSettings::from_toml_str(
			r#"
			[push_targets_regexp]
			"/" = "(unclosed"
			"#,
		)
		.unwrap();
		assert!(matches!(settings.serve_options(), Err(HttpFsError::Config(_))));
	}

	#[rstest]
	#[case(0, "0 B")]
	#[case(1000, "1.0 kB")]
	#[case(1_234_567, "1.2 MB")]
	#[case(3 * 1000 * 1000 * 1000, "3.0 GB")]
	fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
		assert_eq!(format_bytes(bytes), expected);
	}

	#[rstest]
	fn test_common_assets_pattern() {
		assert!(MATCH_COMMON_ASSETS.is_match("js/main.js"));
		assert!(MATCH_COMMON_ASSETS.is_match("favicon.ico"));
		assert!(!MATCH_COMMON_ASSETS.is_match("index.html"));
	}
}
