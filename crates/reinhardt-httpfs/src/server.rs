//! Request pipeline serving a [`FileSystem`]
//!
//! For every request [`FileServer::handle`]:
//!
//! 1. opens the path, negotiating a stored encoding when the provider supports it
//! 2. substitutes the index document for directories that have one
//! 3. lists (or hides) directories without an index document
//! 4. redirects explicit index document requests to their directory
//! 5. runs the access check
//! 6. applies the attachment policy and its rate limit
//! 7. selects the content encoding
//! 8. pushes the configured assets alongside index documents
//! 9. delivers the content through [`serve_content`]

use crate::cache::builder::walk;
use crate::codec::{self, Encoding};
use crate::conditional::{check_if_modified_since, write_last_modified, write_not_modified};
use crate::config::ServeOptions;
use crate::content::{Delivery, content_disposition, serve_content, weak_etag};
use crate::error::Result;
use crate::fs::{DirHandle, Entry, FileHandle, FileSystem};
use crate::listing::{DirList, PlainDirList};
use crate::message::{Request, Response};
use crate::path;
use crate::rate::TokenBucket;
use http::header::{CONTENT_DISPOSITION, CONTENT_ENCODING, ETAG, HeaderValue, VARY};
use std::sync::Arc;

/// HTTP handler serving files and directories
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use reinhardt_httpfs::fs::MemoryFs;
/// use reinhardt_httpfs::{FileServer, Request, ServeOptions};
///
/// # tokio_test::block_on(async {
/// let assets = MemoryFs::new().with_file("/app/index.html", "<h1>app</h1>");
/// let server = FileServer::new(assets, ServeOptions::default());
///
/// let response = server.handle(Request::get("/app/")).await;
/// assert_eq!(response.status, StatusCode::OK);
/// assert_eq!(response.into_bytes().await.unwrap(), "<h1>app</h1>");
///
/// let response = server.handle(Request::get("/app/index.html?x=1")).await;
/// assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
/// assert_eq!(response.header("location"), Some("/app/?x=1"));
/// # });
/// ```
#[derive(Clone)]
pub struct FileServer {
	fs: Arc<dyn FileSystem>,
	options: ServeOptions,
	dir_list: Arc<dyn DirList>,
}

impl FileServer {
	/// Creates a server over `fs`
	pub fn new(fs: impl FileSystem + 'static, options: ServeOptions) -> Self {
		Self::from_arc(Arc::new(fs), options)
	}

	/// Creates a server over a shared provider
	pub fn from_arc(fs: Arc<dyn FileSystem>, options: ServeOptions) -> Self {
		let options = options.normalized();
		let dir_list = options
			.dir_list
			.clone()
			.unwrap_or_else(|| Arc::new(PlainDirList));
		Self {
			fs,
			options,
			dir_list,
		}
	}

	/// Effective options
	pub fn options(&self) -> &ServeOptions {
		&self.options
	}

	/// The served provider
	pub fn file_system(&self) -> &Arc<dyn FileSystem> {
		&self.fs
	}

	async fn open(&self, name: &str, request: &Request) -> Result<(Entry, Option<Encoding>)> {
		match self.fs.as_negotiating() {
			Some(negotiating) => {
				negotiating
					.open_negotiated(name, request.accept_encoding())
					.await
			}
			None => Ok((self.fs.open(name).await?, None)),
		}
	}

	/// Answers one request
	pub async fn handle(&self, request: Request) -> Response {
		let Some(decoded) = request.decoded_path() else {
			tracing::debug!("Rejecting undecodable path {}", request.path());
			return Response::bad_request();
		};
		let name = path::with_leading_slash(&decoded).into_owned();
		let index_name = self.options.index_name.as_str();

		let (entry, negotiated) = match self.open(&name, &request).await {
			Ok(opened) => opened,
			Err(err) => {
				if err.is_not_found() {
					tracing::debug!("Not found: {}", name);
				} else {
					tracing::error!("Failed to open {}: {}", name, err);
				}
				return err.into();
			}
		};

		let (file, negotiated, index_dir) = match entry {
			Entry::File(file) => (file, negotiated, None),
			Entry::Dir(dir) => {
				let index = if index_name.is_empty() {
					None
				} else {
					let index_path = format!("{}{}", name.trim_end_matches('/'), index_name);
					match self.open(&index_path, &request).await {
						Ok((Entry::File(file), encoding)) => Some((file, encoding)),
						_ => None,
					}
				};
				match index {
					Some((file, encoding)) => (file, encoding, Some(dir)),
					None => return self.serve_dir(&request, &dir),
				}
			}
		};
		let index_found = index_dir.is_some();

		if !index_name.is_empty() && name.ends_with(index_name) {
			let dir = &name[..name.len() - index_name.len()];
			let mut location = format!("{}/", path::encode(dir));
			if let Some(query) = request.query().filter(|query| !query.is_empty()) {
				location.push('?');
				location.push_str(query);
			}
			tracing::debug!("Redirecting {} to {}", name, location);
			return Response::permanent_redirect(location);
		}

		let mut response = Response::ok();
		if let Some(allow) = &self.options.allow
			&& !allow(&mut response, &request, file.name())
		{
			return response;
		}

		let mut delivery = Delivery::plain();
		let attachments = &self.options.attachments;
		if !index_found && attachments.enable {
			let dest = attachments.attachment_name(file.name());
			match HeaderValue::from_str(&content_disposition(&dest)) {
				Ok(value) => {
					response.headers.insert(CONTENT_DISPOSITION, value);
				}
				Err(err) => {
					tracing::error!("Invalid attachment name {:?}: {}", dest, err);
					return Response::internal_server_error();
				}
			}

			if attachments.is_rate_limited() {
				match TokenBucket::new(attachments.limit, attachments.burst) {
					Ok(limiter) => delivery.limiter = Some(limiter),
					Err(err) => {
						tracing::error!("Invalid attachment rate limit: {}", err);
						return Response::internal_server_error();
					}
				}
			}
		}

		if file.is_cached() {
			if let Some(encoding) = negotiated.or(file.content_encoding()) {
				response
					.headers
					.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
			}
			if file.is_negotiable() {
				response
					.headers
					.append(VARY, HeaderValue::from_static("Accept-Encoding"));
			}
		} else if self.options.compress {
			delivery.encoder = codec::negotiate(request.accept_encoding(), &Encoding::ALL);
		}

		if let Some(dir) = index_dir.as_ref()
			&& !attachments.enable
		{
			self.push_assets(&request, &name, dir).await;
		}

		self.serve_file(&request, response, &file, delivery).await
	}

	fn serve_dir(&self, request: &Request, dir: &DirHandle) -> Response {
		if !self.options.show_list {
			tracing::debug!("Directory listing disabled: {}", dir.path());
			return Response::not_found();
		}

		let mut response = Response::ok();
		let modified = dir.info().modified;
		if let Ok(false) = check_if_modified_since(&request.method, &request.headers, modified) {
			write_not_modified(&mut response);
			return response;
		}
		write_last_modified(&mut response.headers, modified);

		match self
			.dir_list
			.render(&mut response, request, &self.options, dir.name(), dir)
		{
			Ok(()) => response,
			Err(err) => {
				tracing::error!("Failed to render listing of {}: {}", dir.path(), err);
				Response::internal_server_error()
			}
		}
	}

	async fn serve_file(
		&self,
		request: &Request,
		mut response: Response,
		file: &FileHandle,
		delivery: Delivery,
	) -> Response {
		let info = file.info();
		if self.options.etag
			&& let Ok(value) = HeaderValue::from_str(&weak_etag(info.modified, info.size))
		{
			response.headers.insert(ETAG, value);
		}

		match serve_content(
			request,
			&mut response,
			file.name(),
			info.modified,
			file.content().clone(),
			delivery,
		)
		.await
		{
			Ok(()) => response,
			Err(err) => {
				tracing::error!("Failed to serve {}: {}", file.path(), err);
				err.into()
			}
		}
	}

	/// Pushes the assets configured for an index request
	///
	/// The first failed push stops all remaining pushes; the response itself is unaffected.
	async fn push_assets(&self, request: &Request, name: &str, dir: &DirHandle) {
		let Some(pusher) = request.pusher() else {
			return;
		};

		let mut targets: Vec<String> = Vec::new();
		if let Some(assets) = self.options.push_targets.get(name) {
			targets.extend(assets.iter().map(|asset| {
				if asset.starts_with('/') {
					asset.clone()
				} else {
					path::join(name, asset)
				}
			}));
		}

		if let Some(pattern) = self.options.push_targets_regexp.get(name) {
			match walk(self.fs.as_ref(), dir.path()).await {
				Ok(found) => {
					let mut files: Vec<&str> = found.files.iter().map(|file| file.path()).collect();
					files.sort_unstable();

					let prefix = dir.path().trim_end_matches('/');
					let index_name = self.options.index_name.as_str();
					for file_path in files {
						let relative = file_path
							.strip_prefix(prefix)
							.unwrap_or(file_path)
							.trim_start_matches('/');
						if !index_name.is_empty() && format!("/{}", relative) == index_name {
							continue;
						}
						if pattern.is_match(relative) {
							targets.push(path::encode(&path::join(name, relative)).into_owned());
						}
					}
				}
				Err(err) => {
					tracing::warn!("Skipping pattern pushes for {}: {}", name, err);
				}
			}
		}

		for target in targets {
			if let Err(err) = pusher.push(&target).await {
				tracing::warn!("Push of {} failed, skipping remaining pushes: {}", target, err);
				break;
			}
		}
	}
}

impl std::fmt::Debug for FileServer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FileServer")
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}
