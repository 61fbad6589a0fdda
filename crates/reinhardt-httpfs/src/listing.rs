//! Directory listing rendering

use crate::config::ServeOptions;
use crate::error::Result;
use crate::fs::{DirHandle, FileInfo};
use crate::message::{Body, Request, Response};
use crate::path;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use std::borrow::Cow;
use std::fmt::Write;

/// Renders the listing of a directory that has no index document
///
/// Implemented for closures with the same signature as [`DirList::render`].
pub trait DirList: Send + Sync {
	/// Writes the listing of `dir` into `response`
	///
	/// # Errors
	///
	/// Any error is answered with `500 Internal Server Error`.
	fn render(
		&self,
		response: &mut Response,
		request: &Request,
		options: &ServeOptions,
		dir_name: &str,
		dir: &DirHandle,
	) -> Result<()>;
}

impl<F> DirList for F
where
	F: Fn(&mut Response, &Request, &ServeOptions, &str, &DirHandle) -> Result<()> + Send + Sync,
{
	fn render(
		&self,
		response: &mut Response,
		request: &Request,
		options: &ServeOptions,
		dir_name: &str,
		dir: &DirHandle,
	) -> Result<()> {
		self(response, request, options, dir_name, dir)
	}
}

/// Default listing: a `<pre>` block with one link per entry, sorted by name
///
/// Directories get a trailing `/`; files get a `download` attribute when
/// attachments are enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainDirList;

impl DirList for PlainDirList {
	fn render(
		&self,
		response: &mut Response,
		request: &Request,
		options: &ServeOptions,
		_dir_name: &str,
		dir: &DirHandle,
	) -> Result<()> {
		let mut entries: Vec<&FileInfo> = dir.entries().iter().collect();
		entries.sort_by(|a, b| a.name.cmp(&b.name));

		let base = request
			.decoded_path()
			.unwrap_or(Cow::Borrowed(request.path()));
		let mut body = String::from("<pre>\n");
		for entry in entries {
			let name = path::to_base_name(&entry.name);
			let href = path::encode(&path::join(&base, &name)).into_owned();

			let download = if options.attachments.enable && !entry.is_dir() {
				" download"
			} else {
				""
			};
			let mut view_name = name.clone();
			if entry.is_dir() {
				view_name.push('/');
			}

			// Writing into a String cannot fail.
			let _ = writeln!(
				body,
				"<a href=\"{}\"{}>{}</a>",
				href,
				download,
				html_escape(&view_name)
			);
		}
		body.push_str("</pre>\n");

		response.headers.insert(
			CONTENT_TYPE,
			HeaderValue::from_static("text/html; charset=utf-8"),
		);
		response.body = Body::Full(Bytes::from(body));
		Ok(())
	}
}

/// Escapes HTML special characters
pub(crate) fn html_escape(s: &str) -> Cow<'_, str> {
	if s.contains(['&', '<', '>', '"', '\'']) {
		let mut escaped = String::with_capacity(s.len() + 8);
		for c in s.chars() {
			match c {
				'&' => escaped.push_str("&amp;"),
				'<' => escaped.push_str("&lt;"),
				'>' => escaped.push_str("&gt;"),
				'"' => escaped.push_str("&#34;"),
				'\'' => escaped.push_str("&#39;"),
				_ => escaped.push(c),
			}
		}
		Cow::Owned(escaped)
	} else {
		Cow::Borrowed(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Attachments;
	use crate::fs::FileMode;
	use rstest::{fixture, rstest};

	#[fixture]
	fn dir() -> DirHandle {
		DirHandle::new(
			"/docs",
			FileInfo::new("docs", 0, FileMode::dir(0o755), None),
			vec![
				FileInfo::new("z.txt", 1, FileMode::file(0o644), None),
				FileInfo::new("a <b>.txt", 1, FileMode::file(0o644), None),
				FileInfo::new("img", 0, FileMode::dir(0o755), None),
				FileInfo::new("what?.txt", 1, FileMode::file(0o644), None),
			],
		)
	}

	fn body_of(response: &Response) -> String {
		match &response.body {
			Body::Full(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
			other => panic!("unexpected body {:?}", other),
		}
	}

	#[rstest]
	fn test_plain_listing(dir: DirHandle) {
		let mut response = Response::ok();
		let request = Request::get("/docs/");

		PlainDirList
			.render(&mut response, &request, &ServeOptions::default(), "docs", &dir)
			.unwrap();

		let body = body_of(&response);
		assert_eq!(
			body,
			"<pre>\n\
			 <a href=\"/docs/a%20%3Cb%3E.txt\">a &lt;b&gt;.txt</a>\n\
			 <a href=\"/docs/img\">img/</a>\n\
			 <a href=\"/docs/what%3F.txt\">what?.txt</a>\n\
			 <a href=\"/docs/z.txt\">z.txt</a>\n\
			 </pre>\n"
		);
		assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
	}

	#[rstest]
	fn test_links_encode_the_decoded_request_path() {
		let dir = DirHandle::new(
			"/my docs",
			FileInfo::new("my docs", 0, FileMode::dir(0o755), None),
			vec![FileInfo::new("résumé.txt", 1, FileMode::file(0o644), None)],
		);
		let mut response = Response::ok();
		let request = Request::get("/my%20docs/");

		PlainDirList
			.render(&mut response, &request, &ServeOptions::default(), "my docs", &dir)
			.unwrap();

		assert!(body_of(&response)
			.contains("<a href=\"/my%20docs/r%C3%A9sum%C3%A9.txt\">résumé.txt</a>"));
	}

	#[rstest]
	fn test_download_attribute_only_on_files(dir: DirHandle) {
		let mut response = Response::ok();
		let request = Request::get("/docs/");
		let options = ServeOptions::default().with_attachments(Attachments::enabled());

		PlainDirList
			.render(&mut response, &request, &options, "docs", &dir)
			.unwrap();

		let body = body_of(&response);
		assert!(body.contains("<a href=\"/docs/z.txt\" download>z.txt</a>"));
		assert!(body.contains("<a href=\"/docs/img\">img/</a>"));
	}

	#[rstest]
	fn test_closure_renderer(dir: DirHandle) {
		let renderer = |response: &mut Response,
		                _: &Request,
		                _: &ServeOptions,
		                name: &str,
		                dir: &DirHandle|
		 -> Result<()> {
			response.body = Body::Full(format!("{}:{}", name, dir.entries().len()).into());
			Ok(())
		};
		let mut response = Response::ok();

		renderer
			.render(&mut response, &Request::get("/docs/"), &ServeOptions::default(), "docs", &dir)
			.unwrap();

		assert_eq!(body_of(&response), "docs:4");
	}
}
