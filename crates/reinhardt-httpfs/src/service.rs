//! hyper integration
//!
//! [`FileService`] adapts a [`FileServer`] to hyper's `Service` trait;
//! [`serve`] and [`serve_with_shutdown`] run an HTTP/1.1 accept loop around it.

use crate::error::HttpFsError;
use crate::message::{Body, Request, Response};
use crate::server::FileServer;
use bytes::Bytes;
use futures::stream::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Body type handed to hyper
pub type HyperBody = UnsyncBoxBody<Bytes, HttpFsError>;

/// hyper `Service` answering requests with a [`FileServer`]
///
/// The request's cancellation token fires when hyper drops the response,
/// which stops rate limited transfers of disconnected clients.
#[derive(Debug, Clone)]
pub struct FileService {
	server: FileServer,
}

impl FileService {
	/// Wraps `server`
	pub fn new(server: FileServer) -> Self {
		Self { server }
	}

	/// The wrapped server
	pub fn server(&self) -> &FileServer {
		&self.server
	}
}

impl Service<hyper::Request<Incoming>> for FileService {
	type Response = hyper::Response<HyperBody>;
	type Error = Infallible;
	type Future =
		Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

	fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
		let server = self.server.clone();

		Box::pin(async move {
			let (parts, _body) = req.into_parts();
			let request = Request::new(parts.method, parts.uri, parts.version, parts.headers);
			let guard = request.cancel.clone().drop_guard();

			let response = server.handle(request).await;
			Ok(into_hyper(response, guard))
		})
	}
}

fn into_hyper(response: Response, guard: DropGuard) -> hyper::Response<HyperBody> {
	let body = match response.body {
		Body::Empty => Empty::new().map_err(|never| match never {}).boxed_unsync(),
		Body::Full(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
		Body::Stream(stream) => {
			// Keeps the token alive until the body is dropped.
			let frames = stream.map(move |chunk| {
				let _ = &guard;
				chunk.map(Frame::data)
			});
			StreamBody::new(frames).boxed_unsync()
		}
	};

	let mut hyper_response = hyper::Response::new(body);
	*hyper_response.status_mut() = response.status;
	*hyper_response.headers_mut() = response.headers;
	hyper_response
}

/// Serves one accepted connection over HTTP/1.1
///
/// # Errors
///
/// Returns the connection error reported by hyper.
pub async fn serve_connection(stream: TcpStream, service: FileService) -> hyper::Result<()> {
	let io = TokioIo::new(stream);
	http1::Builder::new().serve_connection(io, service).await
}

/// Accepts connections on `addr` until the listener fails
///
/// # Examples
///
/// ```no_run
/// use reinhardt_httpfs::fs::DirFs;
/// use reinhardt_httpfs::service::serve;
/// use reinhardt_httpfs::{FileServer, ServeOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let server = FileServer::new(DirFs::new("public")?, ServeOptions::default());
/// serve("127.0.0.1:8080".parse()?, server).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error when binding or accepting fails.
pub async fn serve(addr: SocketAddr, server: FileServer) -> std::io::Result<()> {
	serve_with_shutdown(addr, server, CancellationToken::new()).await
}

/// Accepts connections on `addr` until `shutdown` is cancelled
///
/// Connections in flight are cancelled together with the listener.
///
/// # Errors
///
/// Returns an error when binding or accepting fails.
pub async fn serve_with_shutdown(
	addr: SocketAddr,
	server: FileServer,
	shutdown: CancellationToken,
) -> std::io::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	tracing::info!("Serving files on http://{}", listener.local_addr()?);

	let service = FileService::new(server);
	loop {
		tokio::select! {
			result = listener.accept() => {
				let (stream, remote) = result?;
				let service = service.clone();
				let conn_shutdown = shutdown.clone();

				tokio::spawn(async move {
					tokio::select! {
						result = serve_connection(stream, service) => {
							if let Err(err) = result {
								tracing::debug!(
									"Connection from {} ended with error: {}",
									remote,
									err
								);
							}
						}
						_ = conn_shutdown.cancelled() => {
							tracing::debug!("Closing connection from {}", remote);
						}
					}
				});
			}
			_ = shutdown.cancelled() => {
				tracing::info!("Shutdown requested, no longer accepting connections");
				break;
			}
		}
	}

	Ok(())
}
