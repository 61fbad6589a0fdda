//! Attachment rate limiting through the full pipeline


use fixtures::fixed_time;
use http::StatusCode;
use reinhardt_httpfs::fs::MemoryFs;
use reinhardt_httpfs::{Attachments, FileServer, HttpFsError, Request, ServeOptions};
use rstest::{fixture, rstest};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const RATE: usize = 1000;

#[fixture]
fn limited_server() -> FileServer {
	let assets = MemoryFs::new()
		.with_modified(Some(fixed_time()))
		.with_file("/big.bin", vec![7u8; 3 * RATE]);
	let attachments = Attachments::enabled().with_rate_limit(RATE as f64, RATE);
	FileServer::new(assets, ServeOptions::default().with_attachments(attachments))
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_download_is_paced(limited_server: FileServer) {
	let start = Instant::now();

	let response = limited_server.handle(Request::get("/big.bin")).await;
	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(
		response.header("content-disposition"),
		Some("attachment;filename=big.bin")
	);
	assert_eq!(response.header("content-length"), Some("3000"));
	let body = response.into_bytes().await.unwrap();

	assert_eq!(body.len(), 3 * RATE);
	// The first burst is free, the remaining two take a second each.
	assert!(start.elapsed() >= Duration::from_secs(2));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_download(limited_server: FileServer) {
	let cancel = CancellationToken::new();
	let request = Request::get("/big.bin").with_cancel(cancel.clone());

	let response = limited_server.handle(request).await;
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(500)).await;
		cancel.cancel();
	});

	let result = response.into_bytes().await;
	assert!(matches!(result, Err(HttpFsError::Cancelled)));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_unlimited_attachment_is_immediate() {
	let assets = MemoryFs::new().with_file("/big.bin", vec![7u8; 3 * RATE]);
	let server = FileServer::new(
		assets,
		ServeOptions::default().with_attachments(Attachments::enabled()),
	);
	let start = Instant::now();

	let body = server
		.handle(Request::get("/big.bin"))
		.await
		.into_bytes()
		.await
		.unwrap();

	assert_eq!(body.len(), 3 * RATE);
	assert_eq!(start.elapsed(), Duration::ZERO);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_zero_burst_fails_the_stream() {
	let assets = MemoryFs::new().with_file("/big.bin", vec![7u8; 10]);
	let attachments = Attachments::enabled().with_rate_limit(100.0, 0);
	let server = FileServer::new(assets, ServeOptions::default().with_attachments(attachments));

	let result = server.handle(Request::get("/big.bin")).await.into_bytes().await;

	assert!(matches!(result, Err(HttpFsError::RateLimit(_))));
}
