//! Byte-rate limiting for attachment downloads
//!
//! A [`TokenBucket`] holds up to `burst` tokens, one per byte, refilled at
//! `rate` tokens per second. Waiters reserve tokens up front (the balance may
//! go negative) and sleep until the reservation matures, so concurrent readers
//! are served in reservation order.

use crate::error::{HttpFsError, Result};
use crate::fs::ContentReader;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct BucketState {
	tokens: f64,
	last: Instant,
}

/// Token bucket limiter
#[derive(Debug, Clone)]
pub struct TokenBucket {
	rate: f64,
	burst: usize,
	state: Arc<Mutex<BucketState>>,
}

impl TokenBucket {
	/// Creates a full bucket
	///
	/// # Errors
	///
	/// Returns [`HttpFsError::RateLimit`] if `rate` is not a positive number.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_httpfs::rate::TokenBucket;
	///
	/// let bucket = TokenBucket::new(1024.0, 4096).unwrap();
	/// assert_eq!(bucket.burst(), 4096);
	/// assert!(TokenBucket::new(0.0, 10).is_err());
	/// ```
	pub fn new(rate: f64, burst: usize) -> Result<Self> {
		if !(rate.is_finite() && rate > 0.0) {
			return Err(HttpFsError::RateLimit(format!("invalid rate: {}", rate)));
		}
		Ok(Self {
			rate,
			burst,
			state: Arc::new(Mutex::new(BucketState {
				tokens: burst as f64,
				last: Instant::now(),
			})),
		})
	}

	/// Tokens added per second
	pub fn rate(&self) -> f64 {
		self.rate
	}

	/// Bucket capacity
	pub fn burst(&self) -> usize {
		self.burst
	}

	fn refill(&self, state: &mut BucketState, now: Instant) {
		let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
		state.tokens = (state.tokens + elapsed * self.rate).min(self.burst as f64);
		state.last = now;
	}

	/// Waits until `n` tokens are available, consuming them
	///
	/// # Errors
	///
	/// - [`HttpFsError::RateLimit`] if `n` exceeds the burst size
	/// - [`HttpFsError::Cancelled`] if `cancel` fires first; the reservation is
	///   returned to the bucket
	pub async fn wait_n(&self, n: usize, cancel: &CancellationToken) -> Result<()> {
		if n == 0 {
			return Ok(());
		}
		if n > self.burst {
			return Err(HttpFsError::RateLimit(format!(
				"requested {} tokens exceeds burst {}",
				n, self.burst
			)));
		}
		if cancel.is_cancelled() {
			return Err(HttpFsError::Cancelled);
		}

		let wait = {
			let mut state = self.state.lock();
			let now = Instant::now();
			self.refill(&mut state, now);
			state.tokens -= n as f64;
			if state.tokens >= 0.0 {
				Duration::ZERO
			} else {
				Duration::from_secs_f64(-state.tokens / self.rate)
			}
		};

		if wait.is_zero() {
			return Ok(());
		}

		tokio::select! {
			_ = tokio::time::sleep(wait) => Ok(()),
			_ = cancel.cancelled() => {
				let mut state = self.state.lock();
				let now = Instant::now();
				self.refill(&mut state, now);
				state.tokens = (state.tokens + n as f64).min(self.burst as f64);
				Err(HttpFsError::Cancelled)
			}
		}
	}
}

/// Content reader that releases bytes no faster than its bucket allows
pub struct RateLimitedReader {
	inner: ContentReader,
	limiter: TokenBucket,
	cancel: CancellationToken,
}

impl RateLimitedReader {
	/// Wraps `inner`, waiting on `limiter` and observing `cancel`
	pub fn new(inner: ContentReader, limiter: TokenBucket, cancel: CancellationToken) -> Self {
		Self {
			inner,
			limiter,
			cancel,
		}
	}

	/// Reads at most `max` bytes (and never more than the burst size)
	///
	/// Returns `None` at the end of the content.
	pub async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
		let max = max.min(self.limiter.burst().max(1));
		let Some(chunk) = self.inner.read_chunk(max).await? else {
			return Ok(None);
		};
		self.limiter.wait_n(chunk.len(), &self.cancel).await?;
		Ok(Some(chunk))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::Content;
	use rstest::rstest;

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_burst_is_immediate() {
		let bucket = TokenBucket::new(100.0, 100).unwrap();
		let cancel = CancellationToken::new();
		let start = Instant::now();

		bucket.wait_n(100, &cancel).await.unwrap();

		assert_eq!(start.elapsed(), Duration::ZERO);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_waits_for_refill() {
		let bucket = TokenBucket::new(100.0, 100).unwrap();
		let cancel = CancellationToken::new();
		let start = Instant::now();

		bucket.wait_n(100, &cancel).await.unwrap();
		bucket.wait_n(50, &cancel).await.unwrap();

		assert!(start.elapsed() >= Duration::from_millis(500));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_rejects_more_than_burst() {
		let bucket = TokenBucket::new(10.0, 5).unwrap();
		let cancel = CancellationToken::new();
		assert!(matches!(
			bucket.wait_n(6, &cancel).await,
			Err(HttpFsError::RateLimit(_))
		));
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_cancel_refunds_reservation() {
		let bucket = TokenBucket::new(10.0, 10).unwrap();
		let cancel = CancellationToken::new();
		bucket.wait_n(10, &cancel).await.unwrap();

		let waiter = {
			let bucket = bucket.clone();
			let cancel = cancel.clone();
			tokio::spawn(async move { bucket.wait_n(10, &cancel).await })
		};
		tokio::time::sleep(Duration::from_millis(100)).await;
		cancel.cancel();

		assert!(matches!(waiter.await.unwrap(), Err(HttpFsError::Cancelled)));
		// Only the refill since the start remains: roughly 1 token after 100ms.
		let state = bucket.state.lock();
		assert!(state.tokens > 0.0 && state.tokens <= 10.0);
	}

	#[rstest]
	#[tokio::test(start_paused = true)]
	async fn test_reader_paces_content() {
		let rate = 1000usize;
		let content = Content::Memory(Bytes::from(vec![b'x'; rate * 3]));
		let reader = content.reader(0, content.len()).await.unwrap();
		let bucket = TokenBucket::new(rate as f64, rate).unwrap();
		let mut limited = RateLimitedReader::new(reader, bucket, CancellationToken::new());

		let start = Instant::now();
		let mut total = 0;
		while let Some(chunk) = limited.read_chunk(4096).await.unwrap() {
			assert!(chunk.len() <= rate);
			total += chunk.len();
		}

		assert_eq!(total, rate * 3);
		assert!(start.elapsed() >= Duration::from_secs(2));
	}
}
