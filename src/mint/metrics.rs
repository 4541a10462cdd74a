// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing how a [`Mint`](crate::mint::Mint) served its callers.
#[derive(Debug, Default)]
pub struct MintMetrics {
	attempts: AtomicU64,
	failures: AtomicU64,
	cache_hits: AtomicU64,
}
impl MintMetrics {
	/// Returns the number of calls made to the token source.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of token source calls that failed.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of calls answered from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}
}
