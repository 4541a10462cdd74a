//! Token mint: one shared bearer token, refreshed lazily with singleflight guards.
//!
//! [`Mint::get_access_token`] answers from the cache while the cached token is valid. Once
//! the token is missing or expired, callers serialize on a single async guard: the first one
//! fetches from the [`TokenSource`], the others wake up, re-check the cache, and reuse the
//! fresh token instead of stampeding the credential endpoint. Cache reads take a short
//! `RwLock` read guard and never wait on an in-flight fetch.
//!
//! A failed fetch leaves the previously cached (stale) token in place. Callers that queued on
//! the guard while that fetch ran receive the same failure without fetching again; callers
//! arriving afterwards retry. There is no retry loop inside a single call.

mod metrics;

pub use metrics::MintMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	obs::{self, MintEvent},
	token::{SourceError, Token, TokenSecret, TokenSource},
};

/// Owns the cached bearer token and the capability to refresh it.
pub struct Mint {
	source: Arc<dyn TokenSource>,
	cached: RwLock<Option<Token>>,
	// Holds the failure of the most recent completed fetch, if it failed.
	refresh_guard: AsyncMutex<Option<Arc<SourceError>>>,
	completed_fetches: AtomicU64,
	expiry_margin: Duration,
	fetch_timeout: Option<std::time::Duration>,
	metrics: MintMetrics,
}
impl Mint {
	/// Creates a mint that has not fetched anything yet.
	pub fn new(source: Arc<dyn TokenSource>) -> Self {
		Self {
			source,
			cached: RwLock::new(None),
			refresh_guard: AsyncMutex::new(None),
			completed_fetches: AtomicU64::new(0),
			expiry_margin: Duration::ZERO,
			fetch_timeout: None,
			metrics: Default::default(),
		}
	}

	/// Treats tokens as expired `margin` before their actual expiry (defaults to zero).
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Bounds each token source call; `None` (the default) waits indefinitely.
	pub fn with_fetch_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
		self.fetch_timeout = timeout;

		self
	}

	/// In-process counters for fetches, failures, and cache hits.
	pub fn metrics(&self) -> &MintMetrics {
		&self.metrics
	}

	/// Returns a copy of the cached token, fresh or stale.
	pub fn cached(&self) -> Option<Token> {
		self.cached.read().clone()
	}

	/// Returns a currently valid bearer token, minting a new one when necessary.
	pub async fn get_access_token(&self) -> Result<TokenSecret> {
		self.get_access_token_with(OffsetDateTime::now_utc).await
	}

	/// Same as [`Mint::get_access_token`], evaluating expiry against `now`.
	pub async fn get_access_token_at(&self, now: OffsetDateTime) -> Result<TokenSecret> {
		self.get_access_token_with(|| now).await
	}

	async fn get_access_token_with<F>(&self, now: F) -> Result<TokenSecret>
	where
		F: Fn() -> OffsetDateTime,
	{
		if let Some(value) = self.fresh_at(now()) {
			return Ok(value);
		}

		let observed = self.completed_fetches.load(Ordering::Acquire);
		let mut last_failure = self.refresh_guard.lock().await;

		// The previous guard holder may have refreshed the cache while this caller waited.
		if let Some(value) = self.fresh_at(now()) {
			return Ok(value);
		}

		// A fetch finished while this caller waited; its failure answers this call too.
		let fetched_while_waiting = self.completed_fetches.load(Ordering::Acquire) != observed;

		if let Some(source) = last_failure.as_ref().filter(|_| fetched_while_waiting) {
			tracing::debug!("Sharing the failure of the fetch that completed while waiting.");

			return Err(Error::AcquisitionFailed { source: source.clone() });
		}

		let minted = self.mint().await;

		*last_failure = minted.as_ref().err().cloned();
		self.completed_fetches.fetch_add(1, Ordering::Release);

		minted.map_err(|source| Error::AcquisitionFailed { source })
	}

	fn fresh_at(&self, now: OffsetDateTime) -> Option<TokenSecret> {
		let cached = self.cached.read();

		match cached.as_ref() {
			None => {
				tracing::debug!("No token cached.");

				None
			},
			Some(token) if token.is_expired_at(now, self.expiry_margin) => {
				tracing::debug!(expiry = %token.expiry(), "Cached token has expired.");

				None
			},
			Some(token) => {
				self.metrics.record_cache_hit();

				Some(token.value().clone())
			},
		}
	}

	async fn mint(&self) -> Result<TokenSecret, Arc<SourceError>> {
		tracing::debug!("Minting new token.");
		obs::record_mint_event(MintEvent::Attempt);
		self.metrics.record_attempt();

		let fetched = match self.fetch_timeout {
			Some(after) => tokio::time::timeout(after, self.source.fetch_token())
				.await
				.unwrap_or_else(|_| Err(SourceError::Timeout { after })),
			None => self.source.fetch_token().await,
		};

		match fetched {
			Ok(token) => {
				let value = token.value().clone();

				tracing::debug!(expiry = %token.expiry(), "Minted new token.");

				*self.cached.write() = Some(token);

				Ok(value)
			},
			Err(source) => {
				obs::record_mint_event(MintEvent::Failure);
				self.metrics.record_failure();

				Err(Arc::new(source))
			},
		}
	}
}
impl Debug for Mint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Mint")
			.field("cached", &self.cached.read().as_ref())
			.field("expiry_margin", &self.expiry_margin)
			.field("fetch_timeout", &self.fetch_timeout)
			.finish()
	}
}
