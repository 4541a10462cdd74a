//! Single-host reverse proxy that mints, caches, and attaches short-lived bearer tokens to
//! every request it forwards to a metrics backend.
//!
//! Clients that cannot obtain a credential themselves (dashboards, ad-hoc `curl` sessions)
//! talk plain HTTP to the proxy. The [`mint::Mint`] keeps one shared token fresh, the
//! [`proxy::ProxyHandler`] rewrites each request onto the upstream, injects the token, and
//! relays the upstream response untouched.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod mint;
pub mod obs;
pub mod proxy;
pub mod rewrite;
pub mod server;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		mint::Mint,
		proxy::ProxyHandler,
		rewrite::RewriteRule,
		token::{SourceError, SourceFuture, Token, TokenSource},
	};

	/// Token source that hands out scripted tokens and counts every fetch.
	#[derive(Debug)]
	pub struct CountingSource {
		fetches: AtomicUsize,
		lifetime: Duration,
		delay: std::time::Duration,
		fail: bool,
	}
	impl CountingSource {
		/// Issues `token-<n>` values that stay valid for `lifetime` after each fetch.
		pub fn new(lifetime: Duration) -> Self {
			Self { fetches: AtomicUsize::new(0), lifetime, delay: Default::default(), fail: false }
		}

		/// Fails every fetch with a backend error.
		pub fn failing() -> Self {
			Self { fail: true, ..Self::new(Duration::ZERO) }
		}

		/// Sleeps before answering so concurrent callers overlap.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = delay;

			self
		}

		/// Returns the number of fetches observed so far.
		pub fn fetches(&self) -> usize {
			self.fetches.load(Ordering::SeqCst)
		}
	}
	impl TokenSource for CountingSource {
		fn fetch_token(&self) -> SourceFuture<'_> {
			Box::pin(async move {
				let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;

				if !self.delay.is_zero() {
					tokio::time::sleep(self.delay).await;
				}
				if self.fail {
					return Err(SourceError::Endpoint {
						status: Some(503),
						message: "Scripted credential failure.".into(),
					});
				}

				Ok(Token::new(format!("token-{n}"), OffsetDateTime::now_utc() + self.lifetime))
			})
		}
	}

	/// Builds a reqwest client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_client() -> ReqwestClient {
		ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.")
	}

	/// Constructs a [`ProxyHandler`] that forwards plain HTTP to `remote` with `prefix`, backed
	/// by the provided token source.
	pub fn build_test_handler(
		remote: &str,
		prefix: &str,
		source: Arc<dyn TokenSource>,
	) -> (ProxyHandler, Arc<Mint>) {
		let rule = RewriteRule::new("http", remote, prefix)
			.expect("Test rewrite rule should be valid.");
		let mint = Arc::new(Mint::new(source));
		let handler = ProxyHandler::new(rule, mint.clone(), test_reqwest_client());

		(handler, mint)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeSet,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		path::{Path, PathBuf},
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{ConfigError, Error, ErrorKind, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, gmp_token_proxy as _, httpmock as _};
