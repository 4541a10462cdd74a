// crates.io
use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset: proxy events at `info`, transport chatter muted.
pub const DEFAULT_LOG_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn";

/// Installs the global `tracing` subscriber used by the binary.
///
/// `RUST_LOG` takes precedence over `default_filter`. When a global subscriber is already
/// installed, that one stays in place.
pub fn init_tracing(default_filter: &str) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

	match tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().try_init() {
		Ok(()) => tracing::debug!("Tracing subscriber installed."),
		Err(e) => tracing::debug!(error = %e, "Keeping the existing tracing subscriber."),
	}
}

/// Span wrapping one proxied request.
pub fn forward_span(method: &str, path: &str) -> tracing::Span {
	tracing::info_span!("gmp_token_proxy.forward", method, path)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn init_tracing_is_idempotent() {
		init_tracing(DEFAULT_LOG_FILTER);
		init_tracing("debug");
	}

	#[tokio::test]
	async fn forward_span_instruments_futures() {
		use tracing::Instrument;

		let value = async { 42 }.instrument(forward_span("GET", "/api/v1/query")).await;

		assert_eq!(value, 42);
	}
}
