//! HTTP surface of the proxy: favicon short-circuit, metrics exposition, and the proxy fallback.

// crates.io
use axum::{
	Router,
	extract::{Request, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{any, get},
};
#[cfg(feature = "metrics")] use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
// self
use crate::{_prelude::*, proxy::ProxyHandler};

#[derive(Clone)]
struct AppState {
	handler: ProxyHandler,
	#[cfg(feature = "metrics")]
	metrics: Option<PrometheusHandle>,
}

/// Axum server wrapping a [`ProxyHandler`].
#[derive(Clone)]
pub struct ProxyServer {
	state: AppState,
}
impl ProxyServer {
	/// Serves `handler` for every path except `/favicon.ico` and `/metrics`.
	pub fn new(handler: ProxyHandler) -> Self {
		Self {
			state: AppState {
				handler,
				#[cfg(feature = "metrics")]
				metrics: None,
			},
		}
	}

	/// Renders `handle` at `GET /metrics`.
	#[cfg(feature = "metrics")]
	pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
		self.state.metrics = Some(handle);

		self
	}

	/// Builds the router.
	pub fn router(&self) -> Router {
		Router::new()
			.route("/favicon.ico", any(favicon))
			.route("/metrics", get(metrics))
			.fallback(proxy)
			.with_state(self.state.clone())
	}

	/// Resolves and binds `listen` (`host:port`), then serves until `shutdown` resolves.
	pub async fn run<F>(self, listen: &str, shutdown: F) -> Result<()>
	where
		F: 'static + Send + Future<Output = ()>,
	{
		let listener = TcpListener::bind(listen).await?;

		self.serve(listener, shutdown).await
	}

	/// Serves on an already bound `listener` until `shutdown` resolves.
	pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
	where
		F: 'static + Send + Future<Output = ()>,
	{
		tracing::info!(addr = %listener.local_addr()?, "Proxy listening.");

		axum::serve(listener, self.router()).with_graceful_shutdown(shutdown).await?;

		tracing::info!("Proxy stopped.");

		Ok(())
	}
}
impl Debug for ProxyServer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProxyServer").field("handler", &self.state.handler).finish()
	}
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
pub async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "Failed to listen for Ctrl-C.");
			std::future::pending::<()>().await;
		}
	};
	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			},
			Err(e) => {
				tracing::error!(error = %e, "Failed to listen for SIGTERM.");
				std::future::pending::<()>().await;
			},
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	tracing::info!("Shutdown signal received.");
}

async fn favicon() {}

async fn metrics(State(state): State<AppState>) -> Response {
	#[cfg(feature = "metrics")]
	if let Some(handle) = &state.metrics {
		return handle.render().into_response();
	}
	#[cfg(not(feature = "metrics"))]
	let _ = state;

	StatusCode::NOT_FOUND.into_response()
}

async fn proxy(State(state): State<AppState>, request: Request) -> Result<Response> {
	state.handler.forward(request).await
}
