//! `gmp-token-proxy` binary entry point.

// crates.io
use clap::Parser;
// self
use gmp_token_proxy::{
	cli::Cli,
	error::Result,
	obs::{self, BuildInfo},
	server::{self, ProxyServer},
};

#[tokio::main]
async fn main() -> Result<()> {
	obs::init_tracing(obs::DEFAULT_LOG_FILTER);

	let config = Cli::parse()
		.into_config()
		.inspect_err(|e| tracing::error!(error = %e, "Invalid configuration."))?;
	let handler = config
		.handler()
		.await
		.inspect_err(|e| tracing::error!(error = %e, "Failed to build proxy."))?;
	#[cfg_attr(not(feature = "metrics"), allow(unused_mut))]
	let mut server = ProxyServer::new(handler);

	#[cfg(feature = "metrics")]
	{
		let handle = obs::install_prometheus_recorder()
			.inspect_err(|e| tracing::error!(error = %e, "Failed to install metrics recorder."))?;

		server = server.with_metrics(handle);
	}

	obs::record_build_info(&BuildInfo::from_env());
	tracing::info!(
		listen = %config.listen,
		remote = %config.remote,
		prefix = %config.prefix,
		token_source = config.token_source.kind(),
		"Starting proxy."
	);

	server
		.run(&config.listen, server::shutdown_signal())
		.await
		.inspect_err(|e| tracing::error!(error = %e, "Proxy listener failed."))
}
