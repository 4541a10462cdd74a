// self
use crate::obs::{BuildInfo, ForwardOutcome, MintEvent};
#[cfg(feature = "metrics")] use crate::{_prelude::*, obs::METRIC_PREFIX};

#[cfg(feature = "metrics")]
fn name(suffix: &str) -> String {
	format!("{METRIC_PREFIX}_{suffix}")
}

/// Registers help text for every counter (when enabled).
pub fn describe_metrics() {
	#[cfg(feature = "metrics")]
	{
		metrics::describe_counter!(
			name("build_info"),
			"A metric with a constant '1' value labeled by build time, git commit, OS and Rust versions"
		);
		metrics::describe_counter!(name("tokens_total"), "The total number of token requests");
		metrics::describe_counter!(
			name("tokens_error"),
			"The total number of token requests failed"
		);
		metrics::describe_counter!(name("proxied_total"), "The total number of proxied requests");
		metrics::describe_counter!(
			name("proxied_error"),
			"The total number of proxied requests that errored"
		);
		metrics::describe_counter!(
			name("proxied_status"),
			"The total number of proxied requests that returned a status code"
		);
		metrics::describe_counter!(
			name("passthrough_auth_total"),
			"The total number of requests forwarded with a caller-supplied Authorization header"
		);
	}
}

/// Records the constant build-info sample (when enabled).
pub fn record_build_info(info: &BuildInfo) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			name("build_info"),
			"build_time" => info.build_time,
			"git_commit" => info.git_commit,
			"os_version" => info.os_version,
			"rust_version" => info.rust_version
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = info;
	}
}

/// Records a mint event via the global metrics recorder (when enabled).
pub fn record_mint_event(event: MintEvent) {
	#[cfg(feature = "metrics")]
	{
		let counter = match event {
			MintEvent::Attempt => "tokens_total",
			MintEvent::Failure => "tokens_error",
		};

		metrics::counter!(name(counter)).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}

/// Records that an outbound request is about to be sent upstream (when enabled).
pub fn record_forward_attempt() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(name("proxied_total")).increment(1);
	}
}

/// Records the terminal outcome of a proxied request (when enabled).
pub fn record_forward_outcome(outcome: ForwardOutcome) {
	#[cfg(feature = "metrics")]
	{
		match outcome {
			ForwardOutcome::Relayed { status } => {
				metrics::counter!(name("proxied_status"), "code" => status.to_string()).increment(1);
			},
			ForwardOutcome::Failed(kind) => {
				metrics::counter!(name("proxied_error"), "kind" => kind.as_str()).increment(1);
			},
		}
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records that a caller-supplied `Authorization` header was forwarded untouched (when enabled).
pub fn record_passthrough_auth() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(name("passthrough_auth_total")).increment(1);
	}
}

/// Installs the process-wide Prometheus recorder and returns the handle that renders it.
#[cfg(feature = "metrics")]
pub fn install_prometheus_recorder()
-> Result<metrics_exporter_prometheus::PrometheusHandle, ConfigError> {
	let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| ConfigError::MetricsRecorder(err.to_string()))?;

	describe_metrics();

	Ok(handle)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::ErrorKind;

	#[test]
	fn recording_without_recorder_is_a_noop() {
		record_build_info(&BuildInfo::from_env());
		record_mint_event(MintEvent::Attempt);
		record_forward_attempt();
		record_forward_outcome(ForwardOutcome::Relayed { status: 200 });
		record_forward_outcome(ForwardOutcome::Failed(ErrorKind::UpstreamUnreachable));
		record_passthrough_auth();
	}
}
