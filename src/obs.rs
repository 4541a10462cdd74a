//! Telemetry events emitted by the mint and the proxy pipeline.
//!
//! The core only reports events; aggregation and exposition belong to whatever recorder is
//! installed behind the `metrics` facade.
//!
//! # Feature Flags
//!
//! - Enable `metrics` (default) to increment the `promlens_gmp_token_proxy_*` counters and to
//!   expose them through the Prometheus recorder returned by [`install_prometheus_recorder`].

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Prefix shared by every counter the proxy records.
pub const METRIC_PREFIX: &str = "promlens_gmp_token_proxy";

/// Events raised by the mint around each token source call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MintEvent {
	/// A token source fetch is about to start.
	Attempt,
	/// The token source fetch failed.
	Failure,
}
impl MintEvent {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			MintEvent::Attempt => "attempt",
			MintEvent::Failure => "failure",
		}
	}
}
impl Display for MintEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Terminal outcome of one proxied request; exactly one is recorded per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForwardOutcome {
	/// The upstream answered and its response was relayed.
	Relayed {
		/// Upstream status code.
		status: u16,
	},
	/// The request failed before a response could be relayed.
	Failed(ErrorKind),
}
impl ForwardOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ForwardOutcome::Relayed { .. } => "relayed",
			ForwardOutcome::Failed(kind) => kind.as_str(),
		}
	}
}
impl Display for ForwardOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Build metadata attached to the `build_info` counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildInfo {
	/// UNIX epoch at which the binary was built (`BUILD_TIME` at compile time).
	pub build_time: &'static str,
	/// Git commit the binary was built from (`GIT_COMMIT` at compile time).
	pub git_commit: &'static str,
	/// Kernel release of the build host (`OS_VERSION` at compile time).
	pub os_version: &'static str,
	/// Rust toolchain version (`RUSTC_VERSION` at compile time).
	pub rust_version: &'static str,
}
impl BuildInfo {
	const UNKNOWN: &'static str = "unknown";

	/// Reads build metadata injected through compile-time environment variables.
	pub const fn from_env() -> Self {
		Self {
			build_time: or_unknown(option_env!("BUILD_TIME")),
			git_commit: or_unknown(option_env!("GIT_COMMIT")),
			os_version: or_unknown(option_env!("OS_VERSION")),
			rust_version: or_unknown(option_env!("RUSTC_VERSION")),
		}
	}
}
impl Default for BuildInfo {
	fn default() -> Self {
		Self::from_env()
	}
}

const fn or_unknown(value: Option<&'static str>) -> &'static str {
	match value {
		Some(value) => value,
		None => BuildInfo::UNKNOWN,
	}
}
