//! Proxy-level error types shared across the mint, the request pipeline, and startup.

// self
use crate::{_prelude::*, token::SourceError};

/// Proxy-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical proxy error exposed by public APIs.
///
/// The first four variants are terminal for the request that raised them; none is retried
/// internally. The remaining variants only surface during startup.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential source could not produce a token.
	#[error("Unable to mint a new token.")]
	AcquisitionFailed {
		/// Failure reported by the credential source, shared with every caller that waited on
		/// the same fetch.
		#[source]
		source: Arc<SourceError>,
	},
	/// Outbound request could not be constructed.
	#[error("Unable to create the proxied request.")]
	RequestBuildFailed {
		/// Underlying builder failure.
		#[source]
		source: BoxError,
	},
	/// No bearer token could be attached to the outbound request.
	#[error("Unable to obtain a token for the proxied request.")]
	TokenUnavailable {
		/// The mint failure that left the request without a token.
		#[source]
		source: Box<Error>,
	},
	/// Network or transport failure reaching the upstream.
	#[error("Unable to execute the proxied request.")]
	UpstreamUnreachable {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},

	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Listener could not be bound or the serve loop failed.
	#[error("Proxy listener failed.")]
	Serve(#[from] std::io::Error),
}
impl Error {
	/// Wraps an outbound request builder failure.
	pub fn request_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::RequestBuildFailed { source: Box::new(src) }
	}

	/// Wraps a transport failure raised while calling the upstream.
	pub fn upstream_unreachable(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::UpstreamUnreachable { source: Box::new(src) }
	}

	/// Converts a mint failure into the handler-boundary [`Error::TokenUnavailable`].
	pub fn token_unavailable(src: Error) -> Self {
		Self::TokenUnavailable { source: Box::new(src) }
	}

	/// Returns the stable classification of this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::AcquisitionFailed { .. } => ErrorKind::AcquisitionFailed,
			Self::RequestBuildFailed { .. } => ErrorKind::RequestBuildFailed,
			Self::TokenUnavailable { .. } => ErrorKind::TokenUnavailable,
			Self::UpstreamUnreachable { .. } => ErrorKind::UpstreamUnreachable,
			Self::Config(_) => ErrorKind::Config,
			Self::Serve(_) => ErrorKind::Serve,
		}
	}

	/// Short, non-sensitive message suitable for the caller of a failed request.
	pub fn public_message(&self) -> &'static str {
		match self.kind() {
			ErrorKind::RequestBuildFailed => "unable to create proxied request",
			ErrorKind::AcquisitionFailed | ErrorKind::TokenUnavailable => "unable to obtain token",
			ErrorKind::UpstreamUnreachable => "unable to execute proxied request",
			ErrorKind::Config | ErrorKind::Serve => "proxy misconfigured",
		}
	}
}

/// Stable classification of [`Error`] values, used for telemetry labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// See [`Error::AcquisitionFailed`].
	AcquisitionFailed,
	/// See [`Error::RequestBuildFailed`].
	RequestBuildFailed,
	/// See [`Error::TokenUnavailable`].
	TokenUnavailable,
	/// See [`Error::UpstreamUnreachable`].
	UpstreamUnreachable,
	/// See [`Error::Config`].
	Config,
	/// See [`Error::Serve`].
	Serve,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::AcquisitionFailed => "acquisition_failed",
			ErrorKind::RequestBuildFailed => "request_build_failed",
			ErrorKind::TokenUnavailable => "token_unavailable",
			ErrorKind::UpstreamUnreachable => "upstream_unreachable",
			ErrorKind::Config => "config",
			ErrorKind::Serve => "serve",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures raised while wiring the proxy.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Upstream scheme + host do not form a valid base URL.
	#[error("Upstream `{scheme}://{host}` is not a valid base URL.")]
	InvalidUpstream {
		/// Configured target scheme.
		scheme: String,
		/// Configured upstream `host[:port]`.
		host: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Upstream base URL carries more than a scheme and an authority.
	#[error("Upstream `{0}` must only contain a host and an optional port.")]
	UpstreamHasPath(String),
	/// Credential endpoint URL cannot be parsed.
	#[error("Credential endpoint `{endpoint}` is invalid.")]
	InvalidCredentialEndpoint {
		/// Offending endpoint string.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Listen address is not of the form `[host]:port`.
	#[error("Listen address `{0}` must be of the form `[host]:port`.")]
	InvalidListenAddress(String),
	/// Credentials file could not be read.
	#[error("Credentials file `{}` could not be read.", .path.display())]
	CredentialsFileUnreadable {
		/// Offending file.
		path: PathBuf,
		/// Underlying I/O failure.
		#[source]
		source: std::io::Error,
	},
	/// Credentials file is not a service account key or an authorized user file.
	#[error("Credentials file `{}` is malformed.", .path.display())]
	InvalidCredentialsFile {
		/// Offending file.
		path: PathBuf,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Service account private key is not a PEM-encoded RSA key.
	#[error("Service account private key is invalid.")]
	InvalidServiceAccountKey {
		/// Key decoding failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// Neither a credentials file nor a metadata server could be found.
	#[error(
		"No application default credentials found. Set GOOGLE_APPLICATION_CREDENTIALS or run on a compute instance."
	)]
	NoDefaultCredentials,
	/// A required value was empty.
	#[error("The `{0}` setting must be provided and non-empty.")]
	MissingValue(&'static str),
	/// Prometheus recorder could not be installed.
	#[error("Metrics recorder could not be installed: {0}.")]
	MetricsRecorder(String),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
