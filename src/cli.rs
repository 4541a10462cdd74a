//! Command-line surface of the `gmp-token-proxy` binary.

// crates.io
use clap::{Parser, ValueEnum};
// self
use crate::{
	_prelude::*,
	config::{
		CLOUD_PLATFORM_SCOPE, DEFAULT_LISTEN, DEFAULT_REMOTE, ProxyConfig, TlsPolicy,
		TokenSourceConfig,
	},
	token::{MetadataServerSource, TokenSecret},
};

/// Credential source selectable from the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
	#[default]
	/// Key file, gcloud user credentials, or the metadata server, whichever is found first.
	ApplicationDefault,
	/// Compute metadata server.
	MetadataServer,
	/// OAuth 2.0 client credentials grant.
	ClientCredentials,
	/// Fixed token value.
	Static,
}

/// Reverse proxy attaching a freshly minted bearer token to every forwarded request.
#[derive(Clone, Debug, Parser)]
#[command(name = "gmp-token-proxy", version, about)]
pub struct Cli {
	/// Address the proxy listens on (`host:port`, or `:port` for every interface).
	#[arg(long, env = "GMP_TOKEN_PROXY_LISTEN", default_value = DEFAULT_LISTEN)]
	pub proxy: String,
	/// Upstream `host[:port]` requests are forwarded to.
	#[arg(long, env = "GMP_TOKEN_PROXY_REMOTE", default_value = DEFAULT_REMOTE)]
	pub remote: String,
	/// Prefix prepended verbatim to every inbound path.
	#[arg(long, env = "GMP_TOKEN_PROXY_PREFIX", default_value = "")]
	pub prefix: String,
	/// Scheme used to reach the upstream.
	#[arg(long, env = "GMP_TOKEN_PROXY_SCHEME", default_value = "https")]
	pub scheme: String,
	/// Skip upstream TLS certificate verification.
	#[arg(long, env = "GMP_TOKEN_PROXY_INSECURE_SKIP_VERIFY")]
	pub insecure_skip_verify: bool,
	/// Refresh tokens this long before they expire (`30s`, `5m`, `1m 30s`).
	#[arg(
		long,
		env = "GMP_TOKEN_PROXY_EXPIRY_MARGIN",
		value_parser = humantime::parse_duration,
		default_value = "0s"
	)]
	pub expiry_margin: std::time::Duration,
	/// Deadline for one token fetch.
	#[arg(
		long,
		env = "GMP_TOKEN_PROXY_TOKEN_TIMEOUT",
		value_parser = humantime::parse_duration
	)]
	pub token_timeout: Option<std::time::Duration>,
	/// Deadline for one upstream call.
	#[arg(
		long,
		env = "GMP_TOKEN_PROXY_UPSTREAM_TIMEOUT",
		value_parser = humantime::parse_duration
	)]
	pub upstream_timeout: Option<std::time::Duration>,
	/// Where tokens come from.
	#[arg(long, env = "GMP_TOKEN_PROXY_TOKEN_SOURCE", value_enum, default_value_t)]
	pub token_source: SourceKind,
	/// Metadata server base URL, also consulted by `application-default`.
	#[arg(
		long,
		env = "GMP_TOKEN_PROXY_METADATA_ENDPOINT",
		default_value = MetadataServerSource::DEFAULT_ENDPOINT
	)]
	pub metadata_endpoint: String,
	/// Token endpoint for the client credentials grant.
	#[arg(long, env = "GMP_TOKEN_PROXY_TOKEN_URL")]
	pub token_url: Option<String>,
	/// Client identifier for the client credentials grant.
	#[arg(long, env = "GMP_TOKEN_PROXY_CLIENT_ID")]
	pub client_id: Option<String>,
	/// Client secret for the client credentials grant.
	#[arg(long, env = "GMP_TOKEN_PROXY_CLIENT_SECRET", hide_env_values = true)]
	pub client_secret: Option<String>,
	/// Requested scope; repeatable. Defaults to the cloud-platform scope.
	#[arg(long = "scope", env = "GMP_TOKEN_PROXY_SCOPES", value_delimiter = ',')]
	pub scopes: Vec<String>,
	/// Token forwarded when `--token-source static` is selected.
	#[arg(long, env = "GMP_TOKEN_PROXY_STATIC_TOKEN", hide_env_values = true)]
	pub static_token: Option<String>,
}
impl Cli {
	/// Resolves the parsed arguments into a [`ProxyConfig`].
	pub fn into_config(self) -> Result<ProxyConfig> {
		if self.proxy.is_empty() {
			return Err(ConfigError::MissingValue("proxy").into());
		}
		if self.remote.is_empty() {
			return Err(ConfigError::MissingValue("remote").into());
		}

		let listen = listen_address(&self.proxy)?;
		let scopes = if self.scopes.is_empty() {
			vec![CLOUD_PLATFORM_SCOPE.to_owned()]
		} else {
			self.scopes
		};
		let token_source = match self.token_source {
			SourceKind::ApplicationDefault => TokenSourceConfig::ApplicationDefault {
				metadata_endpoint: parse_endpoint(&self.metadata_endpoint)?,
				scopes,
			},
			SourceKind::MetadataServer => TokenSourceConfig::MetadataServer {
				endpoint: parse_endpoint(&self.metadata_endpoint)?,
				scopes,
			},
			SourceKind::ClientCredentials => TokenSourceConfig::ClientCredentials {
				token_url: parse_endpoint(&required(self.token_url, "token-url")?)?,
				client_id: required(self.client_id, "client-id")?,
				client_secret: TokenSecret::new(required(self.client_secret, "client-secret")?),
				scopes,
			},
			SourceKind::Static => TokenSourceConfig::Static {
				token: TokenSecret::new(required(self.static_token, "static-token")?),
			},
		};
		let expiry_margin = Duration::try_from(self.expiry_margin).unwrap_or(Duration::MAX);

		Ok(ProxyConfig {
			listen,
			remote: self.remote,
			prefix: self.prefix,
			target_scheme: self.scheme,
			tls: if self.insecure_skip_verify {
				TlsPolicy::AcceptInvalidCerts
			} else {
				TlsPolicy::Verify
			},
			expiry_margin,
			token_timeout: self.token_timeout,
			upstream_timeout: self.upstream_timeout,
			token_source,
		})
	}
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
	match value {
		Some(value) if !value.is_empty() => Ok(value),
		_ => Err(ConfigError::MissingValue(name).into()),
	}
}

fn parse_endpoint(raw: &str) -> Result<Url> {
	Url::parse(raw).map_err(|source| {
		ConfigError::InvalidCredentialEndpoint { endpoint: raw.to_owned(), source }.into()
	})
}

/// Accepts `host:port` and `[v6]:port`; a bare `:port` listens on every interface.
fn listen_address(raw: &str) -> Result<String> {
	let invalid = || ConfigError::InvalidListenAddress(raw.to_owned());
	let (host, port) = raw.rsplit_once(':').ok_or_else(invalid)?;

	port.parse::<u16>().map_err(|_| invalid())?;

	if host.is_empty() {
		return Ok(format!("0.0.0.0:{port}"));
	}

	Ok(raw.to_owned())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn parse(args: &[&str]) -> Cli {
		Cli::try_parse_from(std::iter::once("gmp-token-proxy").chain(args.iter().copied()))
			.expect("Arguments should parse.")
	}

	#[test]
	fn defaults_resolve_to_application_default_credentials() {
		let config = parse(&[]).into_config().expect("Defaults should resolve.");

		assert_eq!(config.listen, "0.0.0.0:7777");
		assert_eq!(config.remote, "0.0.0.0:9090");
		assert_eq!(config.tls, TlsPolicy::Verify);
		assert_eq!(config.expiry_margin, Duration::ZERO);
		assert!(matches!(
			config.token_source,
			TokenSourceConfig::ApplicationDefault { ref metadata_endpoint, ref scopes }
				if metadata_endpoint.as_str() == "http://metadata.google.internal/"
					&& scopes == &[CLOUD_PLATFORM_SCOPE]
		));
	}

	#[test]
	fn metadata_server_can_be_selected_explicitly() {
		let config = parse(&["--token-source", "metadata-server"])
			.into_config()
			.expect("Metadata server selection should resolve.");

		assert_eq!(config.token_source.kind(), "metadata_server");
	}

	#[test]
	fn flags_override_defaults() {
		let config = parse(&[
			"--proxy",
			"127.0.0.1:8080",
			"--remote",
			"monitoring.googleapis.com",
			"--prefix",
			"/v1/projects/demo/location/global/prometheus",
			"--insecure-skip-verify",
			"--expiry-margin",
			"1m30s",
			"--token-timeout",
			"10s",
			"--upstream-timeout",
			"1m 500ms",
			"--token-source",
			"static",
			"--static-token",
			"dev",
		])
		.into_config()
		.expect("Flags should resolve.");

		assert_eq!(config.listen, "127.0.0.1:8080");
		assert_eq!(config.tls, TlsPolicy::AcceptInvalidCerts);
		assert_eq!(config.expiry_margin, Duration::seconds(90));
		assert_eq!(config.token_timeout, Some(std::time::Duration::from_secs(10)));
		assert_eq!(config.upstream_timeout, Some(std::time::Duration::from_millis(60_500)));
		assert_eq!(config.token_source.kind(), "static");
	}

	#[test]
	fn empty_addresses_are_fatal() {
		assert!(matches!(
			parse(&["--proxy", ""]).into_config(),
			Err(Error::Config(ConfigError::MissingValue("proxy")))
		));
		assert!(matches!(
			parse(&["--remote", ""]).into_config(),
			Err(Error::Config(ConfigError::MissingValue("remote")))
		));
	}

	#[test]
	fn client_credentials_require_their_settings() {
		let err = parse(&["--token-source", "client-credentials", "--client-id", "proxy"])
			.into_config()
			.expect_err("Missing token URL should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::MissingValue("token-url"))));

		let config = parse(&[
			"--token-source",
			"client-credentials",
			"--token-url",
			"https://idp.example.com/token",
			"--client-id",
			"proxy",
			"--client-secret",
			"secret",
			"--scope",
			"metrics.read,metrics.write",
		])
		.into_config()
		.expect("Complete client credentials settings should resolve.");

		assert!(matches!(
			config.token_source,
			TokenSourceConfig::ClientCredentials { ref scopes, .. }
				if scopes == &["metrics.read", "metrics.write"]
		));
	}

	#[test]
	fn malformed_durations_are_rejected_by_the_parser() {
		for value in ["soon", "10 parsecs", ""] {
			assert!(
				Cli::try_parse_from(["gmp-token-proxy", "--token-timeout", value]).is_err(),
				"`{value}` should not parse as a duration."
			);
		}
	}

	#[test]
	fn listen_addresses_follow_host_port_forms() {
		assert_eq!(listen_address(":7777").expect("Bare port should resolve."), "0.0.0.0:7777");
		assert_eq!(
			listen_address("localhost:7777").expect("Host names should resolve."),
			"localhost:7777"
		);
		assert_eq!(listen_address("[::1]:7777").expect("IPv6 should resolve."), "[::1]:7777");

		for invalid in ["7777", "localhost", "localhost:http", "localhost:70000"] {
			assert!(
				matches!(
					listen_address(invalid),
					Err(Error::Config(ConfigError::InvalidListenAddress(_)))
				),
				"`{invalid}` should be rejected."
			);
		}

		let config = parse(&["--proxy", ":9000"]).into_config().expect("Bare port should resolve.");

		assert_eq!(config.listen, "0.0.0.0:9000");
	}
}
