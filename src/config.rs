//! Resolved runtime configuration and the wiring that turns it into a [`ProxyHandler`].

// self
use crate::{
	_prelude::*,
	mint::Mint,
	proxy::ProxyHandler,
	rewrite::RewriteRule,
	token::{
		ClientCredentialsSource, CredentialSearch, MetadataServerSource, StaticSource, TokenSecret,
		TokenSource,
	},
};

/// OAuth scope requested from Google credential sources by default.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// Default listen address for the proxy.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:7777";
/// Default upstream `host:port`.
pub const DEFAULT_REMOTE: &str = "0.0.0.0:9090";

/// Trust decision applied to the upstream's TLS certificate chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsPolicy {
	#[default]
	/// Validate the upstream certificate chain and hostname.
	Verify,
	/// Accept any upstream certificate. Opt-in only.
	AcceptInvalidCerts,
}

/// Where the mint obtains fresh tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSourceConfig {
	/// Application default credentials: `GOOGLE_APPLICATION_CREDENTIALS`, then gcloud's user
	/// credentials, then the metadata server.
	ApplicationDefault {
		/// Metadata server base URL tried as the last resort.
		metadata_endpoint: Url,
		/// Scopes requested for the token.
		scopes: Vec<String>,
	},
	/// Compute metadata server, default service account.
	MetadataServer {
		/// Metadata server base URL.
		endpoint: Url,
		/// Scopes requested for the token.
		scopes: Vec<String>,
	},
	/// OAuth 2.0 `client_credentials` grant.
	ClientCredentials {
		/// Token endpoint.
		token_url: Url,
		/// Client identifier.
		client_id: String,
		/// Client secret.
		client_secret: TokenSecret,
		/// Scopes requested for the token.
		scopes: Vec<String>,
	},
	/// Fixed token value.
	Static {
		/// Token attached to every forwarded request.
		token: TokenSecret,
	},
}
impl TokenSourceConfig {
	/// Application default credentials with the cloud-platform scope.
	pub fn application_default() -> Result<Self> {
		let metadata_endpoint =
			Url::parse(MetadataServerSource::DEFAULT_ENDPOINT).map_err(|source| {
				ConfigError::InvalidCredentialEndpoint {
					endpoint: MetadataServerSource::DEFAULT_ENDPOINT.into(),
					source,
				}
			})?;

		Ok(Self::ApplicationDefault {
			metadata_endpoint,
			scopes: vec![CLOUD_PLATFORM_SCOPE.into()],
		})
	}

	/// Instantiates the configured source on top of `client`.
	///
	/// Application default credentials are resolved here, so a host without any credential
	/// fails at startup instead of on the first request.
	pub async fn build(&self, client: ReqwestClient) -> Result<Arc<dyn TokenSource>> {
		Ok(match self {
			Self::ApplicationDefault { metadata_endpoint, scopes } => {
				let resolved = CredentialSearch::from_env(metadata_endpoint.to_owned())
					.resolve(client, scopes)
					.await?;

				tracing::info!(
					origin = resolved.origin.kind(),
					"Resolved application default credentials."
				);

				resolved.source
			},
			Self::MetadataServer { endpoint, scopes } =>
				Arc::new(MetadataServerSource::new(client, endpoint, scopes)?),
			Self::ClientCredentials { token_url, client_id, client_secret, scopes } =>
				Arc::new(ClientCredentialsSource::new(
					client,
					token_url,
					client_id.as_str(),
					client_secret.expose(),
					scopes.to_owned(),
				)?),
			Self::Static { token } => Arc::new(StaticSource::new(token.expose())),
		})
	}

	/// Stable label for startup logs.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ApplicationDefault { .. } => "application_default",
			Self::MetadataServer { .. } => "metadata_server",
			Self::ClientCredentials { .. } => "client_credentials",
			Self::Static { .. } => "static",
		}
	}
}

/// Everything the proxy needs, already resolved from flags and environment.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
	/// Address the proxy listens on, as `host:port`.
	pub listen: String,
	/// Upstream `host[:port]`.
	pub remote: String,
	/// Prefix prepended to every inbound path.
	pub prefix: String,
	/// Scheme used to reach the upstream.
	pub target_scheme: String,
	/// Upstream certificate policy.
	pub tls: TlsPolicy,
	/// Tokens are refreshed this long before they expire.
	pub expiry_margin: Duration,
	/// Deadline for one token source fetch.
	pub token_timeout: Option<std::time::Duration>,
	/// Deadline for one upstream call.
	pub upstream_timeout: Option<std::time::Duration>,
	/// Credential source backing the mint.
	pub token_source: TokenSourceConfig,
}
impl ProxyConfig {
	/// Builds the default configuration for `token_source`.
	pub fn new(token_source: TokenSourceConfig) -> Self {
		Self {
			listen: DEFAULT_LISTEN.into(),
			remote: DEFAULT_REMOTE.into(),
			prefix: String::new(),
			target_scheme: "https".into(),
			tls: TlsPolicy::default(),
			expiry_margin: Duration::ZERO,
			token_timeout: None,
			upstream_timeout: None,
			token_source,
		}
	}

	/// Rewrite rule derived from the upstream settings.
	pub fn rewrite_rule(&self) -> Result<RewriteRule> {
		RewriteRule::new(&self.target_scheme, &self.remote, &self.prefix)
	}

	/// HTTP client used for upstream calls, honoring [`ProxyConfig::tls`] and
	/// [`ProxyConfig::upstream_timeout`].
	pub fn upstream_client(&self) -> Result<ReqwestClient> {
		let mut builder = ReqwestClient::builder();

		if self.tls == TlsPolicy::AcceptInvalidCerts {
			tracing::warn!(remote = %self.remote, "Upstream TLS certificate verification is disabled.");

			builder = builder.danger_accept_invalid_certs(true);
		}
		if let Some(timeout) = self.upstream_timeout {
			builder = builder.timeout(timeout);
		}

		builder.build().map_err(|e| ConfigError::from(e).into())
	}

	/// HTTP client used for credential endpoints. Never follows redirects.
	pub fn credential_client(&self) -> Result<ReqwestClient> {
		ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(|e| ConfigError::from(e).into())
	}

	/// Mint backed by the configured source.
	pub async fn mint(&self) -> Result<Arc<Mint>> {
		let source = self.token_source.build(self.credential_client()?).await?;

		Ok(Arc::new(
			Mint::new(source)
				.with_expiry_margin(self.expiry_margin)
				.with_fetch_timeout(self.token_timeout),
		))
	}

	/// Fully wired request handler.
	pub async fn handler(&self) -> Result<ProxyHandler> {
		let rule = self.rewrite_rule()?;

		Ok(ProxyHandler::new(rule, self.mint().await?, self.upstream_client()?))
	}
}
