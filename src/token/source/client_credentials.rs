//! OAuth 2.0 `client_credentials` source built on the `oauth2` crate.

// crates.io
use oauth2::{
	ClientId, ClientSecret, EndpointNotSet, EndpointSet, Scope, TokenResponse, TokenUrl,
	basic::BasicClient,
};
// self
use crate::{
	_prelude::*,
	http::OAuthHttpClient,
	token::{
		Token,
		source::{self, SourceError, SourceFuture, TokenSource},
	},
};

pub(crate) type TokenEndpointClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Mints tokens through the `client_credentials` grant of a token endpoint.
///
/// Client authentication uses HTTP Basic (`client_secret_basic`).
pub struct ClientCredentialsSource {
	client_id: String,
	token_url: Url,
	oauth_client: TokenEndpointClient,
	http_client: OAuthHttpClient,
	scopes: Vec<String>,
}
impl ClientCredentialsSource {
	/// Creates a source for `token_url` authenticating as `client_id` / `client_secret`.
	pub fn new(
		client: ReqwestClient,
		token_url: &Url,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		scopes: Vec<String>,
	) -> Result<Self> {
		let client_id = client_id.into();
		let endpoint = TokenUrl::new(token_url.to_string()).map_err(|source| {
			ConfigError::InvalidCredentialEndpoint { endpoint: token_url.to_string(), source }
		})?;
		let oauth_client = BasicClient::new(ClientId::new(client_id.clone()))
			.set_client_secret(ClientSecret::new(client_secret.into()))
			.set_token_uri(endpoint);

		Ok(Self {
			client_id,
			token_url: token_url.to_owned(),
			oauth_client,
			http_client: OAuthHttpClient::with_client(client),
			scopes,
		})
	}

	async fn fetch(&self) -> Result<Token, SourceError> {
		let issued_at = OffsetDateTime::now_utc();
		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in &self.scopes {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response = request
			.request_async(&self.http_client)
			.await
			.map_err(|err| source::map_oauth_error(self.http_client.status_slot().take(), err))?;

		source::token_from_expires_in(
			response.access_token().secret().to_owned(),
			response.expires_in().map(|lifetime| lifetime.as_secs()),
			issued_at,
		)
	}
}
impl TokenSource for ClientCredentialsSource {
	fn fetch_token(&self) -> SourceFuture<'_> {
		Box::pin(self.fetch())
	}
}
impl Debug for ClientCredentialsSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsSource")
			.field("client_id", &self.client_id)
			.field("token_url", &self.token_url.as_str())
			.field("scopes", &self.scopes)
			.finish()
	}
}
