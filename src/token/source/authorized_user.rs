//! gcloud user credentials: a stored refresh token redeemed through the `oauth2` crate.

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl, basic::BasicClient,
};
// self
use crate::{
	_prelude::*,
	http::OAuthHttpClient,
	token::{
		Token,
		source::{
			self, SourceError, SourceFuture, TokenSource, client_credentials::TokenEndpointClient,
		},
	},
};

/// Redeems a long-lived user refresh token for short-lived access tokens.
///
/// The client credentials travel in the request body, the way gcloud-issued clients expect.
pub struct AuthorizedUserSource {
	client_id: String,
	token_url: Url,
	refresh_token: RefreshToken,
	oauth_client: TokenEndpointClient,
	http_client: OAuthHttpClient,
}
impl AuthorizedUserSource {
	/// Creates a source redeeming `refresh_token` at `token_url` as `client_id`.
	pub fn new(
		client: ReqwestClient,
		token_url: &Url,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		refresh_token: impl Into<String>,
	) -> Result<Self> {
		let client_id = client_id.into();
		let endpoint = TokenUrl::new(token_url.to_string()).map_err(|source| {
			ConfigError::InvalidCredentialEndpoint { endpoint: token_url.to_string(), source }
		})?;
		let oauth_client = BasicClient::new(ClientId::new(client_id.clone()))
			.set_client_secret(ClientSecret::new(client_secret.into()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(endpoint);

		Ok(Self {
			client_id,
			token_url: token_url.to_owned(),
			refresh_token: RefreshToken::new(refresh_token.into()),
			oauth_client,
			http_client: OAuthHttpClient::with_client(client),
		})
	}

	async fn fetch(&self) -> Result<Token, SourceError> {
		let issued_at = OffsetDateTime::now_utc();
		let response = self
			.oauth_client
			.exchange_refresh_token(&self.refresh_token)
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
impl TokenSource for AuthorizedUserSource {
	fn fetch_token(&self) -> SourceFuture<'_> {
		Box::pin(self.fetch())
	}
}
impl Debug for AuthorizedUserSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizedUserSource")
			.field("client_id", &self.client_id)
			.field("token_url", &self.token_url.as_str())
			.finish()
	}
}
