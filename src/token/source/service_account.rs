//! Service account key source using the JWT bearer grant (RFC 7523).

// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
// self
use crate::{
	_prelude::*,
	token::{
		Token,
		source::{self, SourceError, SourceFuture, TokenSource},
	},
};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Serialize)]
struct AssertionClaims<'a> {
	iss: &'a str,
	scope: &'a str,
	aud: &'a str,
	iat: i64,
	exp: i64,
}

/// Exchanges self-signed RS256 assertions for access tokens.
pub struct ServiceAccountSource {
	client: ReqwestClient,
	client_email: String,
	token_url: Url,
	key: EncodingKey,
	key_id: Option<String>,
	scope: String,
}
impl ServiceAccountSource {
	/// Lifetime written into each assertion.
	pub const ASSERTION_LIFETIME: Duration = Duration::hours(1);

	/// Creates a source signing as `client_email` with the PEM-encoded RSA `private_key`.
	pub fn new(
		client: ReqwestClient,
		client_email: impl Into<String>,
		private_key: &str,
		key_id: Option<String>,
		token_url: Url,
		scopes: &[String],
	) -> Result<Self> {
		let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
			.map_err(|source| ConfigError::InvalidServiceAccountKey { source })?;

		Ok(Self {
			client,
			client_email: client_email.into(),
			token_url,
			key,
			key_id,
			scope: scopes.join(" "),
		})
	}

	/// Identity the assertions are issued for.
	pub fn client_email(&self) -> &str {
		&self.client_email
	}

	fn assertion(&self, issued_at: OffsetDateTime) -> Result<String, SourceError> {
		let mut header = Header::new(Algorithm::RS256);

		header.kid = self.key_id.clone();

		let claims = AssertionClaims {
			iss: &self.client_email,
			scope: &self.scope,
			aud: self.token_url.as_str(),
			iat: issued_at.unix_timestamp(),
			exp: (issued_at + Self::ASSERTION_LIFETIME).unix_timestamp(),
		};

		jsonwebtoken::encode(&header, &claims, &self.key)
			.map_err(|source| SourceError::Assertion { source })
	}

	async fn fetch(&self) -> Result<Token, SourceError> {
		let issued_at = OffsetDateTime::now_utc();
		let assertion = self.assertion(issued_at)?;
		let response = self
			.client
			.post(self.token_url.clone())
			.form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
			.send()
			.await?;
		let status = response.status();
		let body = response.bytes().await?;

		source::parse_token_response(status, &body, issued_at)
	}
}
impl TokenSource for ServiceAccountSource {
	fn fetch_token(&self) -> SourceFuture<'_> {
		Box::pin(self.fetch())
	}
}
impl Debug for ServiceAccountSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountSource")
			.field("client_email", &self.client_email)
			.field("token_url", &self.token_url.as_str())
			.field("key_id", &self.key_id)
			.field("scope", &self.scope)
			.finish()
	}
}
