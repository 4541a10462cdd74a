//! Compute metadata server source for the instance's default service account.

// self
use crate::{
	_prelude::*,
	token::{
		Token,
		source::{self, SourceError, SourceFuture, TokenSource},
	},
};

/// Fetches access tokens for the default service account from the metadata server.
#[derive(Clone, Debug)]
pub struct MetadataServerSource {
	client: ReqwestClient,
	token_url: Url,
}
impl MetadataServerSource {
	/// Metadata server reachable from inside the cloud provider's compute environments.
	pub const DEFAULT_ENDPOINT: &'static str = "http://metadata.google.internal";
	/// Path of the default service account token resource.
	pub const TOKEN_PATH: &'static str =
		"/computeMetadata/v1/instance/service-accounts/default/token";

	/// Creates a source targeting `endpoint`, requesting `scopes` when non-empty.
	pub fn new(client: ReqwestClient, endpoint: &Url, scopes: &[String]) -> Result<Self> {
		let mut token_url = endpoint.join(Self::TOKEN_PATH).map_err(|source| {
			ConfigError::InvalidCredentialEndpoint { endpoint: endpoint.to_string(), source }
		})?;

		if !scopes.is_empty() {
			token_url.query_pairs_mut().append_pair("scopes", &scopes.join(","));
		}

		Ok(Self { client, token_url })
	}

	/// Fully resolved token URL, including the `scopes` query when present.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	async fn fetch(&self) -> Result<Token, SourceError> {
		let issued_at = OffsetDateTime::now_utc();
		let response = self
			.client
			.get(self.token_url.clone())
			.header("Metadata-Flavor", "Google")
			.send()
			.await?;
		let status = response.status();
		let body = response.bytes().await?;

		source::parse_token_response(status, &body, issued_at)
	}
}
impl TokenSource for MetadataServerSource {
	fn fetch_token(&self) -> SourceFuture<'_> {
		Box::pin(self.fetch())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_url_carries_scopes() {
		let endpoint = Url::parse(MetadataServerSource::DEFAULT_ENDPOINT)
			.expect("Default metadata endpoint should parse.");
		let source = MetadataServerSource::new(
			ReqwestClient::new(),
			&endpoint,
			&["https://www.googleapis.com/auth/cloud-platform".into()],
		)
		.expect("Metadata source should build.");

		assert_eq!(source.token_url().path(), MetadataServerSource::TOKEN_PATH);
		assert_eq!(
			source.token_url().query(),
			Some("scopes=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcloud-platform")
		);
	}

	#[test]
	fn token_url_omits_empty_scopes() {
		let endpoint = Url::parse("http://127.0.0.1:8080/ignored")
			.expect("Endpoint fixture should parse.");
		let source = MetadataServerSource::new(ReqwestClient::new(), &endpoint, &[])
			.expect("Metadata source should build.");

		assert_eq!(
			source.token_url().as_str(),
			"http://127.0.0.1:8080/computeMetadata/v1/instance/service-accounts/default/token"
		);
	}
}
