//! Credential-source contract and the built-in sources.
//!
//! The mint only ever calls [`TokenSource::fetch_token`]; how a source talks to its identity
//! provider is its own business. The sources that ship with the crate:
//!
//! - [`MetadataServerSource`] asks the compute metadata server for the default service account.
//! - [`ServiceAccountSource`] signs a JWT assertion with a service account key.
//! - [`AuthorizedUserSource`] redeems gcloud's stored user refresh token.
//! - [`ClientCredentialsSource`] runs the OAuth 2.0 `client_credentials` grant.
//! - [`StaticSource`] hands out one fixed value, for local development.
//!
//! [`CredentialSearch`] picks one of the first three the way application default credentials
//! are usually discovered.

pub mod application_default;
pub mod authorized_user;
pub mod client_credentials;
pub mod metadata;
pub mod service_account;
pub mod static_token;

pub use application_default::{CredentialOrigin, CredentialSearch, ResolvedCredentials};
pub use authorized_user::AuthorizedUserSource;
pub use client_credentials::ClientCredentialsSource;
pub use metadata::MetadataServerSource;
pub use service_account::ServiceAccountSource;
pub use static_token::StaticSource;

// crates.io
use oauth2::{HttpClientError, RequestTokenError, basic::BasicRequestTokenError};
// self
use crate::{_prelude::*, error::BoxError, token::Token};

/// Boxed future returned by [`TokenSource::fetch_token`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<Token, SourceError>> + 'a + Send>>;

/// Capability that produces a fresh [`Token`] on demand.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Fetches a brand-new token from the underlying identity provider.
	fn fetch_token(&self) -> SourceFuture<'_>;
}
impl<T> TokenSource for Arc<T>
where
	T: ?Sized + TokenSource,
{
	fn fetch_token(&self) -> SourceFuture<'_> {
		(**self).fetch_token()
	}
}

/// Failures reported by [`TokenSource`] implementations.
#[derive(Debug, ThisError)]
pub enum SourceError {
	/// Transport failure (DNS, TCP, TLS) while calling the credential endpoint.
	#[error("Network error occurred while calling the credential endpoint.")]
	Network {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Credential endpoint answered with an error.
	#[error("Credential endpoint rejected the request: {message}")]
	Endpoint {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Endpoint- or source-supplied message summarizing the failure.
		message: String,
	},
	/// Credential endpoint answered with JSON that could not be parsed.
	#[error("Credential endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// JWT assertion could not be signed.
	#[error("Unable to sign the token request assertion.")]
	Assertion {
		/// Signing failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// Credential endpoint omitted `expires_in`.
	#[error("Credential endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Credential endpoint returned a zero, negative, or oversized lifetime.
	#[error("Credential endpoint returned an unusable expires_in value.")]
	InvalidExpiresIn,
	/// Fetch did not complete within the configured deadline.
	#[error("Credential fetch did not complete within {after:?}.")]
	Timeout {
		/// Deadline that elapsed.
		after: std::time::Duration,
	},
}
impl SourceError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Endpoint { status, .. } | Self::Parse { status, .. } => *status,
			_ => None,
		}
	}
}
impl From<ReqwestError> for SourceError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[derive(Deserialize)]
struct AccessTokenResponse {
	access_token: String,
	expires_in: Option<u64>,
}

/// Interprets a raw `{access_token, expires_in}` answer from a credential endpoint.
pub(crate) fn parse_token_response(
	status: reqwest::StatusCode,
	body: &[u8],
	issued_at: OffsetDateTime,
) -> Result<Token, SourceError> {
	if !status.is_success() {
		return Err(SourceError::Endpoint {
			status: Some(status.as_u16()),
			message: body_preview(body),
		});
	}

	let payload: AccessTokenResponse =
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(body))
			.map_err(|source| SourceError::Parse { source, status: Some(status.as_u16()) })?;

	token_from_expires_in(payload.access_token, payload.expires_in, issued_at)
}

/// Maps an `oauth2` grant failure, tagging it with the status the endpoint returned.
pub(crate) fn map_oauth_error(
	status: Option<u16>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> SourceError {
	match err {
		RequestTokenError::ServerResponse(response) => {
			let message = match response.error_description() {
				Some(description) => format!("{}: {description}", response.error().as_ref()),
				None => response.error().as_ref().to_owned(),
			};

			SourceError::Endpoint { status, message }
		},
		RequestTokenError::Request(error) => match error {
			HttpClientError::Reqwest(inner) => SourceError::network(*inner),
			HttpClientError::Http(inner) => SourceError::network(inner),
			HttpClientError::Io(inner) => SourceError::network(inner),
			HttpClientError::Other(message) => SourceError::Endpoint { status, message },
			_ => SourceError::Endpoint {
				status,
				message: "HTTP client error occurred while calling the token endpoint.".into(),
			},
		},
		RequestTokenError::Parse(source, _body) => SourceError::Parse { source, status },
		RequestTokenError::Other(message) => SourceError::Endpoint { status, message },
	}
}

/// Converts a relative `expires_in` (seconds) into an absolute token.
pub(crate) fn token_from_expires_in(
	access_token: String,
	expires_in: Option<u64>,
	issued_at: OffsetDateTime,
) -> Result<Token, SourceError> {
	let expires_in = expires_in.ok_or(SourceError::MissingExpiresIn)?;
	let expires_in = i64::try_from(expires_in).map_err(|_| SourceError::InvalidExpiresIn)?;

	if expires_in <= 0 {
		return Err(SourceError::InvalidExpiresIn);
	}

	let expiry = issued_at
		.checked_add(Duration::seconds(expires_in))
		.ok_or(SourceError::InvalidExpiresIn)?;

	Ok(Token::new(access_token, expiry))
}

/// Truncates an error body so it can be attached to a [`SourceError`] without flooding logs.
pub(crate) fn body_preview(body: &[u8]) -> String {
	const LIMIT: usize = 256;

	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	match text.char_indices().nth(LIMIT) {
		Some((cut, _)) => format!("{}...", &text[..cut]),
		None => text.to_owned(),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn expires_in_is_required_and_positive() {
		let issued = datetime!(2030-01-01 00:00 UTC);

		assert!(matches!(
			token_from_expires_in("t".into(), None, issued),
			Err(SourceError::MissingExpiresIn)
		));
		assert!(matches!(
			token_from_expires_in("t".into(), Some(0), issued),
			Err(SourceError::InvalidExpiresIn)
		));
		assert!(matches!(
			token_from_expires_in("t".into(), Some(u64::MAX), issued),
			Err(SourceError::InvalidExpiresIn)
		));

		let token = token_from_expires_in("t".into(), Some(3600), issued)
			.expect("A positive expires_in should produce a token.");

		assert_eq!(token.expiry(), issued + Duration::hours(1));
	}

	#[test]
	fn error_statuses_keep_the_body_preview() {
		let err = parse_token_response(
			reqwest::StatusCode::FORBIDDEN,
			b"  insufficient scopes ",
			datetime!(2030-01-01 00:00 UTC),
		)
		.expect_err("A 403 should not produce a token.");

		assert!(matches!(
			err,
			SourceError::Endpoint { status: Some(403), ref message } if message == "insufficient scopes"
		));
	}

	#[test]
	fn other_request_errors_keep_status() {
		let err = map_oauth_error(Some(502), RequestTokenError::Other("bad gateway".into()));

		assert!(matches!(err, SourceError::Endpoint { status: Some(502), .. }));
	}

	#[test]
	fn body_preview_truncates_long_bodies() {
		let long = "x".repeat(1000);
		let preview = body_preview(long.as_bytes());

		assert_eq!(preview.len(), 259);
		assert!(preview.ends_with("..."));
		assert_eq!(body_preview(b"  short  "), "short");
	}
}
