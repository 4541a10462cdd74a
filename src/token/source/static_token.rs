//! Fixed-value source for local development against permissive backends.

// self
use crate::{
	_prelude::*,
	token::{
		Token, TokenSecret,
		source::{SourceFuture, TokenSource},
	},
};

/// Hands out the same token on every fetch, valid for [`StaticSource::LIFETIME`].
#[derive(Clone, Debug)]
pub struct StaticSource(TokenSecret);
impl StaticSource {
	/// Lifetime attached to each issued copy of the token.
	pub const LIFETIME: Duration = Duration::days(365);

	/// Wraps a fixed token value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(TokenSecret::new(value))
	}
}
impl TokenSource for StaticSource {
	fn fetch_token(&self) -> SourceFuture<'_> {
		let token =
			Token::expiring_in(self.0.expose(), OffsetDateTime::now_utc(), Self::LIFETIME);

		Box::pin(async move { Ok(token) })
	}
}
