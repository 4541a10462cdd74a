//! Bearer token model and the credential-source contract the mint consumes.

pub mod secret;
pub mod source;

pub use secret::*;
pub use source::*;

// self
use crate::_prelude::*;

/// Bearer credential paired with its absolute expiry.
///
/// Tokens are immutable once issued; the mint replaces a cached token wholesale instead of
/// mutating it.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
	value: TokenSecret,
	expiry: OffsetDateTime,
}
impl Token {
	/// Creates a token that stops being valid at `expiry`.
	pub fn new(value: impl Into<String>, expiry: OffsetDateTime) -> Self {
		Self { value: TokenSecret::new(value), expiry }
	}

	/// Creates a token that stays valid for `lifetime` after `issued_at`.
	pub fn expiring_in(
		value: impl Into<String>,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Self {
		Self::new(value, issued_at + lifetime)
	}

	/// Secret value to present as a bearer credential.
	pub fn value(&self) -> &TokenSecret {
		&self.value
	}

	/// Instant at which the token stops being valid.
	pub fn expiry(&self) -> OffsetDateTime {
		self.expiry
	}

	/// Returns `true` when the token must be replaced at `instant`.
	///
	/// The comparison is inclusive: a token whose shifted expiry equals `instant` is expired.
	/// `margin` moves the expiry earlier; a zero margin compares the raw expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.expiry.checked_sub(margin).is_none_or(|expiry| expiry <= instant)
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("value", &self.value)
			.field("expiry", &self.expiry)
			.finish()
	}
}
