//! Reqwest adapter that lets the `oauth2` crate run token exchanges on the proxy's HTTP stack.
//!
//! [`OAuthHttpClient`] wraps a [`ReqwestClient`] and implements [`AsyncHttpClient`]. Every call
//! records the HTTP status of the response in a [`ResponseStatusSlot`] so grant failures can be
//! reported with the status the credential endpoint actually returned.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
// self
use crate::_prelude::*;

/// Thread-safe slot holding the status code of the most recent token endpoint response.
#[derive(Clone, Debug, Default)]
pub struct ResponseStatusSlot(Arc<Mutex<Option<u16>>>);
impl ResponseStatusSlot {
	/// Stores the status for the current request.
	pub fn store(&self, status: u16) {
		*self.0.lock() = Some(status);
	}

	/// Returns the captured status, if any, consuming it from the slot.
	pub fn take(&self) -> Option<u16> {
		self.0.lock().take()
	}
}

/// Token-endpoint transport backed by reqwest.
///
/// Token requests should not follow redirects; configure any custom [`ReqwestClient`] with
/// [`reqwest::redirect::Policy::none`] before wrapping it.
#[derive(Clone, Debug)]
pub struct OAuthHttpClient {
	client: ReqwestClient,
	slot: ResponseStatusSlot,
}
impl OAuthHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, slot: Default::default() }
	}

	/// Slot that receives the status of each response observed by this client.
	pub fn status_slot(&self) -> &ResponseStatusSlot {
		&self.slot
	}
}
impl AsRef<ReqwestClient> for OAuthHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
impl Deref for OAuthHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}
impl<'c> AsyncHttpClient<'c> for OAuthHttpClient {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.client.clone();
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			slot.store(status.as_u16());

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
