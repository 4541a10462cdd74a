//! Request pipeline: rewrite, authenticate, forward, relay.
//!
//! [`ProxyHandler::forward`] turns one inbound request into one upstream request. Bodies are
//! streamed in both directions without buffering. Every call records exactly one
//! [`ForwardOutcome`], and failures are logged once, here, before being mapped to a generic
//! 500 response through the [`IntoResponse`] impl on [`Error`].

// crates.io
use axum::{
	body::{Body, HttpBody},
	extract::Request,
	http::{
		HeaderMap, HeaderValue, StatusCode,
		header::{AUTHORIZATION, HOST},
	},
	response::{IntoResponse, Response},
};
use tracing::Instrument;
// self
use crate::{
	_prelude::*,
	mint::Mint,
	obs::{self, ForwardOutcome},
	rewrite::RewriteRule,
};

/// Forwards requests to the configured upstream with a minted bearer token attached.
#[derive(Clone, Debug)]
pub struct ProxyHandler {
	rule: Arc<RewriteRule>,
	mint: Arc<Mint>,
	client: ReqwestClient,
}
impl ProxyHandler {
	/// Creates a handler that rewrites with `rule`, authenticates through `mint`, and sends
	/// requests with `client`.
	pub fn new(rule: RewriteRule, mint: Arc<Mint>, client: ReqwestClient) -> Self {
		Self { rule: Arc::new(rule), mint, client }
	}

	/// Rewrite applied to every inbound request.
	pub fn rule(&self) -> &RewriteRule {
		&self.rule
	}

	/// Mint shared by every request this handler serves.
	pub fn mint(&self) -> &Arc<Mint> {
		&self.mint
	}

	/// Forwards one inbound request and relays the upstream response.
	///
	/// Dropping the returned future cancels the token fetch and the upstream call.
	pub async fn forward(&self, request: Request) -> Result<Response> {
		let span = obs::forward_span(request.method().as_str(), request.uri().path());

		async move {
			let result = self.forward_inner(request).await;

			match &result {
				Ok(response) => obs::record_forward_outcome(ForwardOutcome::Relayed {
					status: response.status().as_u16(),
				}),
				Err(e) => {
					tracing::error!(kind = %e.kind(), error = ?e, "{}.", e.public_message());
					obs::record_forward_outcome(ForwardOutcome::Failed(e.kind()));
				},
			}

			result
		}
		.instrument(span)
		.await
	}

	async fn forward_inner(&self, request: Request) -> Result<Response> {
		let (parts, body) = request.into_parts();
		let url = self.rule.rewrite(&parts.uri);
		let mut builder = self.client.request(parts.method, url);

		// An empty inbound body must not turn into a chunked outbound one.
		if body.size_hint().exact() != Some(0) {
			builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
		}

		let mut outbound = builder.build().map_err(Error::request_build)?;

		copy_request_headers(&parts.headers, outbound.headers_mut());

		if outbound.headers().contains_key(AUTHORIZATION) {
			tracing::warn!(
				"leaving unexpected Authorization header(s) on incoming request unchanged"
			);
			obs::record_passthrough_auth();
		} else {
			let token = self.mint.get_access_token().await.map_err(Error::token_unavailable)?;
			let mut value = HeaderValue::from_str(&token.bearer()).map_err(Error::request_build)?;

			value.set_sensitive(true);
			outbound.headers_mut().insert(AUTHORIZATION, value);
		}

		obs::record_forward_attempt();

		let upstream = self.client.execute(outbound).await.map_err(Error::upstream_unreachable)?;

		Ok(relay(upstream))
	}
}

/// Copies every inbound header except `Host`, preserving repeated values.
fn copy_request_headers(from: &HeaderMap, to: &mut HeaderMap) {
	for (name, value) in from {
		if name != HOST {
			to.append(name, value.clone());
		}
	}
}

fn relay(upstream: reqwest::Response) -> Response {
	let status = upstream.status();
	let headers = upstream.headers().clone();
	let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));

	*response.status_mut() = status;

	for (name, value) in &headers {
		response.headers_mut().append(name, value.clone());
	}

	response
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		(StatusCode::INTERNAL_SERVER_ERROR, self.public_message()).into_response()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use axum::http::HeaderName;
	// self
	use super::*;
	use crate::token::SourceError;

	#[test]
	fn host_is_not_copied_and_repeated_headers_are() {
		let mut inbound = HeaderMap::new();

		inbound.insert(HOST, HeaderValue::from_static("localhost:7777"));
		inbound.append("x-scope", HeaderValue::from_static("a"));
		inbound.append("x-scope", HeaderValue::from_static("b"));

		let mut outbound = HeaderMap::new();

		copy_request_headers(&inbound, &mut outbound);

		assert!(!outbound.contains_key(HOST));
		assert_eq!(
			outbound.get_all(HeaderName::from_static("x-scope")).iter().collect::<Vec<_>>(),
			["a", "b"]
		);
	}

	#[tokio::test]
	async fn errors_render_generic_500s() {
		let err = Error::token_unavailable(Error::AcquisitionFailed {
			source: Arc::new(SourceError::Endpoint {
				status: Some(401),
				message: "secret detail".into(),
			}),
		});
		let response = err.into_response();

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

		let body = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.expect("Error body should be readable.");

		assert_eq!(&body[..], b"unable to obtain token");
	}
}
