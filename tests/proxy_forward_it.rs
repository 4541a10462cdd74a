// crates.io
use axum::{
	Router,
	body::{self, Body},
	http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION},
	response::IntoResponse,
};
use httpmock::prelude::*;
use tokio::net::TcpListener;
// self
use gmp_token_proxy::{_preludet::*, token::StaticSource};

fn counting_source() -> Arc<CountingSource> {
	Arc::new(CountingSource::new(Duration::minutes(30)))
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).expect("Inbound request fixture should build.")
}

/// Upstream answering with every `Authorization` value it received, one per line.
async fn spawn_authorization_echo() -> String {
	let listener =
		TcpListener::bind("127.0.0.1:0").await.expect("Ephemeral port should be available.");
	let addr = listener.local_addr().expect("Listener should expose its address.");
	let app = Router::new().fallback(|headers: HeaderMap| async move {
		headers
			.get_all(AUTHORIZATION)
			.iter()
			.map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
			.collect::<Vec<_>>()
			.join("\n")
	});

	tokio::spawn(async move { axum::serve(listener, app).await });

	addr.to_string()
}

async fn body_text(response: axum::response::Response) -> String {
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Relayed body should be readable.");

	String::from_utf8(bytes.to_vec()).expect("Relayed body should be UTF-8.")
}

#[tokio::test]
async fn forward_rewrites_injects_and_relays() {
	let server = MockServer::start_async().await;
	let source = counting_source();
	let (handler, _) =
		build_test_handler(&server.address().to_string(), "/api/v1", source.clone());
	let leaked = server
		.mock_async(|when, then| {
			when.query_param("refresh", "30s");
			then.status(418);
		})
		.await;
	let upstream = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/query")
				.query_param("x", "1")
				.header("authorization", "Bearer token-1")
				.header("x-dashboard", "grafana")
				.body("query=up");
			then.status(202)
				.header("x-upstream", "a")
				.header("x-upstream", "b")
				.body("{\"status\":\"success\"}");
		})
		.await;
	let request = Request::builder()
		.method("POST")
		.uri("/query?refresh=30s&x=1")
		.header("host", "localhost:7777")
		.header("x-dashboard", "grafana")
		.body(Body::from("query=up"))
		.expect("Inbound request fixture should build.");
	let response = handler.forward(request).await.expect("Forward should succeed.");

	assert_eq!(response.status(), StatusCode::ACCEPTED);
	assert_eq!(
		response.headers().get_all("x-upstream").iter().collect::<Vec<_>>(),
		["a", "b"]
	);
	assert_eq!(body_text(response).await, "{\"status\":\"success\"}");

	upstream.assert_calls_async(1).await;
	leaked.assert_calls_async(0).await;

	assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn caller_authorization_bypasses_the_mint() {
	let server = MockServer::start_async().await;
	let source = counting_source();
	let (handler, mint) = build_test_handler(&server.address().to_string(), "", source.clone());
	let upstream = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/labels").header("authorization", "Bearer caller");
			then.status(200).body("labels");
		})
		.await;
	let request = Request::builder()
		.uri("/api/v1/labels")
		.header(AUTHORIZATION, "Bearer caller")
		.body(Body::empty())
		.expect("Inbound request fixture should build.");
	let response = handler.forward(request).await.expect("Forward should succeed.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_text(response).await, "labels");

	upstream.assert_calls_async(1).await;

	assert_eq!(source.fetches(), 0);
	assert_eq!(mint.metrics().attempts(), 0);
}

#[tokio::test]
async fn repeated_caller_authorization_values_pass_through_in_order() {
	let remote = spawn_authorization_echo().await;
	let source = counting_source();
	let (handler, mint) = build_test_handler(&remote, "", source.clone());
	let request = Request::builder()
		.uri("/api/v1/query")
		.header(AUTHORIZATION, "Bearer first")
		.header(AUTHORIZATION, "Basic c2Vjb25k")
		.body(Body::empty())
		.expect("Inbound request fixture should build.");
	let response = handler.forward(request).await.expect("Forward should succeed.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_text(response).await, "Bearer first\nBasic c2Vjb25k");
	assert_eq!(source.fetches(), 0);
	assert_eq!(mint.metrics().attempts(), 0);
}

#[tokio::test]
async fn injected_authorization_is_the_only_value() {
	let remote = spawn_authorization_echo().await;
	let (handler, _) = build_test_handler(&remote, "", counting_source());
	let response = handler.forward(get("/api/v1/query")).await.expect("Forward should succeed.");

	assert_eq!(body_text(response).await, "Bearer token-1");
}

#[tokio::test]
async fn unencodable_token_fails_the_request_build() {
	let server = MockServer::start_async().await;
	let upstream = server
		.mock_async(|when, then| {
			when.path("/api/v1/query");
			then.status(200);
		})
		.await;
	let (handler, _) = build_test_handler(
		&server.address().to_string(),
		"",
		Arc::new(StaticSource::new("broken\ntoken")),
	);
	let err = handler
		.forward(get("/api/v1/query"))
		.await
		.expect_err("A token with a newline cannot become a header.");

	assert_eq!(err.kind(), ErrorKind::RequestBuildFailed);

	let response = err.into_response();

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(body_text(response).await, "unable to create proxied request");

	upstream.assert_calls_async(0).await;
}

#[tokio::test]
async fn cached_token_is_reused_across_requests() {
	let server = MockServer::start_async().await;
	let source = counting_source();
	let (handler, _) = build_test_handler(&server.address().to_string(), "", source.clone());
	let upstream = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/query").header("authorization", "Bearer token-1");
			then.status(200);
		})
		.await;

	for _ in 0..3 {
		let request = Request::builder()
			.uri("/api/v1/query?query=up")
			.body(Body::empty())
			.expect("Inbound request fixture should build.");

		handler.forward(request).await.expect("Forward should succeed.");
	}

	upstream.assert_calls_async(3).await;

	assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn upstream_error_statuses_are_relayed_verbatim() {
	let server = MockServer::start_async().await;
	let (handler, _) =
		build_test_handler(&server.address().to_string(), "", counting_source());

	server
		.mock_async(|when, then| {
			when.path("/api/v1/query");
			then.status(503).header("retry-after", "5").body("overloaded");
		})
		.await;

	let request = Request::builder()
		.uri("/api/v1/query")
		.body(Body::empty())
		.expect("Inbound request fixture should build.");
	let response = handler.forward(request).await.expect("Upstream errors are not proxy errors.");

	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(response.headers()["retry-after"], "5");
	assert_eq!(body_text(response).await, "overloaded");
}

#[tokio::test]
async fn token_failure_skips_the_upstream() {
	let server = MockServer::start_async().await;
	let source = Arc::new(CountingSource::failing());
	let (handler, mint) = build_test_handler(&server.address().to_string(), "", source.clone());
	let upstream = server
		.mock_async(|when, then| {
			when.path("/api/v1/query");
			then.status(200);
		})
		.await;
	let request = Request::builder()
		.uri("/api/v1/query")
		.body(Body::empty())
		.expect("Inbound request fixture should build.");
	let err = handler.forward(request).await.expect_err("Token failure should abort the request.");

	assert_eq!(err.kind(), ErrorKind::TokenUnavailable);
	assert_eq!(err.public_message(), "unable to obtain token");

	upstream.assert_calls_async(0).await;

	assert_eq!(source.fetches(), 1);
	assert_eq!(mint.metrics().failures(), 1);
	assert!(mint.cached().is_none());
}

#[tokio::test]
async fn unreachable_upstream_is_reported() {
	let listener = std::net::TcpListener::bind("127.0.0.1:0")
		.expect("Ephemeral port should be available.");
	let remote = listener.local_addr().expect("Listener should expose its address.").to_string();

	drop(listener);

	let (handler, _) = build_test_handler(&remote, "", counting_source());
	let request = Request::builder()
		.uri("/api/v1/query")
		.body(Body::empty())
		.expect("Inbound request fixture should build.");
	let err = handler.forward(request).await.expect_err("Closed port should be unreachable.");

	assert_eq!(err.kind(), ErrorKind::UpstreamUnreachable);
	assert_eq!(err.public_message(), "unable to execute proxied request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_fetch() {
	let server = MockServer::start_async().await;
	let source = Arc::new(
		CountingSource::new(Duration::minutes(30))
			.with_delay(std::time::Duration::from_millis(100)),
	);
	let (handler, _) = build_test_handler(&server.address().to_string(), "", source.clone());
	let upstream = server
		.mock_async(|when, then| {
			when.path("/api/v1/query").header("authorization", "Bearer token-1");
			then.status(200);
		})
		.await;
	let tasks = (0..16)
		.map(|_| {
			let handler = handler.clone();

			tokio::spawn(async move {
				let request = Request::builder()
					.uri("/api/v1/query")
					.body(Body::empty())
					.expect("Inbound request fixture should build.");

				handler.forward(request).await
			})
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let response = task
			.await
			.expect("Forward task should not panic.")
			.expect("Concurrent forward should succeed.");

		assert_eq!(response.status(), StatusCode::OK);
	}

	upstream.assert_calls_async(16).await;

	assert_eq!(source.fetches(), 1);
}

#[cfg(feature = "metrics")]
#[test]
fn each_request_records_exactly_one_outcome() {
	let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
	let handle = recorder.handle();
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.expect("Test runtime should build.");

	metrics::with_local_recorder(&recorder, || {
		runtime.block_on(async {
			let server = MockServer::start_async().await;

			server
				.mock_async(|when, then| {
					when.path("/api/v1/query");
					then.status(204);
				})
				.await;

			let remote = server.address().to_string();
			let (relaying, _) = build_test_handler(&remote, "", counting_source());
			let (failing, _) = build_test_handler(&remote, "", Arc::new(CountingSource::failing()));

			for _ in 0..2 {
				relaying.forward(get("/api/v1/query")).await.expect("Forward should succeed.");
			}

			failing.forward(get("/api/v1/query")).await.expect_err("Token failure should abort.");
		})
	});

	let rendered = handle.render();
	let mut samples = rendered
		.lines()
		.filter(|line| {
			line.starts_with("promlens_gmp_token_proxy_proxied_status")
				|| line.starts_with("promlens_gmp_token_proxy_proxied_error")
		})
		.collect::<Vec<_>>();

	samples.sort_unstable();

	assert_eq!(
		samples,
		[
			"promlens_gmp_token_proxy_proxied_error{kind=\"token_unavailable\"} 1",
			"promlens_gmp_token_proxy_proxied_status{code=\"204\"} 2",
		]
	);
	assert!(rendered.contains("promlens_gmp_token_proxy_proxied_total 2"));
	assert!(rendered.contains("promlens_gmp_token_proxy_tokens_total 2"));
	assert!(rendered.contains("promlens_gmp_token_proxy_tokens_error 1"));
}
