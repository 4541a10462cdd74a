//! Target rewrite applied to every inbound request before it is forwarded.

// crates.io
use axum::http::Uri;
use url::form_urlencoded;
// self
use crate::_prelude::*;

/// Query parameters the upstream rejects; removed from every outbound URL.
pub const DEFAULT_STRIPPED_PARAMS: &[&str] = &["refresh"];

/// Fixed transformation from an inbound request target to the upstream URL.
///
/// The outbound path is the literal concatenation `path_prefix + inbound_path`; no separator is
/// inserted or removed.
#[derive(Clone, Debug)]
pub struct RewriteRule {
	base: Url,
	target_scheme: String,
	target_host: String,
	path_prefix: String,
	strip_query_params: BTreeSet<String>,
}
impl RewriteRule {
	/// Builds a rule targeting `target_scheme://target_host`, stripping
	/// [`DEFAULT_STRIPPED_PARAMS`].
	pub fn new(
		target_scheme: impl Into<String>,
		target_host: impl Into<String>,
		path_prefix: impl Into<String>,
	) -> Result<Self> {
		let target_scheme = target_scheme.into();
		let target_host = target_host.into();

		if target_scheme.is_empty() {
			return Err(ConfigError::MissingValue("scheme").into());
		}
		if target_host.is_empty() {
			return Err(ConfigError::MissingValue("remote").into());
		}

		let raw = format!("{target_scheme}://{target_host}");
		let base = Url::parse(&raw).map_err(|source| ConfigError::InvalidUpstream {
			scheme: target_scheme.clone(),
			host: target_host.clone(),
			source,
		})?;

		if !matches!(base.path(), "" | "/")
			|| base.query().is_some()
			|| base.fragment().is_some()
			|| !base.username().is_empty()
		{
			return Err(ConfigError::UpstreamHasPath(raw).into());
		}

		Ok(Self {
			base,
			target_scheme,
			target_host,
			path_prefix: path_prefix.into(),
			strip_query_params: DEFAULT_STRIPPED_PARAMS.iter().map(|&p| p.to_owned()).collect(),
		})
	}

	/// Replaces the set of query parameter names removed from outbound URLs.
	pub fn with_strip_query_params<I, S>(mut self, params: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.strip_query_params = params.into_iter().map(Into::into).collect();

		self
	}

	/// Scheme forced onto every outbound URL.
	pub fn target_scheme(&self) -> &str {
		&self.target_scheme
	}

	/// Upstream `host[:port]` forced onto every outbound URL.
	pub fn target_host(&self) -> &str {
		&self.target_host
	}

	/// Prefix prepended verbatim to every inbound path.
	pub fn path_prefix(&self) -> &str {
		&self.path_prefix
	}

	/// Parameter names removed from every outbound query.
	pub fn strip_query_params(&self) -> &BTreeSet<String> {
		&self.strip_query_params
	}

	/// Maps an inbound request target onto the upstream.
	pub fn rewrite(&self, uri: &Uri) -> Url {
		self.rewrite_parts(uri.path(), uri.query())
	}

	/// Same as [`RewriteRule::rewrite`] for an already split path and query.
	pub fn rewrite_parts(&self, path: &str, query: Option<&str>) -> Url {
		let mut url = self.base.clone();

		url.set_path(&format!("{}{path}", self.path_prefix));
		url.set_query(query.and_then(|q| self.sanitize_query(q)).as_deref());

		url
	}

	/// Drops stripped parameters, keeping every other pair byte-for-byte and in order.
	fn sanitize_query(&self, query: &str) -> Option<String> {
		let kept = query
			.split('&')
			.filter(|pair| !pair.is_empty())
			.filter(|pair| {
				form_urlencoded::parse(pair.as_bytes())
					.next()
					.is_none_or(|(name, _)| !self.strip_query_params.contains(name.as_ref()))
			})
			.collect::<Vec<_>>();

		if kept.is_empty() { None } else { Some(kept.join("&")) }
	}
}
