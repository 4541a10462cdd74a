//! Application default credential discovery.
//!
//! [`CredentialSearch::resolve`] tries, in order:
//!
//! 1. the key file named by `GOOGLE_APPLICATION_CREDENTIALS` (a failure here is final),
//! 2. gcloud's `application_default_credentials.json`, when present,
//! 3. the compute metadata server, when it answers a ping.
//!
//! Key files may hold a service account key or gcloud user credentials. Finding nothing is a
//! startup error.

// self
use crate::{
	_prelude::*,
	token::source::{
		AuthorizedUserSource, MetadataServerSource, ServiceAccountSource, TokenSource,
	},
};

/// Environment variable naming an explicit credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Environment variable overriding gcloud's configuration directory.
pub const CLOUDSDK_CONFIG_ENV: &str = "CLOUDSDK_CONFIG";
/// Token endpoint used when a credentials file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const WELL_KNOWN_FILE: &str = "application_default_credentials.json";
const METADATA_PING_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
	ServiceAccount {
		client_email: String,
		private_key: String,
		private_key_id: Option<String>,
		token_uri: Option<String>,
	},
	AuthorizedUser {
		client_id: String,
		client_secret: String,
		refresh_token: String,
		token_uri: Option<String>,
	},
}

/// Where the resolved credential came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialOrigin {
	/// Service account key file.
	ServiceAccountFile(PathBuf),
	/// gcloud user credentials file.
	AuthorizedUserFile(PathBuf),
	/// Compute metadata server.
	MetadataServer,
}
impl CredentialOrigin {
	/// Stable label for startup logs.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ServiceAccountFile(_) => "service_account_file",
			Self::AuthorizedUserFile(_) => "authorized_user_file",
			Self::MetadataServer => "metadata_server",
		}
	}
}

/// Outcome of a successful [`CredentialSearch::resolve`].
pub struct ResolvedCredentials {
	/// Where the credential was found.
	pub origin: CredentialOrigin,
	/// Token source minting from that credential.
	pub source: Arc<dyn TokenSource>,
}
impl Debug for ResolvedCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResolvedCredentials").field("origin", &self.origin).finish()
	}
}

/// Locations searched for application default credentials.
#[derive(Clone, Debug)]
pub struct CredentialSearch {
	/// Explicit credentials file; when set, nothing else is tried.
	pub env_file: Option<PathBuf>,
	/// gcloud's well-known credentials file, skipped when absent.
	pub well_known_file: Option<PathBuf>,
	/// Metadata server tried last.
	pub metadata_endpoint: Url,
}
impl CredentialSearch {
	/// Reads the search locations from the process environment.
	pub fn from_env(metadata_endpoint: Url) -> Self {
		Self {
			env_file: env_path(CREDENTIALS_ENV),
			well_known_file: gcloud_config_dir().map(|dir| dir.join(WELL_KNOWN_FILE)),
			metadata_endpoint,
		}
	}

	/// Finds the first usable credential and wraps it in a [`TokenSource`].
	pub async fn resolve(
		&self,
		client: ReqwestClient,
		scopes: &[String],
	) -> Result<ResolvedCredentials> {
		if let Some(path) = &self.env_file {
			let bytes = std::fs::read(path).map_err(|source| {
				ConfigError::CredentialsFileUnreadable { path: path.to_owned(), source }
			})?;

			return from_file(client, path, &bytes, scopes);
		}
		if let Some(path) = &self.well_known_file {
			match std::fs::read(path) {
				Ok(bytes) => return from_file(client, path, &bytes, scopes),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
					tracing::debug!(path = %path.display(), "No gcloud credentials file.");
				},
				Err(source) =>
					return Err(ConfigError::CredentialsFileUnreadable {
						path: path.to_owned(),
						source,
					}
					.into()),
			}
		}
		if metadata_server_answers(&client, &self.metadata_endpoint).await {
			let source = MetadataServerSource::new(client, &self.metadata_endpoint, scopes)?;

			return Ok(ResolvedCredentials {
				origin: CredentialOrigin::MetadataServer,
				source: Arc::new(source),
			});
		}

		Err(ConfigError::NoDefaultCredentials.into())
	}
}

fn from_file(
	client: ReqwestClient,
	path: &Path,
	bytes: &[u8],
	scopes: &[String],
) -> Result<ResolvedCredentials> {
	let file: CredentialsFile =
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(bytes))
			.map_err(|source| ConfigError::InvalidCredentialsFile {
				path: path.to_owned(),
				source,
			})?;

	Ok(match file {
		CredentialsFile::ServiceAccount { client_email, private_key, private_key_id, token_uri } => {
			let token_url = token_url(token_uri)?;
			let source = ServiceAccountSource::new(
				client,
				client_email,
				&private_key,
				private_key_id,
				token_url,
				scopes,
			)?;

			ResolvedCredentials {
				origin: CredentialOrigin::ServiceAccountFile(path.to_owned()),
				source: Arc::new(source),
			}
		},
		CredentialsFile::AuthorizedUser { client_id, client_secret, refresh_token, token_uri } => {
			let token_url = token_url(token_uri)?;
			let source = AuthorizedUserSource::new(
				client,
				&token_url,
				client_id,
				client_secret,
				refresh_token,
			)?;

			ResolvedCredentials {
				origin: CredentialOrigin::AuthorizedUserFile(path.to_owned()),
				source: Arc::new(source),
			}
		},
	})
}

fn token_url(raw: Option<String>) -> Result<Url> {
	let raw = raw.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_owned());

	Url::parse(&raw)
		.map_err(|source| ConfigError::InvalidCredentialEndpoint { endpoint: raw, source }.into())
}

async fn metadata_server_answers(client: &ReqwestClient, endpoint: &Url) -> bool {
	let ping = client
		.get(endpoint.clone())
		.header("Metadata-Flavor", "Google")
		.timeout(METADATA_PING_TIMEOUT)
		.send()
		.await;

	match ping {
		Ok(response) => response
			.headers()
			.get("metadata-flavor")
			.is_some_and(|flavor| flavor.as_bytes() == b"Google"),
		Err(e) => {
			tracing::debug!(endpoint = %endpoint, error = %e, "Metadata server did not answer.");

			false
		},
	}
}

fn env_path(name: &str) -> Option<PathBuf> {
	std::env::var_os(name).filter(|value| !value.is_empty()).map(PathBuf::from)
}

fn gcloud_config_dir() -> Option<PathBuf> {
	if let Some(dir) = env_path(CLOUDSDK_CONFIG_ENV) {
		return Some(dir);
	}

	#[cfg(windows)]
	{
		dirs::config_dir().map(|dir| dir.join("gcloud"))
	}
	#[cfg(not(windows))]
	{
		dirs::home_dir().map(|home| home.join(".config").join("gcloud"))
	}
}
