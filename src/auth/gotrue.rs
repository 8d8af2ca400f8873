//! [`SessionProvider`] backed by a GoTrue-compatible auth server (the hosted backend's auth API).

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransientError, TransportError},
	ext::{SessionFuture, SessionIdentity, SessionProvider},
	http::ReqwestHttpClient,
};

const ENDPOINT: &str = "identity provider";

/// Resolves bearer sessions by calling `GET {project}/auth/v1/user`.
///
/// `200` yields the user object, `401`/`403` mean the session is absent, expired, or revoked, and
/// any other status is reported as a provider failure.
#[derive(Clone, Debug)]
pub struct GoTrueSessionProvider {
	http_client: ReqwestHttpClient,
	user_endpoint: Url,
	api_key: TokenSecret,
}
impl GoTrueSessionProvider {
	/// Path of the "current user" endpoint relative to the project URL.
	pub const USER_PATH: &'static str = "auth/v1/user";
	/// Timeout applied to provider lookups by [`GoTrueSessionProvider::new`].
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(5);

	/// Creates a provider for `project_url` using the project's public API key.
	///
	/// `project_url` should be the bare project origin (or end with `/`) so the user path is
	/// appended rather than substituted.
	pub fn new(project_url: &Url, api_key: TokenSecret) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(Self::DEFAULT_TIMEOUT)?;

		Self::with_http_client(project_url, api_key, http_client)
	}

	/// Creates a provider that reuses the caller-provided HTTP client.
	pub fn with_http_client(
		project_url: &Url,
		api_key: TokenSecret,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let user_endpoint = project_url.join(Self::USER_PATH)?;

		Ok(Self { http_client, user_endpoint, api_key })
	}

	async fn lookup(&self, bearer: &TokenSecret) -> Result<Option<SessionIdentity>> {
		let response = self
			.http_client
			.get(self.user_endpoint.clone())
			.bearer_auth(bearer.expose())
			.header("apikey", self.api_key.expose())
			.send()
			.await
			.map_err(|e| TransportError::network(ENDPOINT, e))?;
		let status = response.status().as_u16();

		match status {
			200..=299 => {
				let body =
					response.bytes().await.map_err(|e| TransportError::network(ENDPOINT, e))?;
				let mut de = serde_json::Deserializer::from_slice(&body);
				let identity =
					serde_path_to_error::deserialize(&mut de).map_err(|source| {
						let status = Some(status);

						TransientError::ResponseParse { endpoint: ENDPOINT, source, status }
					})?;

				Ok(Some(identity))
			},
			401 | 403 => Ok(None),
			status => Err(TransientError::IdentityProvider { status }.into()),
		}
	}
}
impl SessionProvider for GoTrueSessionProvider {
	fn resolve<'a>(&'a self, bearer: &'a TokenSecret) -> SessionFuture<'a> {
		Box::pin(self.lookup(bearer))
	}
}
