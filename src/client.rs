//! Calling-application side of the token protocol.
//!
//! [`TokenFetcher`] reads the caller's current session from a [`SessionSource`], requests a token
//! from `GET {server}/api/token`, and returns the decoded [`IssuedToken`]. It never retries and
//! never panics; every failure comes back as an [`Error`]. Throttling and gateway statuses are
//! transient; every other rejection is final.

// self
use crate::{
	_prelude::*,
	auth::{ChannelName, Role, TokenSecret},
	call::{TokenSource, TokenSourceFuture},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata},
	issuer::IssuedToken,
	obs::{self, OperationKind, OperationSpan, Outcome},
};

const ENDPOINT: &str = "token endpoint";

/// Boxed future returned by [`SessionSource::access_token`].
pub type SessionSourceFuture<'a> =
	Pin<Box<dyn Future<Output = Option<TokenSecret>> + 'a + Send>>;

/// Where the calling application keeps its signed-in session.
pub trait SessionSource
where
	Self: Send + Sync,
{
	/// Returns the current session's access token, or `None` when signed out.
	fn access_token(&self) -> SessionSourceFuture<'_>;
}

/// In-memory session holder for applications that manage sign-in themselves.
#[derive(Debug, Default)]
pub struct LocalSession {
	access_token: RwLock<Option<TokenSecret>>,
}
impl LocalSession {
	/// Creates a holder already signed in with `access_token`.
	pub fn signed_in(access_token: impl Into<String>) -> Self {
		Self { access_token: RwLock::new(Some(TokenSecret::new(access_token))) }
	}

	/// Replaces the current session.
	pub fn sign_in(&self, access_token: impl Into<String>) {
		*self.access_token.write() = Some(TokenSecret::new(access_token));
	}

	/// Drops the current session.
	pub fn sign_out(&self) {
		*self.access_token.write() = None;
	}
}
impl SessionSource for LocalSession {
	fn access_token(&self) -> SessionSourceFuture<'_> {
		let token = self.access_token.read().clone();

		Box::pin(async move { token })
	}
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
	error: String,
}

/// Fetches channel tokens on behalf of the signed-in user.
#[derive(Clone)]
pub struct TokenFetcher {
	http_client: ReqwestHttpClient,
	endpoint: Url,
	sessions: Arc<dyn SessionSource>,
}
impl TokenFetcher {
	/// Path of the issuance endpoint on the token server.
	pub const TOKEN_PATH: &'static str = "/api/token";
	/// Time after which a pending request is abandoned.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(10);

	/// Creates a fetcher for the token server at `server_url`.
	pub fn new(server_url: &Url, sessions: Arc<dyn SessionSource>) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(Self::DEFAULT_TIMEOUT)?;

		Self::with_http_client(server_url, sessions, http_client)
	}

	/// Creates a fetcher that reuses the caller-provided HTTP client.
	pub fn with_http_client(
		server_url: &Url,
		sessions: Arc<dyn SessionSource>,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let endpoint = server_url.join(Self::TOKEN_PATH)?;

		Ok(Self { http_client, endpoint, sessions })
	}

	/// Issuance endpoint this fetcher calls.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Requests a token for `channel`/`uid`/`role` with the current session.
	///
	/// Fails with [`Error::NoActiveSession`] before any network traffic when signed out.
	pub async fn fetch_token(
		&self,
		channel: &ChannelName,
		uid: u32,
		role: Role,
	) -> Result<IssuedToken> {
		const KIND: OperationKind = OperationKind::FetchToken;

		let span = OperationSpan::new(KIND, "fetch_token");

		obs::record_operation_outcome(KIND, Outcome::Attempt);

		let result = span.instrument(self.request(channel, uid, role)).await;

		if let Err(e) = &result {
			tracing::warn!(error = %e, kind = e.kind(), "Token fetch failed.");
		}

		obs::record_operation_outcome(KIND, Outcome::of(&result));

		result
	}

	async fn request(&self, channel: &ChannelName, uid: u32, role: Role) -> Result<IssuedToken> {
		let access_token = self.sessions.access_token().await.ok_or(Error::NoActiveSession)?;
		let mut url = self.endpoint.clone();

		url.query_pairs_mut()
			.append_pair("channel", channel)
			.append_pair("uid", &uid.to_string())
			.append_pair("role", role.as_str());

		let response = self
			.http_client
			.get(url)
			.bearer_auth(access_token.expose())
			.send()
			.await
			.map_err(|e| TransportError::network(ENDPOINT, e))?;
		let meta = ResponseMetadata::from_response(&response);
		let status = response.status();
		let body = response.bytes().await.map_err(|e| TransportError::network(ENDPOINT, e))?;

		if !status.is_success() {
			let message = serde_json::from_slice::<ErrorBody>(&body)
				.map(|body| body.error)
				.unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_owned());

			return Err(match status.as_u16() {
				429 | 502 | 503 | 504 => TransientError::TokenEndpoint {
					message,
					status: meta.status,
					retry_after: meta.retry_after,
				}
				.into(),
				status => Error::TokenEndpointRejected { status, message },
			});
		}

		let mut de = serde_json::Deserializer::from_slice(&body);

		serde_path_to_error::deserialize(&mut de).map_err(|source| {
			TransientError::ResponseParse { endpoint: ENDPOINT, source, status: meta.status }.into()
		})
	}
}
impl TokenSource for TokenFetcher {
	fn fetch<'a>(
		&'a self,
		channel: &'a ChannelName,
		uid: u32,
		role: Role,
	) -> TokenSourceFuture<'a> {
		Box::pin(self.fetch_token(channel, uid, role))
	}
}
impl Debug for TokenFetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenFetcher").field("endpoint", &self.endpoint.as_str()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn local_session_tracks_sign_in_state() {
		let session = LocalSession::default();

		assert!(session.access_token().await.is_none());

		session.sign_in("access-1");

		assert_eq!(
			session.access_token().await.map(|token| token.expose().to_owned()).as_deref(),
			Some("access-1")
		);

		session.sign_out();

		assert!(session.access_token().await.is_none());
	}

	#[test]
	fn endpoint_replaces_any_server_path() {
		let server = Url::parse("https://tokens.example/app/").expect("Server URL should parse.");
		let fetcher = TokenFetcher::new(&server, Arc::new(LocalSession::default()))
			.expect("Fetcher should build.");

		assert_eq!(fetcher.endpoint().as_str(), "https://tokens.example/api/token");
	}
}
