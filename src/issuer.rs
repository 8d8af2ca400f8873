//! Token issuance: guard pipeline, request validation, configuration check, and minting.
//!
//! [`TokenIssuer::issue`] is the only code path that touches the signing certificate. Every
//! request runs the configured guards in order (rate limit, required parameters, bearer
//! authentication by default), then validates the parameters, resolves the signing key, and mints
//! a fresh token whose expiry is derived from the server clock.

// self
use crate::{
	_prelude::*,
	auth::{ChannelName, Role, SessionAuthenticator, TokenSecret},
	ext::{RateLimitPolicy, SessionIdentity},
	guard::{BearerAuthGuard, Caller, Guard, IssueContext, RateLimitGuard, RequiredParamsGuard},
	obs::{self, OperationKind, OperationSpan, Outcome},
	token::{SigningKey, TokenClaims},
};

/// Query parameters of a token request exactly as received.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTokenRequest {
	/// Requested channel name.
	#[serde(default)]
	pub channel: Option<String>,
	/// Requested participant uid, in decimal.
	#[serde(default)]
	pub uid: Option<String>,
	/// Requested role label; absent means publisher.
	#[serde(default)]
	pub role: Option<String>,
}
impl RawTokenRequest {
	/// Creates a request naming a channel, uid, and role.
	pub fn new(channel: impl Into<String>, uid: impl Into<String>, role: Option<Role>) -> Self {
		Self {
			channel: Some(channel.into()),
			uid: Some(uid.into()),
			role: role.map(|role| role.as_str().to_owned()),
		}
	}
}

/// A token request whose parameters passed structural validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Channel the token will be bound to.
	pub channel: ChannelName,
	/// Participant uid the token will be bound to.
	pub uid: u32,
	/// Role determining publish privileges.
	pub role: Role,
}
impl TryFrom<&RawTokenRequest> for TokenRequest {
	type Error = Error;

	fn try_from(raw: &RawTokenRequest) -> Result<Self> {
		let missing = || Error::bad_request(Error::MISSING_PARAMETERS);
		let channel = raw.channel.as_deref().ok_or_else(missing)?;
		let uid = raw.uid.as_deref().ok_or_else(missing)?;
		let channel =
			ChannelName::new(channel).map_err(|_| Error::bad_request(Error::INVALID_CHANNEL))?;
		let uid = uid.parse::<u32>().map_err(|_| Error::bad_request(Error::INVALID_UID))?;
		let role = match raw.role.as_deref() {
			None | Some("") => Role::default(),
			Some(label) =>
				label.parse::<Role>().map_err(|_| Error::bad_request(Error::INVALID_ROLE))?,
		};

		Ok(Self { channel, uid, role })
	}
}

/// Response body returned for a successful issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
	/// Application identifier the client initializes its engine with.
	pub app_id: String,
	/// Signed channel token.
	pub token: String,
	/// Channel the token is bound to.
	pub channel: String,
	/// Participant uid the token is bound to.
	pub uid: u32,
	/// Absolute expiry instant.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// Lifetime in seconds the token was minted with.
	pub ttl: u32,
}

/// Application identifier and certificate as configured, either of which may be absent.
#[derive(Clone, Debug, Default)]
pub struct MintCredentials {
	/// Application identifier (`AGORA_APP_ID`).
	pub app_id: Option<String>,
	/// Signing certificate (`AGORA_APP_CERT`).
	pub app_certificate: Option<TokenSecret>,
}
impl MintCredentials {
	/// Name of the application identifier setting.
	pub const APP_ID_VAR: &'static str = "AGORA_APP_ID";
	/// Name of the certificate setting.
	pub const APP_CERT_VAR: &'static str = "AGORA_APP_CERT";

	/// Creates fully populated credentials.
	pub fn new(app_id: impl Into<String>, app_certificate: TokenSecret) -> Self {
		Self { app_id: Some(app_id.into()), app_certificate: Some(app_certificate) }
	}

	/// Resolves the signing key, reporting the first missing setting.
	pub fn signing_key(&self) -> Result<SigningKey> {
		let app_id = self
			.app_id
			.as_deref()
			.filter(|id| !id.is_empty())
			.ok_or(Error::ServerMisconfigured { missing: Self::APP_ID_VAR })?;
		let certificate = self
			.app_certificate
			.clone()
			.filter(|cert| !cert.is_empty())
			.ok_or(Error::ServerMisconfigured { missing: Self::APP_CERT_VAR })?;

		Ok(SigningKey::new(app_id, certificate)?)
	}
}

/// Mints channel tokens for authenticated, rate-limited callers.
#[derive(Clone)]
pub struct TokenIssuer {
	guards: Vec<Arc<dyn Guard>>,
	credentials: MintCredentials,
	ttl: Duration,
}
impl TokenIssuer {
	/// Default token lifetime (120 seconds).
	pub const DEFAULT_TTL: Duration = Duration::seconds(120);

	/// Creates an issuer running the standard guards: rate limit, required parameters, then
	/// bearer authentication.
	pub fn new(
		rate_limit: Arc<dyn RateLimitPolicy>,
		authenticator: SessionAuthenticator,
		credentials: MintCredentials,
	) -> Self {
		let guards: Vec<Arc<dyn Guard>> = vec![
			Arc::new(RateLimitGuard::new(rate_limit)),
			Arc::new(RequiredParamsGuard),
			Arc::new(BearerAuthGuard::new(authenticator)),
		];

		Self::with_guards(guards, credentials)
	}

	/// Creates an issuer running exactly `guards`, in order.
	pub fn with_guards(guards: Vec<Arc<dyn Guard>>, credentials: MintCredentials) -> Self {
		Self { guards, credentials, ttl: Self::DEFAULT_TTL }
	}

	/// Overrides the token lifetime.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Token lifetime applied at mint time.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Runs the full issuance pipeline for one request.
	pub async fn issue(&self, request: RawTokenRequest, caller: Caller) -> Result<IssuedToken> {
		const KIND: OperationKind = OperationKind::IssueToken;

		let span = OperationSpan::new(KIND, "issue");

		obs::record_operation_outcome(KIND, Outcome::Attempt);

		let result = span
			.instrument(async move {
				let mut context = IssueContext::new(caller, request);

				for guard in &self.guards {
					if let Err(e) = guard.check(&mut context).await {
						tracing::debug!(
							guard = guard.name(),
							kind = e.kind(),
							"Guard rejected request."
						);

						return Err(e);
					}
				}

				let request = TokenRequest::try_from(&context.request)?;

				self.mint(&request, context.observed_at, context.session.as_ref())
			})
			.await;

		obs::record_operation_outcome(KIND, Outcome::of(&result));

		result
	}

	fn mint(
		&self,
		request: &TokenRequest,
		now: OffsetDateTime,
		session: Option<&SessionIdentity>,
	) -> Result<IssuedToken> {
		let key = self.credentials.signing_key().inspect_err(|e| {
			tracing::error!(error = %e, "Token signing credentials are not usable.");
		})?;
		let ttl = u32::try_from(self.ttl.whole_seconds())
			.map_err(|_| Error::ServerMisconfigured { missing: "TOKEN_TTL_SECONDS" })?;
		let expires_at = now + self.ttl;
		let token =
			TokenClaims::new(request.channel.clone(), request.uid, request.role, expires_at)
				.and_then(|claims| key.sign(&claims))
				.inspect_err(|e| tracing::error!(error = %e, "Token signing failed."))?;

		tracing::info!(
			user = session.map(|identity| identity.user_id.as_str()),
			channel = %request.channel,
			uid = request.uid,
			role = %request.role,
			"Issued channel token."
		);

		Ok(IssuedToken {
			app_id: key.app_id().to_owned(),
			token,
			channel: request.channel.to_string(),
			uid: request.uid,
			expires_at,
			ttl,
		})
	}
}
impl Debug for TokenIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenIssuer")
			.field("guards", &self.guards.iter().map(|guard| guard.name()).collect::<Vec<_>>())
			.field("credentials", &self.credentials)
			.field("ttl", &self.ttl)
			.finish()
	}
}
