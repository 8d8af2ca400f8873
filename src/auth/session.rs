//! Bearer-session authentication against the identity provider.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	ext::{SessionIdentity, SessionProvider},
};

const BEARER_SCHEME: &str = "bearer";

/// Extracts the credential from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively; the credential must be a single non-empty token.
/// Anything else yields `None`.
pub fn bearer_credential(header: Option<&str>) -> Option<TokenSecret> {
	let (scheme, credential) = header?.trim().split_once(' ')?;

	if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
		return None;
	}

	let credential = credential.trim();

	if credential.is_empty() || credential.contains(char::is_whitespace) {
		return None;
	}

	Some(TokenSecret::new(credential))
}

/// Decides whether a presented bearer credential maps to a live session.
///
/// An absent header, a malformed header, a session the provider does not recognize, and a
/// provider that cannot be reached all produce the same [`Error::Unauthorized`]; only the
/// server-side logs tell them apart.
#[derive(Clone)]
pub struct SessionAuthenticator {
	provider: Arc<dyn SessionProvider>,
}
impl SessionAuthenticator {
	/// Creates an authenticator that delegates lookups to `provider`.
	pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
		Self { provider }
	}

	/// Resolves the raw `Authorization` header value to a session identity.
	pub async fn authenticate(&self, authorization: Option<&str>) -> Result<SessionIdentity> {
		let Some(bearer) = bearer_credential(authorization) else {
			tracing::debug!(header_present = authorization.is_some(), "Rejected bearer header.");

			return Err(Error::Unauthorized);
		};

		match self.provider.resolve(&bearer).await {
			Ok(Some(identity)) => Ok(identity),
			Ok(None) => {
				tracing::debug!("Identity provider reported no live session.");

				Err(Error::Unauthorized)
			},
			Err(e) => {
				tracing::warn!(error = %e, kind = e.kind(), "Identity provider lookup failed.");

				Err(Error::Unauthorized)
			},
		}
	}
}
impl Debug for SessionAuthenticator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SessionAuthenticator(..)")
	}
}
