//! Session lookup contract implemented by identity providers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Boxed future returned by [`SessionProvider::resolve`].
pub type SessionFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Option<SessionIdentity>>> + 'a + Send>>;

/// "Get the current session for this bearer token" as offered by the identity provider.
///
/// Implementations return `Ok(None)` when the provider explicitly reports the session as absent,
/// expired, or revoked, and `Err` when the provider could not be consulted at all. The
/// authenticator collapses both into the same client-facing rejection.
pub trait SessionProvider
where
	Self: Send + Sync,
{
	/// Resolves `bearer` to a live session identity.
	fn resolve<'a>(&'a self, bearer: &'a TokenSecret) -> SessionFuture<'a>;
}

/// Identity of a caller whose session the provider confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
	/// Subject identifier assigned by the identity provider.
	#[serde(rename = "id")]
	pub user_id: String,
	/// Email address on the account, when the provider shares it.
	#[serde(default)]
	pub email: Option<String>,
}
impl SessionIdentity {
	/// Creates an identity for the provided subject.
	pub fn new(user_id: impl Into<String>) -> Self {
		Self { user_id: user_id.into(), email: None }
	}

	/// Attaches an email address.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}
}
