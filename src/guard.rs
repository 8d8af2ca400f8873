//! Ordered request guards run by [`TokenIssuer`](crate::issuer::TokenIssuer) before minting.
//!
//! Each guard either lets the request continue or ends it with a terminal [`Error`]. The issuer
//! runs them in list order and stops at the first failure, so a guard never observes work that a
//! later guard would have done.

// self
use crate::{
	_prelude::*,
	auth::{ClientKey, SessionAuthenticator, TokenSecret},
	ext::{RateLimitContext, RateLimitDecision, RateLimitPolicy, SessionIdentity},
	issuer::RawTokenRequest,
};

/// Boxed future returned by [`Guard::check`].
pub type GuardFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// One stage of the issuance pipeline.
pub trait Guard
where
	Self: Send + Sync,
{
	/// Stable label used in logs.
	fn name(&self) -> &'static str;

	/// Inspects (and may enrich) `context`; an `Err` rejects the request.
	fn check<'a>(&'a self, context: &'a mut IssueContext) -> GuardFuture<'a>;
}

/// Transport-level facts about the caller, captured before any guard runs.
#[derive(Clone, Debug)]
pub struct Caller {
	/// Network identity used as the rate-limit key.
	pub client_key: ClientKey,
	/// Raw `Authorization` header value, if one was sent.
	pub authorization: Option<TokenSecret>,
}
impl Caller {
	/// Creates a caller without credentials.
	pub fn new(client_key: ClientKey) -> Self {
		Self { client_key, authorization: None }
	}

	/// Attaches the raw `Authorization` header value.
	pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
		self.authorization = Some(TokenSecret::new(header));

		self
	}
}

/// Mutable state threaded through the guard list for one request.
#[derive(Clone, Debug)]
pub struct IssueContext {
	/// Who is asking.
	pub caller: Caller,
	/// Query parameters exactly as received.
	pub request: RawTokenRequest,
	/// Instant the issuer observed the request.
	pub observed_at: OffsetDateTime,
	/// Identity resolved by [`BearerAuthGuard`], once it has run.
	pub session: Option<SessionIdentity>,
}
impl IssueContext {
	/// Creates a context observed now.
	pub fn new(caller: Caller, request: RawTokenRequest) -> Self {
		Self { caller, request, observed_at: OffsetDateTime::now_utc(), session: None }
	}
}

/// Counts the request against the caller's fixed-window budget.
#[derive(Clone)]
pub struct RateLimitGuard {
	policy: Arc<dyn RateLimitPolicy>,
}
impl RateLimitGuard {
	/// Operation label recorded in [`RateLimitContext::operation`].
	pub const OPERATION: &'static str = "issue_token";

	/// Wraps a rate-limit policy.
	pub fn new(policy: Arc<dyn RateLimitPolicy>) -> Self {
		Self { policy }
	}
}
impl Guard for RateLimitGuard {
	fn name(&self) -> &'static str {
		"rate_limit"
	}

	fn check<'a>(&'a self, context: &'a mut IssueContext) -> GuardFuture<'a> {
		Box::pin(async move {
			let limit_context =
				RateLimitContext::new(context.caller.client_key.clone(), Self::OPERATION)
					.with_observed_at(context.observed_at);

			match self.policy.evaluate(&limit_context).await? {
				RateLimitDecision::Allow { .. } => Ok(()),
				RateLimitDecision::Delay(directive) => {
					tracing::info!(
						client = %context.caller.client_key,
						retry_after_secs = directive.retry_after_secs(),
						"Token request rate limited."
					);

					Err(Error::RateLimited(directive))
				},
			}
		})
	}
}
impl Debug for RateLimitGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RateLimitGuard(..)")
	}
}

/// Rejects requests that do not name both a channel and a uid.
///
/// Only presence is checked here; the values are validated after authentication.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequiredParamsGuard;
impl Guard for RequiredParamsGuard {
	fn name(&self) -> &'static str {
		"required_params"
	}

	fn check<'a>(&'a self, context: &'a mut IssueContext) -> GuardFuture<'a> {
		let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
		let outcome = if present(&context.request.channel) && present(&context.request.uid) {
			Ok(())
		} else {
			Err(Error::bad_request(Error::MISSING_PARAMETERS))
		};

		Box::pin(async move { outcome })
	}
}

/// Resolves the caller's bearer session and records the identity on the context.
#[derive(Clone, Debug)]
pub struct BearerAuthGuard {
	authenticator: SessionAuthenticator,
}
impl BearerAuthGuard {
	/// Wraps a session authenticator.
	pub fn new(authenticator: SessionAuthenticator) -> Self {
		Self { authenticator }
	}
}
impl Guard for BearerAuthGuard {
	fn name(&self) -> &'static str {
		"bearer_auth"
	}

	fn check<'a>(&'a self, context: &'a mut IssueContext) -> GuardFuture<'a> {
		Box::pin(async move {
			let header = context.caller.authorization.as_ref().map(TokenSecret::expose);
			let identity = self.authenticator.authenticate(header).await?;

			context.session = Some(identity);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{ext::FixedWindow, store::MemoryRateLimitStore};

	fn context(channel: Option<&str>, uid: Option<&str>) -> IssueContext {
		let key = ClientKey::new("198.51.100.4").expect("Client key fixture should be valid.");
		let caller = Caller::new(key);
		let request = RawTokenRequest {
			channel: channel.map(str::to_owned),
			uid: uid.map(str::to_owned),
			role: None,
		};

		IssueContext::new(caller, request)
	}

	#[tokio::test]
	async fn required_params_rejects_absent_and_empty_values() {
		let guard = RequiredParamsGuard;

		for (channel, uid) in [(None, Some("1")), (Some("room"), None), (Some(""), Some("1"))] {
			let err = guard
				.check(&mut context(channel, uid))
				.await
				.expect_err("Incomplete requests should be rejected.");

			assert!(matches!(
				err,
				Error::BadRequest { reason } if reason == Error::MISSING_PARAMETERS
			));
		}

		guard
			.check(&mut context(Some("room"), Some("0")))
			.await
			.expect("uid `0` is present and must pass.");
	}

	#[tokio::test]
	async fn rate_limit_guard_surfaces_retry_directive() {
		let store = MemoryRateLimitStore::new(FixedWindow::new(Duration::seconds(60), 1));
		let guard = RateLimitGuard::new(Arc::new(store));
		let mut ctx = context(Some("room"), Some("1"));

		guard.check(&mut ctx).await.expect("First request fits the budget.");

		let err = guard.check(&mut ctx).await.expect_err("Second request exceeds the budget.");

		assert!(matches!(
			err,
			Error::RateLimited(ref directive) if directive.retry_after_secs() == 60
		));
	}
}
