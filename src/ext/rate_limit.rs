//! Rate limit policy contracts consulted before the issuer authenticates a caller.

// self
use crate::{_prelude::*, auth::ClientKey, store::StoreError};

/// Boxed future returned by [`RateLimitPolicy::evaluate`].
pub type RateLimitFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RateLimitDecision, StoreError>> + 'a + Send>>;

/// Strategy that counts a caller's request against its budget and decides whether it may proceed.
///
/// Implementations must make the increment and the comparison a single atomic step per key;
/// two concurrent requests from the same key must never both observe a stale count.
pub trait RateLimitPolicy
where
	Self: Send + Sync,
{
	/// Records one request for `context.key` and evaluates it against the budget.
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitFuture<'_>;
}

/// Fixed-window budget shared by every key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedWindow {
	/// Window length.
	pub window: Duration,
	/// Requests allowed per key within one window.
	pub max_requests: u32,
}
impl FixedWindow {
	/// Default window length (60 seconds).
	pub const DEFAULT_WINDOW: Duration = Duration::milliseconds(60_000);
	/// Default request budget per window.
	pub const DEFAULT_MAX_REQUESTS: u32 = 10;

	/// Creates a budget with the provided window and request count.
	pub const fn new(window: Duration, max_requests: u32) -> Self {
		Self { window, max_requests }
	}
}
impl Default for FixedWindow {
	fn default() -> Self {
		Self::new(Self::DEFAULT_WINDOW, Self::DEFAULT_MAX_REQUESTS)
	}
}

/// Context shared with a [`RateLimitPolicy`] before any authentication work is done.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Network identity of the caller.
	pub key: ClientKey,
	/// Logical operation being attempted.
	pub operation: String,
	/// Timestamp the issuer observed before invoking the policy.
	pub observed_at: OffsetDateTime,
}
impl RateLimitContext {
	/// Creates a new context for the given key/operation pair.
	pub fn new(key: ClientKey, operation: impl Into<String>) -> Self {
		Self { key, operation: operation.into(), observed_at: OffsetDateTime::now_utc() }
	}

	/// Overrides the timestamp associated with the observation.
	pub fn with_observed_at(mut self, instant: OffsetDateTime) -> Self {
		self.observed_at = instant;

		self
	}
}

/// Result emitted by a [`RateLimitPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately.
	Allow {
		/// Requests still available in the current window after this one.
		remaining: u32,
	},
	/// The request exceeded the budget and must be rejected.
	Delay(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` when the request may proceed.
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow { .. })
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}

	/// Whole seconds to advertise in a `Retry-After` header, rounded up and never zero.
	pub fn retry_after_secs(&self) -> u64 {
		let millis = self.recommended_backoff.whole_milliseconds().max(0) as u64;

		millis.div_ceil(1_000).max(1)
	}
}
