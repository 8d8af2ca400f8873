//! Process-local fixed-window [`RateLimitPolicy`] for single-instance deployments and tests.

// self
use crate::{
	_prelude::*,
	auth::ClientKey,
	ext::{
		FixedWindow, RateLimitContext, RateLimitDecision, RateLimitFuture, RateLimitPolicy,
		RetryDirective,
	},
};

type WindowSlot = Arc<Mutex<Window>>;
type WindowMap = Arc<RwLock<HashMap<ClientKey, WindowSlot>>>;

#[derive(Debug)]
struct Window {
	started_at: OffsetDateTime,
	count: u32,
}
impl Window {
	fn starting(instant: OffsetDateTime) -> Self {
		Self { started_at: instant, count: 0 }
	}

	// Instants stamped before the window started still count against it.
	fn has_elapsed(&self, budget: &FixedWindow, now: OffsetDateTime) -> bool {
		now - self.started_at >= budget.window
	}
}

/// Fixed-window counters keyed by client identity, held in process memory.
///
/// Each key owns its own lock, so the increment-and-compare for one caller never races with a
/// concurrent request from the same caller and never blocks other callers. Counters are lost on
/// restart and are not shared between instances; behind a load balancer the effective budget is
/// multiplied by the instance count.
#[derive(Clone, Debug, Default)]
pub struct MemoryRateLimitStore {
	budget: FixedWindow,
	windows: WindowMap,
}
impl MemoryRateLimitStore {
	/// Creates an empty store enforcing `budget`.
	pub fn new(budget: FixedWindow) -> Self {
		Self { budget, windows: Default::default() }
	}

	/// Budget enforced for every key.
	pub fn budget(&self) -> FixedWindow {
		self.budget
	}

	/// Number of keys currently tracked.
	pub fn len(&self) -> usize {
		self.windows.read().len()
	}

	/// Returns `true` when no key is tracked.
	pub fn is_empty(&self) -> bool {
		self.windows.read().is_empty()
	}

	/// Counts one request for `key` at `now` and decides whether it may proceed.
	pub fn hit(&self, key: &ClientKey, now: OffsetDateTime) -> RateLimitDecision {
		let slot = self.slot(key, now);
		let mut window = slot.lock();

		if window.has_elapsed(&self.budget, now) {
			*window = Window::starting(now);
		}
		if window.count >= self.budget.max_requests {
			let reset_at = window.started_at + self.budget.window;
			let reason = format!("{} requests per window exhausted", self.budget.max_requests);

			return RateLimitDecision::Delay(
				RetryDirective::new(reset_at, reset_at - now).with_reason(reason),
			);
		}

		window.count += 1;

		RateLimitDecision::Allow { remaining: self.budget.max_requests - window.count }
	}

	/// Drops windows that elapsed before `now` and are not in use; returns how many were removed.
	pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
		let mut windows = self.windows.write();
		let before = windows.len();

		windows.retain(|_, slot| {
			Arc::strong_count(slot) > 1 || !slot.lock().has_elapsed(&self.budget, now)
		});

		before - windows.len()
	}

	fn slot(&self, key: &ClientKey, now: OffsetDateTime) -> WindowSlot {
		if let Some(slot) = self.windows.read().get(key) {
			return slot.clone();
		}

		self.windows
			.write()
			.entry(key.clone())
			.or_insert_with(|| Arc::new(Mutex::new(Window::starting(now))))
			.clone()
	}
}
impl RateLimitPolicy for MemoryRateLimitStore {
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitFuture<'_> {
		let decision = self.hit(&context.key, context.observed_at);

		Box::pin(async move { Ok(decision) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn key(value: &str) -> ClientKey {
		ClientKey::new(value).expect("Client key fixture should be valid.")
	}

	#[test]
	fn eleventh_request_in_a_window_is_delayed() {
		let store = MemoryRateLimitStore::default();
		let caller = key("203.0.113.9");
		let start = macros::datetime!(2026-03-01 12:00:00 UTC);

		for i in 0..10 {
			let decision = store.hit(&caller, start + Duration::seconds(i));

			assert_eq!(decision, RateLimitDecision::Allow { remaining: 9 - i as u32 });
		}

		match store.hit(&caller, start + Duration::seconds(15)) {
			RateLimitDecision::Delay(directive) => {
				assert_eq!(directive.earliest_retry_at, start + Duration::seconds(60));
				assert_eq!(directive.recommended_backoff, Duration::seconds(45));
			},
			other => panic!("Unexpected decision: {other:?}."),
		}
	}

	#[test]
	fn keys_are_independent() {
		let store = MemoryRateLimitStore::new(FixedWindow::new(Duration::seconds(60), 1));
		let now = macros::datetime!(2026-03-01 12:00:00 UTC);

		assert!(store.hit(&key("10.0.0.1"), now).is_allowed());
		assert!(!store.hit(&key("10.0.0.1"), now).is_allowed());
		assert!(store.hit(&key("10.0.0.2"), now).is_allowed());
	}

	#[test]
	fn window_resets_cleanly_at_the_boundary() {
		let store = MemoryRateLimitStore::new(FixedWindow::new(Duration::seconds(60), 2));
		let caller = key("10.0.0.3");
		let start = macros::datetime!(2026-03-01 12:00:00 UTC);

		assert!(store.hit(&caller, start).is_allowed());
		assert!(store.hit(&caller, start).is_allowed());
		assert!(!store.hit(&caller, start + Duration::milliseconds(59_999)).is_allowed());
		assert_eq!(
			store.hit(&caller, start + Duration::seconds(60)),
			RateLimitDecision::Allow { remaining: 1 }
		);
	}

	#[test]
	fn late_arrivals_with_earlier_stamps_stay_in_the_window() {
		let store = MemoryRateLimitStore::default();
		let caller = key("10.0.0.8");
		let start = macros::datetime!(2026-03-01 12:00:00 UTC);
		let hit = |millis: i64| store.hit(&caller, start + Duration::milliseconds(millis));
		let allowed = (0..10)
			.map(|_| hit(5))
			.chain((0..5).rev().map(hit))
			.filter(RateLimitDecision::is_allowed)
			.count();

		assert_eq!(allowed, 10);

		match hit(0) {
			RateLimitDecision::Delay(directive) => {
				assert_eq!(directive.earliest_retry_at, start + Duration::milliseconds(60_005));
				assert_eq!(directive.retry_after_secs(), 61);
			},
			other => panic!("Unexpected decision: {other:?}."),
		}
	}

	#[test]
	fn purge_drops_only_elapsed_windows() {
		let store = MemoryRateLimitStore::default();
		let start = macros::datetime!(2026-03-01 12:00:00 UTC);

		store.hit(&key("10.0.0.4"), start);
		store.hit(&key("10.0.0.5"), start + Duration::seconds(30));

		assert_eq!(store.purge_expired(start + Duration::seconds(61)), 1);
		assert_eq!(store.len(), 1);
		assert_eq!(store.purge_expired(start + Duration::seconds(91)), 1);
		assert!(store.is_empty());
	}

	#[test]
	fn concurrent_hits_never_exceed_the_budget() {
		let store = MemoryRateLimitStore::default();
		let caller = key("10.0.0.6");
		let now = OffsetDateTime::now_utc();
		let allowed = std::thread::scope(|scope| {
			let handles = (0..32)
				.map(|_| scope.spawn(|| store.hit(&caller, now).is_allowed()))
				.collect::<Vec<_>>();

			handles
				.into_iter()
				.map(|handle| handle.join().expect("Worker thread should not panic."))
				.filter(|allowed| *allowed)
				.count()
		});

		assert_eq!(allowed, 10);
	}

	#[tokio::test]
	async fn policy_contract_uses_observed_instant() {
		let store = MemoryRateLimitStore::new(FixedWindow::new(Duration::seconds(60), 1));
		let observed = macros::datetime!(2026-03-01 12:00:00 UTC);
		let context =
			RateLimitContext::new(key("10.0.0.7"), "issue_token").with_observed_at(observed);

		assert!(store.evaluate(&context).await.expect("Memory store never fails.").is_allowed());

		let decision = store.evaluate(&context).await.expect("Memory store never fails.");

		assert!(matches!(
			decision,
			RateLimitDecision::Delay(RetryDirective { earliest_retry_at, .. })
				if earliest_retry_at == observed + Duration::seconds(60)
		));
	}
}
