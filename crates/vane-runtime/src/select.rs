//! Deterministic provider selection.
//!
//! Pure: reads each provider's usage once, mutates nothing, performs no
//! I/O. Callers re-run selection after a failed call to fail over; by
//! then the failed provider's failure counter has grown, so the
//! ordering moves past it naturally.

use std::sync::Arc;

use crate::providers::Metered;

/// Pick the best available provider from an ordered pool.
///
/// Filters to providers still under quota, then orders ascending by
/// failure count, then by success count. Remaining ties keep the
/// pool's registration order (register cheapest/most reliable first),
/// which the stable sort preserves. Each provider's counter pair is
/// read from one window snapshot, so a half-reset window can never
/// skew the ordering.
///
/// Returns `None` when no provider is under its quota.
pub fn next_available<P>(providers: &[Arc<P>]) -> Option<Arc<P>>
where
    P: Metered + ?Sized,
{
    let mut candidates: Vec<(u32, u32, Arc<P>)> = Vec::with_capacity(providers.len());

    for provider in providers {
        let window = provider.usage().snapshot();
        if window.total() < provider.quota_limit() {
            candidates.push((window.failures, window.successes, Arc::clone(provider)));
        }
    }

    candidates.sort_by_key(|(failures, successes, _)| (*failures, *successes));
    candidates.into_iter().next().map(|(_, _, provider)| provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{UsageMeter, UsageTracker};
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    struct Counted {
        label: &'static str,
        usage: UsageMeter,
    }

    impl Counted {
        fn new(
            tracker: &UsageTracker,
            label: &'static str,
            quota: u32,
            successes: u32,
            failures: u32,
        ) -> Arc<Self> {
            let usage = tracker.meter(label, None, quota, MINUTE);
            for _ in 0..successes {
                usage.record_success();
            }
            for _ in 0..failures {
                usage.record_failure();
            }
            Arc::new(Self { label, usage })
        }
    }

    impl Metered for Counted {
        fn usage(&self) -> &UsageMeter {
            &self.usage
        }
    }

    #[test]
    fn test_fewest_failures_wins() {
        let tracker = UsageTracker::new();
        let a = Counted::new(&tracker, "a", 100, 5, 2);
        let b = Counted::new(&tracker, "b", 100, 10, 0);
        // c has exhausted its quota of 3
        let c = Counted::new(&tracker, "c", 3, 3, 0);

        let chosen = next_available(&[a, b, c]).unwrap();
        assert_eq!(chosen.label, "b");
    }

    #[test]
    fn test_successes_break_failure_ties() {
        let tracker = UsageTracker::new();
        let a = Counted::new(&tracker, "a", 100, 7, 1);
        let b = Counted::new(&tracker, "b", 100, 2, 1);

        let chosen = next_available(&[a, b]).unwrap();
        assert_eq!(chosen.label, "b");
    }

    #[test]
    fn test_full_ties_keep_registration_order() {
        let tracker = UsageTracker::new();
        let first = Counted::new(&tracker, "first", 100, 4, 1);
        let second = Counted::new(&tracker, "second", 100, 4, 1);

        let chosen = next_available(&[first, second]).unwrap();
        assert_eq!(chosen.label, "first");
    }

    #[test]
    fn test_empty_pool_selects_nothing() {
        let providers: Vec<Arc<Counted>> = vec![];
        assert!(next_available(&providers).is_none());
    }

    #[test]
    fn test_exhausted_pool_selects_nothing() {
        let tracker = UsageTracker::new();
        let a = Counted::new(&tracker, "a", 2, 2, 0);
        let b = Counted::new(&tracker, "b", 2, 1, 1);

        assert!(next_available(&[a, b]).is_none());
    }

    #[test]
    fn test_selection_mutates_nothing() {
        let tracker = UsageTracker::new();
        let a = Counted::new(&tracker, "a", 100, 5, 2);

        next_available(&[Arc::clone(&a)]).unwrap();
        next_available(&[Arc::clone(&a)]).unwrap();

        assert_eq!(a.usage.successes(), 5);
        assert_eq!(a.usage.failures(), 2);
    }
}
