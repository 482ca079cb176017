//! Pure retry policy (spec §4.3).
//!
//! Consulted only on non-zero exit or timeout; a successful execution never
//! calls into this module.

use chrono::{DateTime, Duration, Utc};

/// Outcome of consulting the retry policy after a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub next_run_at: DateTime<Utc>,
    pub to_dlq: bool,
}

/// `delay = min(base_backoff ^ attempts, max_backoff)`, `to_dlq = attempts
/// >= max_retries` (spec §4.3). `attempts` is the post-increment attempt
/// count (the attempt that just failed), so a job with `max_retries = 2`
/// moves to the DLQ on its third attempt (`attempts == 3 > max_retries ==
/// 2`), matching spec §8's DLQ-threshold property ("M+1 failures").
pub fn decide(now: DateTime<Utc>, attempts: i64, max_retries: i64, base_backoff_secs: i64, max_backoff_secs: i64) -> RetryDecision {
    if attempts > max_retries {
        return RetryDecision {
            next_run_at: now,
            to_dlq: true,
        };
    }

    let delay_secs = saturating_pow(base_backoff_secs, attempts).min(max_backoff_secs.max(0));
    RetryDecision {
        next_run_at: now + Duration::seconds(delay_secs),
        to_dlq: false,
    }
}

/// `base.pow(exp)` without panicking on overflow or negative/huge exponents
/// — a misconfigured `base_backoff_seconds` or a very high attempt count
/// must not crash a worker, it should just saturate to `i64::MAX` and get
/// clamped by `max_backoff_secs` immediately after.
fn saturating_pow(base: i64, exp: i64) -> i64 {
    if exp <= 0 {
        return 1;
    }
    let mut acc: i64 = 1;
    for _ in 0..exp.min(63) {
        acc = acc.saturating_mul(base.max(1));
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_law_default_base() {
        let now = Utc::now();
        for (attempts, expected_secs) in [(1, 2), (2, 4), (3, 8)] {
            let decision = decide(now, attempts, 10, 2, 3600);
            assert!(!decision.to_dlq);
            let delta = (decision.next_run_at - now).num_seconds();
            assert_eq!(delta, expected_secs, "attempts={attempts}");
        }
    }

    #[test]
    fn backoff_caps_at_max() {
        let now = Utc::now();
        let decision = decide(now, 20, 100, 2, 3600);
        assert!(!decision.to_dlq);
        assert_eq!((decision.next_run_at - now).num_seconds(), 3600);
    }

    #[test]
    fn dlq_threshold_on_attempts_exceeding_max_retries() {
        let now = Utc::now();
        let decision = decide(now, 3, 2, 2, 3600);
        assert!(decision.to_dlq);
    }

    #[test]
    fn stays_pending_at_exactly_max_retries() {
        let now = Utc::now();
        let decision = decide(now, 2, 2, 2, 3600);
        assert!(!decision.to_dlq);
    }
}
