// Copyright (c) The Reglet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry backoff calculation and transient-error classification
//! (spec.md §4.7), grounded on `nextest-runner`'s `BackoffIter`
//! (`runner/executor.rs`).

use rand::{distr::OpenClosed01, Rng};
use std::time::Duration;

/// The backoff strategy for a control's retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    #[default]
    None,
    Linear,
    Exponential,
}

/// The exponent base used for [`RetryStrategy::Exponential`].
const BACKOFF_EXPONENT: u32 = 2;

/// Computes the delay before retry attempt `attempt` (1-based).
///
/// - `none`: always `initial`.
/// - `linear`: `attempt * initial`, capped at `max` if `max` is set.
/// - `exponential`: `2^attempt * initial`, capped at `max`; overflow-safe —
///   an enormous `attempt` saturates to `max` (or `Duration::MAX` if `max`
///   is unset) rather than panicking.
/// - any other/unknown strategy falls back to `initial`.
pub fn calculate_backoff(
    strategy: RetryStrategy,
    attempt: u32,
    initial: Duration,
    max: Option<Duration>,
) -> Duration {
    match strategy {
        RetryStrategy::None => initial,
        RetryStrategy::Linear => {
            let scaled = initial.saturating_mul(attempt.max(1));
            cap(scaled, max)
        }
        RetryStrategy::Exponential => {
            let factor = BACKOFF_EXPONENT.checked_pow(attempt.min(62)).unwrap_or(u32::MAX);
            let scaled = initial.saturating_mul(factor);
            cap(scaled, max)
        }
    }
}

fn cap(duration: Duration, max: Option<Duration>) -> Duration {
    match max {
        Some(max) if duration > max => max,
        _ => duration,
    }
}

/// Scales `duration` by a uniform random factor in `(0.5, 1]`, so retries
/// from many controls hitting the same failure don't all wake up in
/// lockstep. Optional — callers apply it only when a control's retry
/// config requests jitter.
pub fn apply_jitter(duration: Duration) -> Duration {
    let factor: f64 = rand::rng().sample(OpenClosed01);
    duration.mul_f64(0.5 + factor / 2.0)
}

/// A lightweight, language-neutral description of a transport failure,
/// used to decide whether a retry is worth attempting. The plugin
/// executor adapter (C8) translates `PluginExecutor` transport errors into
/// this enum; hosts with a richer taxonomy can add variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    ConnectionReset,
    ConnectionRefused,
    ConnectionAborted,
    ConnectTimeout,
    TemporaryDnsFailure,
    Cancelled,
    DeadlineExceeded,
    Other,
}

/// Returns whether `kind` should be retried. Cancellation and
/// deadline-exceeded are never transient: once the run is being torn down,
/// retrying would fight the cancellation rather than recover from it.
pub fn is_transient_error(kind: TransportErrorKind) -> bool {
    match kind {
        TransportErrorKind::Timeout
        | TransportErrorKind::ConnectionReset
        | TransportErrorKind::ConnectionRefused
        | TransportErrorKind::ConnectionAborted
        | TransportErrorKind::ConnectTimeout
        | TransportErrorKind::TemporaryDnsFailure => true,
        TransportErrorKind::Cancelled | TransportErrorKind::DeadlineExceeded => false,
        TransportErrorKind::Other => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_strategy_always_returns_initial() {
        let initial = Duration::from_millis(100);
        assert_eq!(
            calculate_backoff(RetryStrategy::None, 5, initial, None),
            initial
        );
    }

    #[test]
    fn linear_scales_by_attempt_and_caps() {
        let initial = Duration::from_millis(100);
        assert_eq!(
            calculate_backoff(RetryStrategy::Linear, 3, initial, None),
            Duration::from_millis(300)
        );
        let capped = calculate_backoff(
            RetryStrategy::Linear,
            100,
            initial,
            Some(Duration::from_millis(500)),
        );
        assert_eq!(capped, Duration::from_millis(500));
    }

    #[test]
    fn exponential_doubles_per_attempt_and_caps() {
        let initial = Duration::from_millis(10);
        assert_eq!(
            calculate_backoff(RetryStrategy::Exponential, 3, initial, None),
            Duration::from_millis(80)
        );
    }

    #[test]
    fn exponential_huge_attempt_saturates_to_max() {
        let initial = Duration::from_millis(10);
        let max = Duration::from_secs(60);
        let result = calculate_backoff(RetryStrategy::Exponential, 63, initial, Some(max));
        assert_eq!(result, max);
    }

    #[test]
    fn jitter_keeps_result_within_the_half_to_full_range() {
        let base = Duration::from_millis(1000);
        for _ in 0..50 {
            let jittered = apply_jitter(base);
            assert!(jittered >= Duration::from_millis(500));
            assert!(jittered <= base);
        }
    }

    #[test]
    fn cancellation_and_deadline_exceeded_are_not_transient() {
        assert!(!is_transient_error(TransportErrorKind::Cancelled));
        assert!(!is_transient_error(TransportErrorKind::DeadlineExceeded));
    }

    #[test]
    fn network_timeouts_are_transient() {
        assert!(is_transient_error(TransportErrorKind::Timeout));
        assert!(is_transient_error(TransportErrorKind::ConnectionReset));
    }
}
