//! Classified, bounded exponential backoff.
//!
//! An operation is retried only when its failure is classified as
//! transient. Typed error kinds are consulted first
//! ([`ClientError::retryable_hint`]); the textual classifier below
//! covers errors that arrive as bare messages. The pattern set is
//! deliberately small and precise:
//!
//! - `connection refused|reset|timeout|lost|aborted`
//! - `i/o timeout`, `read timeout`, `write timeout`, `dial timeout`
//! - exact `eof` or a `: eof` suffix
//! - HTTP statuses 408, 409, 429, and 500–511 embedded as `HTTP 500`,
//!   `status 500`, `code: 500`, or `500 ` (digit-bounded, so
//!   `port 5001 closed` does not match)

use std::future::Future;
use std::time::Duration;

use crate::error::{ClientError, Result};

const CONNECTION_PATTERNS: [&str; 5] = [
    "connection refused",
    "connection reset",
    "connection timeout",
    "connection lost",
    "connection aborted",
];

const TIMEOUT_PATTERNS: [&str; 4] = [
    "i/o timeout",
    "read timeout",
    "write timeout",
    "dial timeout",
];

const RETRYABLE_STATUSES: [u16; 15] = [
    408, 409, 429, 500, 501, 502, 503, 504, 505, 506, 507, 508, 509, 510, 511,
];

/// Textual retry classification.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();

    if CONNECTION_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    if TIMEOUT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    if lower == "eof" || lower.ends_with(": eof") {
        return true;
    }
    RETRYABLE_STATUSES
        .iter()
        .any(|status| has_status_marker(&lower, *status))
}

/// Whether `text` embeds `status` in one of the recognized forms, with
/// digit boundaries on both sides.
fn has_status_marker(text: &str, status: u16) -> bool {
    let digits = status.to_string();
    for prefix in ["http ", "status ", "code: "] {
        if contains_bounded(text, &format!("{prefix}{digits}"), prefix.len()) {
            return true;
        }
    }
    contains_bounded(text, &format!("{digits} "), 0)
}

/// Substring search where the digits inside the needle must not be
/// extended by adjacent digits in the haystack.
fn contains_bounded(text: &str, needle: &str, digits_start: usize) -> bool {
    let mut from = 0;
    while let Some(pos) = text[from..].find(needle) {
        let at = from + pos;
        let before_ok = at + digits_start == 0
            || !text.as_bytes()[at + digits_start - 1].is_ascii_digit();
        let after = at + needle.len();
        let after_ok = needle.ends_with(' ')
            || after >= text.len()
            || !text.as_bytes()[after].is_ascii_digit();
        if before_ok && after_ok {
            return true;
        }
        from = at + 1;
    }
    false
}

/// Backoff policy with clamped configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl RetryPolicy {
    /// Build a policy, clamping each knob into its legal range:
    /// retries ∈ [0,10], factor ∈ [1,10], initial ∈ [1ms,30s],
    /// max ∈ [initial, 5min].
    pub fn new(max_retries: u32, initial: Duration, max: Duration, factor: f64) -> Self {
        let initial = initial.clamp(Duration::from_millis(1), Duration::from_secs(30));
        Self {
            max_retries: max_retries.min(10),
            initial,
            max: max.clamp(initial, Duration::from_secs(300)),
            factor: factor.clamp(1.0, 10.0),
        }
    }

    /// `delay = clamp(initial * factor^(attempt-1), initial, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.initial.as_secs_f64() * self.factor.powi(exponent as i32);
        Duration::from_secs_f64(scaled).clamp(self.initial, self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_millis(500),
            Duration::from_secs(30),
            2.0,
        )
    }
}

/// Run `op`, retrying transient failures with backoff. Cancellation is
/// cooperative: dropping the returned future aborts any sleep
/// immediately.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let retryable = err
                    .retryable_hint()
                    .unwrap_or_else(|| is_retryable_message(&err.to_string()));
                if !retryable || attempt > policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
