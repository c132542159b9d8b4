//! Recheck interval with exponential backoff on thread quiescence.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Shortest recheck interval, used for brand-new subscriptions and very active threads.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Longest recheck interval, reached after roughly a day without posts.
pub const MAX_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Hours of quiescence it takes for the interval to double.
const DOUBLING_HOURS: f64 = 3.0;

/// Compute how long to wait between checks of a thread, and why.
///
/// The interval starts at [`MIN_INTERVAL`] and doubles every three hours since
/// the last post, clamped to `[MIN_INTERVAL, MAX_INTERVAL]`.
#[must_use]
pub fn calculate_interval(
    last_post_time: Option<DateTime<Utc>>,
    last_polled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (Duration, String) {
    if last_polled_at.is_none() {
        return (MIN_INTERVAL, "never polled".to_string());
    }

    let Some(last_post_time) = last_post_time else {
        // Polled before but no post time recorded: back off fully rather than
        // spin on a thread whose timestamps we cannot read.
        return (
            MAX_INTERVAL,
            "polled before but no last post time recorded".to_string(),
        );
    };

    let seconds_since_post = (now - last_post_time).num_seconds().max(0) as f64;
    let hours_since_post = seconds_since_post / 3600.0;

    let factor = (hours_since_post / DOUBLING_HOURS).exp2();
    let raw_secs = MIN_INTERVAL.as_secs_f64() * factor;
    let secs = if raw_secs.is_finite() {
        raw_secs.clamp(MIN_INTERVAL.as_secs_f64(), MAX_INTERVAL.as_secs_f64())
    } else {
        MAX_INTERVAL.as_secs_f64()
    };
    let interval = Duration::from_secs_f64(secs).clamp(MIN_INTERVAL, MAX_INTERVAL);

    let reason = format!(
        "last post {hours_since_post:.1}h ago, next check in {}m",
        interval.as_secs() / 60
    );
    (interval, reason)
}
