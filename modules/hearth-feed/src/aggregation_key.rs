//! Deterministic dedup keys for windowed aggregation.
//!
//! A key names the bucket a burst collapses into:
//! `{activity_type}:{feed_scope}:{target_id}:{bucket}` where `bucket` is the
//! event time floored to the nearest window multiple on the epoch timeline
//! (not wall-clock-of-day alignment). A burst straddling a bucket boundary
//! splits into two records; that is the accepted cost of fixed buckets.

use chrono::{DateTime, Duration, Utc};

use hearth_common::FeedScope;

/// Target id used for sitewide keys, where no single parent applies.
pub const SITEWIDE_TARGET: &str = "site";

/// Floor `now` to the start of its window bucket.
pub fn window_bucket(now: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    let window_secs = window_minutes.max(1) * 60;
    let rem = now.timestamp().rem_euclid(window_secs);
    let at_boundary = now - Duration::seconds(rem);
    // Window multiples sit on whole seconds; drop sub-second noise.
    at_boundary - Duration::nanoseconds(i64::from(at_boundary.timestamp_subsec_nanos()))
}

/// Build the aggregation key for one activity in one bucket.
///
/// Same type + target + bucket always yields the same key; crossing a bucket
/// boundary always yields a different one.
pub fn build_key(
    activity_type: &str,
    feed_scope: FeedScope,
    target_id: &str,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> String {
    let bucket = window_bucket(now, window_minutes).format("%Y%m%d%H%M");
    format!("{activity_type}:{feed_scope}:{target_id}:{bucket}")
}
