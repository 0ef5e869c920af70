//! Process-wide counters, addressed by name.
//!
//! Counters live for the whole process; handles are leaked `AtomicU64`s
//! so the hot path is a single relaxed add with no lock.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

pub const REQUESTS_TOTAL: &str = "notepub_requests_total";
pub const RESPONSES_2XX: &str = "notepub_responses_2xx";
pub const RESPONSES_3XX: &str = "notepub_responses_3xx";
pub const RESPONSES_4XX: &str = "notepub_responses_4xx";
pub const RESPONSES_5XX: &str = "notepub_responses_5xx";
pub const CACHE_HIT: &str = "notepub_cache_hit";
pub const CACHE_MISS: &str = "notepub_cache_miss";
pub const CACHE_STALE: &str = "notepub_cache_stale";

static COUNTERS: LazyLock<RwLock<FxHashMap<&'static str, &'static AtomicU64>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// Get (or create) the counter registered under `name`.
pub fn counter(name: &'static str) -> &'static AtomicU64 {
    if let Some(existing) = COUNTERS.read().get(name).copied() {
        return existing;
    }
    let mut counters = COUNTERS.write();
    *counters
        .entry(name)
        .or_insert_with(|| Box::leak(Box::new(AtomicU64::new(0))))
}

/// Increment the counter registered under `name`.
#[inline]
pub fn inc(name: &'static str) {
    counter(name).fetch_add(1, Ordering::Relaxed);
}

/// Bump the per-class response counter for an HTTP status code.
pub fn track_status(status: u16) {
    match status {
        200..=299 => inc(RESPONSES_2XX),
        300..=399 => inc(RESPONSES_3XX),
        400..=499 => inc(RESPONSES_4XX),
        500..=599 => inc(RESPONSES_5XX),
        _ => {}
    }
}

/// Render all counters as a JSON object, sorted by name.
pub fn render_json() -> String {
    let counters = COUNTERS.read();
    let entries: BTreeMap<&str, u64> = counters
        .iter()
        .map(|(name, value)| (*name, value.load(Ordering::Relaxed)))
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_identity() {
        let a = counter("test_counter_identity");
        let b = counter("test_counter_identity");
        a.fetch_add(1, Ordering::Relaxed);
        assert_eq!(b.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_track_status() {
        track_status(204);
        track_status(301);
        track_status(404);
        track_status(503);
        assert!(counter(RESPONSES_2XX).load(Ordering::Relaxed) >= 1);
        assert!(counter(RESPONSES_3XX).load(Ordering::Relaxed) >= 1);
        assert!(counter(RESPONSES_4XX).load(Ordering::Relaxed) >= 1);
        assert!(counter(RESPONSES_5XX).load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_render_json_sorted() {
        inc(REQUESTS_TOTAL);
        let json = render_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get(REQUESTS_TOTAL).is_some());
    }
}
