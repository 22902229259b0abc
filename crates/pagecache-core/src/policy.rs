//! Staleness rules and cache-control directives.

use crate::entry::CacheEntry;

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Check whether an entry must be treated as a miss right now.
pub fn is_stale(entry: &CacheEntry) -> bool {
    is_stale_at(entry, now_millis())
}

/// Check whether an entry is stale at `now` (epoch milliseconds).
///
/// Entries without a revalidation window are never stale here; their
/// freshness is governed by the host. An entry exactly at the end of its
/// window is still fresh.
pub fn is_stale_at(entry: &CacheEntry, now: i64) -> bool {
    match entry.revalidate {
        None => false,
        Some(seconds) => {
            let window = i64::try_from(seconds)
                .unwrap_or(i64::MAX)
                .saturating_mul(1000);
            now > entry.last_modified.saturating_add(window)
        }
    }
}

/// Cache-Control value for stored objects, when the entry has a window.
pub fn cache_control_header(revalidate: Option<u64>) -> Option<String> {
    match revalidate? {
        0 => Some("no-store".to_string()),
        seconds => Some(format!(
            "public, max-age={}, stale-while-revalidate",
            seconds
        )),
    }
}
