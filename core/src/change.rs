//! Timestamp normalization and the skip-vs-ingest decision.

use chrono::{DateTime, NaiveDateTime};
use tracing::debug;

/// Layout of every normalized timestamp.
pub const NORMALIZED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stands for "never updated": an empty feed timestamp and a source with no
/// stored history both normalize to this value. It is the layout reference
/// date itself, so a feed really published at 2006-01-02T15:04:05 is
/// indistinguishable from one that was never updated.
pub const NEVER_UPDATED: &str = "2006-01-02 15:04:05";

/// Returned for timestamps that cannot be parsed.
pub const ZERO_TIME: &str = "0001-01-01 00:00:00";

/// Rewrites a feed or history timestamp into `YYYY-MM-DD HH:MM:SS`.
///
/// RFC3339 input keeps its wall-clock time and drops the offset. Input that is
/// already normalized passes through unchanged. Parse failures are swallowed
/// and yield [`ZERO_TIME`].
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return NEVER_UPDATED.to_string();
    }

    if is_strict_rfc3339(raw) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return parsed.format(NORMALIZED_FORMAT).to_string();
        }
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, NORMALIZED_FORMAT) {
        return parsed.format(NORMALIZED_FORMAT).to_string();
    }

    debug!("Unparseable timestamp {:?}, using zero time", raw);
    ZERO_TIME.to_string()
}

/// chrono also accepts a space or lowercase `t` separator, a lowercase `z` and
/// leap second `:60`. Feeds using those forms are treated as unparseable.
fn is_strict_rfc3339(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.get(10) == Some(&b'T') && bytes.get(17..19) != Some(&b"60"[..]) && !raw.ends_with('z')
}

/// A snapshot is ingested only when its normalized timestamp differs from the
/// last stored one.
pub fn should_ingest(fetched_normalized: &str, last_normalized: &str) -> bool {
    fetched_normalized != last_normalized
}
