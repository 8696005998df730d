//! Read-time visibility for scheduled content such as banners.

use chrono::{DateTime, Utc};

/// Whether an item with an `active` flag and an optional `[starts_at, ends_at)`
/// range should be shown at `now`.
///
/// A missing bound is open-ended.
#[must_use]
pub fn is_live(
    active: bool,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    active && starts_at.is_none_or(|start| start <= now) && ends_at.is_none_or(|end| now < end)
}

/// Whether a date range is well formed (start strictly before end when both
/// are present).
#[must_use]
pub fn is_valid_range(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> bool {
    match (starts_at, ends_at) {
        (Some(start), Some(end)) => start < end,
        _ => true,
    }
}
