//! Header clock, always shown in Indian Standard Time.

use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Label shown above the clock.
pub const CLOCK_LABEL: &str = "IST (UTC+5:30)";

/// UTC offset of Indian Standard Time.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// The fixed IST offset.
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Format `instant` as `hh:mm:ss AM/PM` in IST.
pub fn format_ist(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&ist_offset())
        .format("%I:%M:%S %p")
        .to_string()
}

/// The current IST time.
pub fn now_ist() -> String {
    format_ist(Utc::now())
}
