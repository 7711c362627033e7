//! Session-consistent timestamp source.
//!
//! Envelope timestamps are only compared against timestamps from other
//! clients in the same session, so all clients must draw from the same
//! reference. The host injects the source; the default uses UTC wall
//! millis, which is what hosted reference services hand out.

/// Source of session-consistent millisecond timestamps.
pub trait TimestampSource: Send + Sync {
    /// Current timestamp in milliseconds.
    fn now_millis(&self) -> i64;
}

/// Default timestamp source backed by the system UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimestampSource;

impl TimestampSource for SystemTimestampSource {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
