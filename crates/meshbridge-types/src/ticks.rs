//! Fixed-point protocol timer values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A protocol time value in 1/256-second units, as carried in BPDU
/// message-age, max-age, hello-time and forward-delay fields.
///
/// Conversions saturate: a `Duration` beyond the representable ~255 s range
/// encodes as the maximum tick value rather than wrapping, so timer
/// arithmetic can never produce a value that decodes as negative or tiny.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimeTicks(u16);

const TICKS_PER_SEC: u64 = 256;

impl TimeTicks {
    /// The zero time value.
    pub const ZERO: TimeTicks = TimeTicks(0);

    /// The largest representable time value (just under 256 seconds).
    pub const MAX: TimeTicks = TimeTicks(u16::MAX);

    /// Creates a tick value from a whole number of seconds, saturating.
    pub const fn from_secs(secs: u16) -> Self {
        if secs as u32 * TICKS_PER_SEC as u32 > u16::MAX as u32 {
            TimeTicks::MAX
        } else {
            TimeTicks(secs * TICKS_PER_SEC as u16)
        }
    }

    /// Creates a tick value from a `Duration`, saturating.
    pub fn from_duration(d: Duration) -> Self {
        let ticks = d.as_millis() as u64 * TICKS_PER_SEC / 1000;
        TimeTicks(ticks.min(u16::MAX as u64) as u16)
    }

    /// Converts to a `Duration`.
    pub fn to_duration(self) -> Duration {
        Duration::from_millis(self.0 as u64 * 1000 / TICKS_PER_SEC)
    }

    /// Returns the raw wire value.
    pub const fn to_u16(self) -> u16 {
        self.0
    }

    /// Decodes a tick value from its wire form.
    pub const fn from_u16(raw: u16) -> Self {
        TimeTicks(raw)
    }

    /// Saturating addition.
    pub const fn saturating_add(self, other: TimeTicks) -> TimeTicks {
        TimeTicks(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for TimeTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 as u64 / TICKS_PER_SEC;
        let frac = (self.0 as u64 % TICKS_PER_SEC) * 100 / TICKS_PER_SEC;
        write!(f, "{}.{:02}s", whole, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_seconds_round_trip() {
        let t = TimeTicks::from_secs(20);
        assert_eq!(t.to_u16(), 20 * 256);
        assert_eq!(t.to_duration(), Duration::from_secs(20));
    }

    #[test]
    fn test_duration_round_trip() {
        let t = TimeTicks::from_duration(Duration::from_millis(1500));
        assert_eq!(t.to_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn test_saturating_conversion() {
        assert_eq!(
            TimeTicks::from_duration(Duration::from_secs(10_000)),
            TimeTicks::MAX
        );
        assert_eq!(TimeTicks::from_secs(300), TimeTicks::MAX);
    }

    #[test]
    fn test_saturating_add_never_wraps() {
        let big = TimeTicks::from_secs(200);
        assert_eq!(big.saturating_add(big), TimeTicks::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(TimeTicks::from_secs(2).to_string(), "2.00s");
        assert_eq!(TimeTicks::from_u16(128).to_string(), "0.50s");
    }
}
