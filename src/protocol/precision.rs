use core::fmt;

/// Timestamp precision of serialized measurements.
///
/// Point timestamps are tracked internally in nanoseconds since the Unix
/// epoch and converted into this unit when a point is serialized. The unit
/// is also advertised to the destination as the `precision` query parameter
/// so both sides agree on the encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Nanosecond resolution (`n`).
    Nanosecond,
    /// Microsecond resolution (`u`).
    Microsecond,
    /// Millisecond resolution (`ms`).
    Millisecond,
    /// Second resolution (`s`).
    Second,
    /// Minute resolution (`m`).
    Minute,
    /// Hour resolution (`h`).
    Hour,
}

impl Precision {
    /// Default precision (nanoseconds).
    pub const DEFAULT: Self = Self::Nanosecond;

    /// Returns the query-parameter value understood by the destination.
    pub const fn as_str(self) -> &'static str {
        match self {
            Precision::Nanosecond => "n",
            Precision::Microsecond => "u",
            Precision::Millisecond => "ms",
            Precision::Second => "s",
            Precision::Minute => "m",
            Precision::Hour => "h",
        }
    }

    /// Converts a nanosecond epoch timestamp into this precision unit.
    ///
    /// Conversion truncates toward zero, matching the behavior expected by
    /// the destination for coarser units.
    pub const fn convert(self, epoch_nanos: i64) -> i64 {
        match self {
            Precision::Nanosecond => epoch_nanos,
            Precision::Microsecond => epoch_nanos / 1_000,
            Precision::Millisecond => epoch_nanos / 1_000_000,
            Precision::Second => epoch_nanos / 1_000_000_000,
            Precision::Minute => epoch_nanos / 60_000_000_000,
            Precision::Hour => epoch_nanos / 3_600_000_000_000,
        }
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_values() {
        assert_eq!(Precision::Nanosecond.as_str(), "n");
        assert_eq!(Precision::Microsecond.as_str(), "u");
        assert_eq!(Precision::Millisecond.as_str(), "ms");
        assert_eq!(Precision::Second.as_str(), "s");
        assert_eq!(Precision::Minute.as_str(), "m");
        assert_eq!(Precision::Hour.as_str(), "h");
    }

    #[test]
    fn test_conversion() {
        let ns = 3_600_123_456_789i64;
        assert_eq!(Precision::Nanosecond.convert(ns), 3_600_123_456_789);
        assert_eq!(Precision::Microsecond.convert(ns), 3_600_123_456);
        assert_eq!(Precision::Millisecond.convert(ns), 3_600_123);
        assert_eq!(Precision::Second.convert(ns), 3_600);
        assert_eq!(Precision::Minute.convert(ns), 60);
        assert_eq!(Precision::Hour.convert(ns), 1);
    }

    #[test]
    fn test_conversion_truncates_toward_zero() {
        assert_eq!(Precision::Second.convert(1_999_999_999), 1);
        assert_eq!(Precision::Second.convert(-1_999_999_999), -1);
    }
}
