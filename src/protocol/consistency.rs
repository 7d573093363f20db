use core::fmt;

/// Destination-side write consistency level.
///
/// Passed through to the destination as the `consistency` query parameter of
/// the write endpoint; the client itself attaches no semantics to it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Consistency {
    /// All replicas must acknowledge the write.
    All,
    /// Any node may acknowledge the write.
    Any,
    /// A single replica must acknowledge the write.
    One,
    /// A quorum of replicas must acknowledge the write.
    Quorum,
}

impl Consistency {
    /// Default consistency level (One).
    pub const DEFAULT: Self = Self::One;

    /// Returns the lowercase query-parameter value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Consistency::All => "all",
            Consistency::Any => "any",
            Consistency::One => "one",
            Consistency::Quorum => "quorum",
        }
    }
}

impl Default for Consistency {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_values() {
        assert_eq!(Consistency::All.as_str(), "all");
        assert_eq!(Consistency::Any.as_str(), "any");
        assert_eq!(Consistency::One.as_str(), "one");
        assert_eq!(Consistency::Quorum.as_str(), "quorum");
        assert_eq!(Consistency::default(), Consistency::One);
    }
}
