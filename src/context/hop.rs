//! Hop counter propagated across service boundaries.
//!
//! The hop value travels in a request/response header and tells tracing
//! correlation how many service-to-service calls a request has traversed.
//! The literal header value `"null"` means no upstream hop.

/// Number of service hops a request has traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// No upstream hop. Rendered as the literal string "null".
    Null,
    /// Hop counter, starting at 1 for the first service in a chain.
    Count(u32),
}

impl Hop {
    /// The no-upstream-hop value.
    pub fn null() -> Self {
        Hop::Null
    }

    /// Parse an inbound header value. Absent, unparseable, or "null"
    /// all mean no upstream hop.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) => match v.trim().parse::<u32>() {
                Ok(n) => Hop::Count(n),
                Err(_) => Hop::Null,
            },
            None => Hop::Null,
        }
    }

    /// The hop value for the next service boundary. Monotonically
    /// increasing; the first hop after "null" is 1.
    pub fn next(&self) -> Hop {
        match self {
            Hop::Null => Hop::Count(1),
            Hop::Count(n) => Hop::Count(n.saturating_add(1)),
        }
    }

    /// Parse an inbound header and advance one hop in a single step.
    pub fn next_from_header(value: Option<&str>) -> Self {
        Self::from_header(value).next()
    }
}

impl std::fmt::Display for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hop::Null => write!(f, "null"),
            Hop::Count(n) => write!(f, "{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absent_and_null() {
        assert_eq!(Hop::from_header(None), Hop::Null);
        assert_eq!(Hop::from_header(Some("null")), Hop::Null);
        assert_eq!(Hop::from_header(Some("garbage")), Hop::Null);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(Hop::from_header(Some("3")), Hop::Count(3));
        assert_eq!(Hop::from_header(Some(" 7 ")), Hop::Count(7));
    }

    #[test]
    fn test_next_is_monotonic() {
        assert_eq!(Hop::Null.next(), Hop::Count(1));
        assert_eq!(Hop::Count(1).next(), Hop::Count(2));
        assert_eq!(Hop::next_from_header(Some("4")), Hop::Count(5));
        assert_eq!(Hop::next_from_header(None), Hop::Count(1));
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(Hop::Null.to_string(), "null");
        assert_eq!(Hop::Count(12).to_string(), "12");
        let reparsed = Hop::from_header(Some(&Hop::Count(12).to_string()));
        assert_eq!(reparsed, Hop::Count(12));
    }
}
