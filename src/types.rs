use std::fmt;

use serde::{Deserialize, Serialize};

/// Genomic strand/orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Plus,
    Minus,
    Unknown,
}

impl Strand {
    /// Strict match used by the stranded read filter: `Unknown` never
    /// matches an oriented read.
    #[inline]
    pub fn matches(self, other: Strand) -> bool {
        self == other
    }

    #[inline]
    pub fn flip(self) -> Strand {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
            Strand::Unknown => Strand::Unknown,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strand::Plus => "+",
            Strand::Minus => "-",
            Strand::Unknown => ".",
        };
        write!(f, "{s}")
    }
}

/// A contiguous genomic interval.
/// Coordinates are 0-based, half-open: [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Create a new span. Panics if start >= end.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start < end, "Span requires start < end");
        Self { start, end }
    }

    #[inline]
    pub fn len(self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub fn overlaps(self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[inline]
    pub fn overlaps_range(self, start: u32, end: u32) -> bool {
        self.start < end && start < self.end
    }

    #[inline]
    pub fn contains(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(10, 20);
        assert!(a.overlaps(Span::new(19, 25)));
        assert!(!a.overlaps(Span::new(20, 25)));
        assert!(!a.overlaps(Span::new(5, 10)));
        assert!(a.overlaps_range(0, 11));
        assert!(!a.overlaps_range(0, 10));
    }

    #[test]
    fn strand_matching_is_strict() {
        assert!(Strand::Plus.matches(Strand::Plus));
        assert!(!Strand::Plus.matches(Strand::Minus));
        assert!(!Strand::Unknown.matches(Strand::Plus));
        assert_eq!(Strand::Plus.flip(), Strand::Minus);
        assert_eq!(Strand::Unknown.flip(), Strand::Unknown);
    }
}
