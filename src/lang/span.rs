use std::fmt;

/// A 1-based line/column position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Location {
    pub line: u32,
    pub col: u32,
}

impl Location {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Half-open source range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Line recorded in the bytecode line table for code produced from this span.
    pub fn line(&self) -> u32 {
        self.start.line
    }
}

impl fmt::Display for Span {
    /// Formats as `line:col`, the CLI-friendly diagnostic prefix.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_takes_outer_bounds() {
        let a = Span::new(Location::new(1, 5), Location::new(1, 9));
        let b = Span::new(Location::new(1, 2), Location::new(1, 6));
        let merged = a.merge(b);
        assert_eq!(merged.start, Location::new(1, 2));
        assert_eq!(merged.end, Location::new(1, 9));
    }

    #[test]
    fn test_merge_across_lines() {
        let a = Span::new(Location::new(3, 1), Location::new(3, 4));
        let b = Span::new(Location::new(1, 8), Location::new(1, 9));
        let merged = a.merge(b);
        assert_eq!(merged.start, Location::new(1, 8));
        assert_eq!(merged.end, Location::new(3, 4));
        assert_eq!(merged.line(), 1);
    }

    #[test]
    fn test_display_uses_start() {
        let span = Span::new(Location::new(4, 2), Location::new(4, 7));
        assert_eq!(span.to_string(), "4:2");
    }
}
