use core::ops::Range;

/// A range of arena offsets, `base..acme`.
///
/// Spans with `acme <= base` are empty.
#[derive(Debug, Clone, Copy, Default, Hash)]
pub struct Span {
    pub base: usize,
    pub acme: usize,
}

impl From<Range<usize>> for Span {
    fn from(value: Range<usize>) -> Self {
        Self { base: value.start, acme: value.end }
    }
}

impl PartialEq for Span {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        (self.is_empty() && other.is_empty())
            || (self.base == other.base && self.acme == other.acme)
    }
}
impl Eq for Span {}

impl Span {
    pub const fn empty() -> Self {
        Self { base: 0, acme: 0 }
    }

    pub const fn new(base: usize, acme: usize) -> Self {
        Self { base, acme }
    }

    pub const fn from_base_size(base: usize, size: usize) -> Self {
        Self { base, acme: base + size }
    }

    pub const fn to_range(&self) -> Range<usize> {
        self.base..self.acme
    }

    pub const fn size(&self) -> usize {
        self.acme.saturating_sub(self.base)
    }

    pub const fn is_empty(&self) -> bool {
        self.base >= self.acme
    }

    /// Returns whether `self` contains the offset `other`.
    pub const fn contains(&self, other: usize) -> bool {
        self.base <= other && other < self.acme
    }

    /// Returns whether some of `self` overlaps some of `other`.
    ///
    /// Empty spans don't overlap with anything.
    pub const fn overlaps(&self, other: Span) -> bool {
        if self.is_empty() || other.is_empty() {
            false
        } else {
            !(self.base >= other.acme || other.base >= self.acme)
        }
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}..{:#x}", self.base, self.acme)
    }
}
