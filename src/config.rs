//! Policy parameters for [`Heap`](crate::Heap).
//!
//! The defaults were tuned against typical allocation traces.

use crate::{ALIGNMENT, DSIZE, MIN_BLOCK_SIZE, OVERHEAD};

/// Minimum number of bytes the arena is extended by when no free block fits.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 8;

/// A free block is split only if the remainder would be at least this large.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 18 * DSIZE + OVERHEAD;

/// The best-fit search stops at the first candidate wasting no more than this.
pub const DEFAULT_FIT_THRESHOLD: usize = 3904;

/// How much consistency checking the heap performs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckLevel {
    /// Never check implicitly.
    #[default]
    Off,
    /// Check the heap at the top of every `malloc` and `free`, logging violations.
    Quiet,
    /// Like [`CheckLevel::Quiet`], and also log every block.
    Verbose,
}

impl CheckLevel {
    #[inline]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, CheckLevel::Off)
    }
}

/// Tunable heap policy.
///
/// Construct with [`HeapConfig::default`] and adjust with the `with_*` methods,
/// which normalise their inputs to values the heap can honour.
///
/// ```rust
/// # use tagheap::*;
/// let config = HeapConfig::default()
///     .with_chunk_size(4096)
///     .with_fit_threshold(0)
///     .with_check(CheckLevel::Quiet);
///
/// assert_eq!(config.chunk_size(), 4096);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapConfig {
    chunk_size: usize,
    split_threshold: usize,
    fit_threshold: usize,
    check: CheckLevel,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            fit_threshold: DEFAULT_FIT_THRESHOLD,
            check: CheckLevel::Off,
        }
    }
}

impl HeapConfig {
    /// Minimum number of bytes the arena grows by.
    #[inline]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Smallest remainder split off a free block.
    #[inline]
    pub const fn split_threshold(&self) -> usize {
        self.split_threshold
    }

    #[inline]
    pub const fn fit_threshold(&self) -> usize {
        self.fit_threshold
    }

    #[inline]
    pub const fn check(&self) -> CheckLevel {
        self.check
    }

    /// Set the minimum arena growth, rounded up to the alignment.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MIN_BLOCK_SIZE).next_multiple_of(ALIGNMENT);
        self
    }

    /// Set the smallest remainder worth splitting off.
    ///
    /// Never lower than a minimum-size block.
    pub fn with_split_threshold(mut self, split_threshold: usize) -> Self {
        self.split_threshold = split_threshold.max(MIN_BLOCK_SIZE);
        self
    }

    /// Set the surplus at which the fit search settles.
    ///
    /// `0` searches for the exact best fit, `usize::MAX` takes the first fit.
    pub fn with_fit_threshold(mut self, fit_threshold: usize) -> Self {
        self.fit_threshold = fit_threshold;
        self
    }

    pub fn with_check(mut self, check: CheckLevel) -> Self {
        self.check = check;
        self
    }
}
