//! Heap consistency checking.
//!
//! The checker walks every block in address order, then the free list,
//! and reports every broken invariant it finds instead of stopping at the first.

use alloc::vec::Vec;

use thiserror::Error;

use crate::{Arena, Heap, Tag, ALIGNMENT, DSIZE, WSIZE};

/// A broken heap invariant, as found by [`Heap::check_heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Violation {
    #[error("bad prologue header {tag}")]
    BadPrologue { tag: Tag },

    #[error("block {block:#x} is not doubleword aligned")]
    Misaligned { block: usize },

    #[error("block {block:#x}: header {header} does not match footer {footer}")]
    TagMismatch { block: usize, header: Tag, footer: Tag },

    #[error("block {block:#x} runs past the end of the arena")]
    Overrun { block: usize },

    #[error("bad epilogue header {tag} at {offset:#x}")]
    BadEpilogue { offset: usize, tag: Tag },

    #[error("free list: {block:#x} links back to {found:?}, expected {expected:?}")]
    BrokenBacklink { block: usize, expected: Option<usize>, found: Option<usize> },

    #[error("free list: head links back to {found:?}, expected the last member {expected:?}")]
    BrokenTail { expected: Option<usize>, found: Option<usize> },

    #[error("free list: block {block:#x} is allocated")]
    AllocatedInFreeList { block: usize },

    #[error("free list: {block:#x} is outside the heap")]
    ListedOutsideHeap { block: usize },

    #[error("free block {block:#x} is missing from the free list")]
    UnlistedFreeBlock { block: usize },

    #[error("adjacent free blocks {block:#x} and {next:#x} escaped coalescing")]
    EscapedCoalescing { block: usize, next: usize },
}

/// Summary of a [`Heap::check_heap`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct HeapReport {
    /// Number of blocks between the prologue and the epilogue.
    pub blocks: usize,
    pub free_blocks: usize,
    /// Sum of the free blocks' sizes, boundary tags included.
    pub free_bytes: usize,
    pub violations: Vec<Violation>,
}

impl HeapReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn flag(&mut self, violation: Violation) {
        log::error!("heap check: {violation}");
        self.violations.push(violation);
    }
}

impl<A: Arena> Heap<A> {
    /// Check the heap's invariants, logging each violation at `error` level.
    ///
    /// If `verbose`, every block is also logged at `info` level.
    ///
    /// Never modifies the heap. An uninitialized heap yields an empty report.
    pub fn check_heap(&self, verbose: bool) -> HeapReport {
        let mut report = HeapReport::default();

        let Some(prologue) = self.prologue else {
            log::warn!("heap check: heap is not initialized");
            return report;
        };

        let end = self.arena.current_end();

        if verbose {
            log::info!("Heap ({prologue:#x}):");
        }

        let tag = self.header(prologue);
        if tag.size() != DSIZE || !tag.is_allocated() {
            report.flag(Violation::BadPrologue { tag });
        }

        let mut bp = prologue;
        let mut prev_free: Option<usize> = None;

        // bp is the epilogue's payload offset once this loop terminates normally
        let terminated = loop {
            if bp > end {
                report.flag(Violation::Overrun { block: bp });
                break false;
            }

            let header = self.header(bp);
            if header.size() == 0 {
                break true;
            }
            if bp + header.size() > end {
                report.flag(Violation::Overrun { block: bp });
                break false;
            }

            let footer = self.footer(bp);
            if verbose {
                log::info!("{bp:#x}: header: {header} footer: {footer}");
            }

            if bp % ALIGNMENT != 0 {
                report.flag(Violation::Misaligned { block: bp });
            }
            if header != footer {
                report.flag(Violation::TagMismatch { block: bp, header, footer });
            }

            if bp != prologue {
                report.blocks += 1;

                if header.is_allocated() {
                    prev_free = None;
                } else {
                    report.free_blocks += 1;
                    report.free_bytes += header.size();

                    if bp % ALIGNMENT == 0 && !self.free_list.contains(bp) {
                        report.flag(Violation::UnlistedFreeBlock { block: bp });
                    }
                    if let Some(block) = prev_free {
                        report.flag(Violation::EscapedCoalescing { block, next: bp });
                    }
                    prev_free = Some(bp);
                }
            }

            bp += header.size();
        };

        if terminated {
            let tag = self.header(bp);
            if verbose {
                log::info!("{bp:#x}: EOL");
            }
            if !tag.is_allocated() || bp != end {
                report.flag(Violation::BadEpilogue { offset: bp - WSIZE, tag });
            }
        }

        if verbose {
            log::info!("Checking the free list");
        }

        let heap = self.heap_span();
        let mut last = None;

        for block in self.free_list.iter().take(self.free_list.len() + 1) {
            let found = self.free_list.link(block).and_then(|link| link.prev);
            if found != last {
                report.flag(Violation::BrokenBacklink { block, expected: last, found });
            }

            if !heap.contains(block) {
                report.flag(Violation::ListedOutsideHeap { block });
            } else if self.header(block).is_allocated() {
                report.flag(Violation::AllocatedInFreeList { block });
            }

            last = Some(block);
        }

        let found = self.free_list.head().prev;
        if found != last {
            report.flag(Violation::BrokenTail { expected: last, found });
        }

        if verbose {
            log::info!(
                "{} blocks, {} free totalling {} bytes",
                report.blocks,
                report.free_blocks,
                report.free_bytes
            );
        }

        report
    }
}
