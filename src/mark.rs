//! Round-robin mark allocation
//!
//! The only stateful piece of the packet path. A shared cycle counter is
//! consumed with an atomic fetch-add, so concurrent callers can never
//! observe the same counter value, and the derived mark cycles through
//! `1..=N` in strict order.

use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out firewall marks in `[1, N]`, round-robin.
///
/// Each allocator owns its own counter; handlers get one injected rather
/// than sharing process-wide state, so tests can run independent cycles.
#[derive(Debug)]
pub struct MarkAllocator {
    counter: AtomicU64,
    marks: u64,
}

impl MarkAllocator {
    /// Creates an allocator cycling through `1..=marks`.
    ///
    /// A zero range is rejected here, at construction, so the per-packet
    /// path never has to guard the modulo.
    pub fn new(marks: u32) -> Result<Self> {
        if marks == 0 {
            return Err(Error::Config("mark range must be at least 1".into()));
        }
        Ok(Self {
            counter: AtomicU64::new(1),
            marks: u64::from(marks),
        })
    }

    /// Returns the next mark in the cycle. Never zero.
    ///
    /// Consumes exactly one counter value per call. The counter wraps
    /// silently at `u64::MAX`; only the value modulo the range matters, so
    /// the cycle stays intact across the wrap.
    pub fn next_mark(&self) -> u32 {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ((n % self.marks) + 1) as u32
    }
}
