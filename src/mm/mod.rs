// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Region-based memory manager over a table of free address ranges
//! OWNERS: @kernel-mm-team
//! PUBLIC API: RegionAllocator (init/alloc/free/alloc_4k/free_4k/free_total/lost)
//! DEPENDS_ON: config::MAX_FREE_ROWS, log
//! INVARIANTS: Rows sorted ascending by address, non-overlapping, fully coalesced
//! ADR: docs/adr/0001-kernel-core-boundaries.md
//!
//! First-fit allocation with eager neighbour coalescing on free. The row
//! table is fixed size; a free that cannot be recorded drops the range and
//! advances the loss counters instead of failing the caller. Only task
//! context allocates and frees, so no interrupt masking happens here.

use crate::config::MAX_FREE_ROWS;

/// Allocation granule of [`RegionAllocator::alloc_4k`].
pub const PAGE_SIZE: usize = 4096;

/// Error returned by allocation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free row can satisfy the requested size.
    OutOfMemory,
}

/// One free address range: `addr .. addr + size`.
#[derive(Clone, Copy)]
struct FreeRow {
    addr: usize,
    size: usize,
}

impl FreeRow {
    const EMPTY: Self = Self { addr: 0, size: 0 };

    #[inline]
    const fn end(self) -> usize {
        self.addr + self.size
    }
}

/// Manager of one contiguous memory region.
///
/// The table records what is *free*; everything else in the region is
/// considered allocated. Rows are kept sorted by address and merged with
/// their neighbours eagerly, so adjacent rows never coexist.
pub struct RegionAllocator {
    rows: usize,
    lost_bytes: usize,
    lost_rows: usize,
    table: [FreeRow; MAX_FREE_ROWS],
    #[cfg(feature = "failpoints")]
    deny_next_alloc: bool,
}

impl RegionAllocator {
    /// Creates an empty manager tracking no memory.
    pub const fn new() -> Self {
        Self {
            rows: 0,
            lost_bytes: 0,
            lost_rows: 0,
            table: [FreeRow::EMPTY; MAX_FREE_ROWS],
            #[cfg(feature = "failpoints")]
            deny_next_alloc: false,
        }
    }

    /// Seeds the table with one row covering `base .. base + size`.
    pub fn init(&mut self, base: usize, size: usize) {
        self.rows = 0;
        self.lost_bytes = 0;
        self.lost_rows = 0;
        self.free(base, size);
    }

    /// Allocates `size` bytes, first fit in ascending address order.
    #[must_use = "allocation failures must be handled"]
    pub fn alloc(&mut self, size: usize) -> Result<usize, AllocError> {
        #[cfg(feature = "failpoints")]
        if self.deny_next_alloc {
            self.deny_next_alloc = false;
            return Err(AllocError::OutOfMemory);
        }

        for i in 0..self.rows {
            if self.table[i].size >= size {
                let addr = self.table[i].addr;
                self.table[i].addr += size;
                self.table[i].size -= size;
                if self.table[i].size == 0 {
                    self.remove_row(i);
                }
                return Ok(addr);
            }
        }
        Err(AllocError::OutOfMemory)
    }

    /// Returns `addr .. addr + size` to the free table.
    ///
    /// Merges with the preceding row when it ends exactly at `addr` and
    /// with the following row when it begins exactly at `addr + size`; a
    /// single call can do both. When the table is full and a new row would
    /// be needed, the range is dropped and only the loss counters record
    /// it; the bytes are unreclaimable for the rest of the boot.
    pub fn free(&mut self, addr: usize, size: usize) {
        if size == 0 {
            return;
        }

        // Insertion point: first row starting beyond the freed range.
        let mut idx = self.rows;
        for i in 0..self.rows {
            if self.table[i].addr > addr {
                idx = i;
                break;
            }
        }

        if idx > 0 && self.table[idx - 1].end() == addr {
            self.table[idx - 1].size += size;
            if idx < self.rows && addr + size == self.table[idx].addr {
                // The freed range bridges both neighbours into one row.
                self.table[idx - 1].size += self.table[idx].size;
                self.remove_row(idx);
            }
            return;
        }

        if idx < self.rows && addr + size == self.table[idx].addr {
            self.table[idx].addr = addr;
            self.table[idx].size += size;
            return;
        }

        if self.rows < MAX_FREE_ROWS {
            let mut i = self.rows;
            while i > idx {
                self.table[i] = self.table[i - 1];
                i -= 1;
            }
            self.table[idx] = FreeRow { addr, size };
            self.rows += 1;
            return;
        }

        self.lost_bytes += size;
        self.lost_rows += 1;
        log_warn!(target: "mm", "free table full, {} bytes at {:#x} unreclaimable", size, addr);
    }

    /// [`alloc`](Self::alloc) with the size rounded up to the page granule.
    ///
    /// For allocations that must not share a page with unrelated data,
    /// e.g. per-task stacks and queue buffers. Callers keep addresses
    /// page-aligned by only ever pairing this with [`free_4k`](Self::free_4k).
    #[must_use = "allocation failures must be handled"]
    pub fn alloc_4k(&mut self, size: usize) -> Result<usize, AllocError> {
        self.alloc(round_to_page(size))
    }

    /// [`free`](Self::free) with the size rounded up to the page granule.
    pub fn free_4k(&mut self, addr: usize, size: usize) {
        self.free(addr, round_to_page(size));
    }

    /// Sum of all free rows. O(rows) diagnostic, not for hot paths.
    pub fn free_total(&self) -> usize {
        let mut total = 0;
        for i in 0..self.rows {
            total += self.table[i].size;
        }
        total
    }

    /// Bytes and events lost to free-table overflow since `init`.
    pub fn lost(&self) -> (usize, usize) {
        (self.lost_bytes, self.lost_rows)
    }

    /// Number of rows currently in the table.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Forces the next `alloc` on this manager to report out-of-memory.
    #[cfg(feature = "failpoints")]
    pub fn deny_next_alloc(&mut self) {
        self.deny_next_alloc = true;
    }

    fn remove_row(&mut self, idx: usize) {
        self.rows -= 1;
        for i in idx..self.rows {
            self.table[i] = self.table[i + 1];
        }
    }
}

impl Default for RegionAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub(crate) const fn round_to_page(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}


#[cfg(test)]
mod tests_prop;
