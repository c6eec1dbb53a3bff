// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the free-range table
//! OWNERS: @kernel-mm-team
//! NOTE: Tests only; no kernel logic. Conservation and full-coalescing under
//! random alloc/free histories.
//!
//! TEST_SCOPE:
//!   - No bytes appear or vanish while the table never overflows
//!   - Releasing every live allocation restores one fully coalesced row
//!
//! TEST_SCENARIOS:
//!   - conservation_under_random_history(): free_total + live == region size
//!     after every operation
//!   - full_release_restores_single_row(): any order of frees converges

use super::RegionAllocator;
use proptest::prelude::*;
use std::vec::Vec;

const REGION_SIZE: usize = 1 << 20;

fn arb_ops() -> impl Strategy<Value = Vec<(bool, usize, prop::sample::Index)>> {
    prop::collection::vec((any::<bool>(), 1usize..4096, any::<prop::sample::Index>()), 1..80)
}

proptest! {
    #[test]
    fn conservation_under_random_history(ops in arb_ops()) {
        let mut mm = RegionAllocator::new();
        mm.init(0, REGION_SIZE);
        let mut live: Vec<(usize, usize)> = Vec::new();
        let mut live_bytes = 0usize;

        for (alloc, size, pick) in ops {
            if alloc {
                if let Ok(addr) = mm.alloc(size) {
                    live.push((addr, size));
                    live_bytes += size;
                }
            } else if !live.is_empty() {
                let (addr, size) = live.swap_remove(pick.index(live.len()));
                mm.free(addr, size);
                live_bytes -= size;
            }
            prop_assert_eq!(mm.lost(), (0, 0));
            prop_assert_eq!(mm.free_total() + live_bytes, REGION_SIZE);
        }
    }

    #[test]
    fn full_release_restores_single_row(ops in arb_ops()) {
        let mut mm = RegionAllocator::new();
        mm.init(0, REGION_SIZE);
        let mut live: Vec<(usize, usize)> = Vec::new();

        for (alloc, size, pick) in ops {
            if alloc {
                if let Ok(addr) = mm.alloc(size) {
                    live.push((addr, size));
                }
            } else if !live.is_empty() {
                let (addr, size) = live.swap_remove(pick.index(live.len()));
                mm.free(addr, size);
            }
        }
        for (addr, size) in live {
            mm.free(addr, size);
        }
        prop_assert_eq!(mm.row_count(), 1);
        prop_assert_eq!(mm.free_total(), REGION_SIZE);
    }
}
