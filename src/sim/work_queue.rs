// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The shared work-unit index.
//!
//! A work unit is the simulation of one time sample against one sky chunk.
//! All of a block's work units are enumerated by a single monotonic counter
//! shared by every compute participant; claiming a value is the only
//! mutual-exclusion operation in the compute path. The counter is reset once
//! per block boundary, between the two barriers, so no participant can claim
//! units for the new block before the reset is visible to all.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A claimed work unit, decomposed from its counter value.
///
/// Counter values enumerate times within a chunk before advancing to the
/// next chunk, so consecutive claims by one participant tend to reuse the
/// sky chunk it has already copied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkUnit {
    pub(crate) chunk_index: usize,
    pub(crate) time_index: usize,
}

impl WorkUnit {
    pub(crate) fn from_counter(value: usize, num_times_block: usize) -> WorkUnit {
        WorkUnit {
            chunk_index: value / num_times_block,
            time_index: value % num_times_block,
        }
    }
}

/// The shared monotonic claim counter. Owned by the driver and handed by
/// reference to each participant.
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    counter: AtomicUsize,
}

impl WorkQueue {
    pub(crate) fn new() -> WorkQueue {
        WorkQueue {
            counter: AtomicUsize::new(0),
        }
    }

    /// Claim the next work-unit counter value. Every value is issued exactly
    /// once between resets, no matter how many threads are claiming.
    pub(crate) fn claim(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Reset the counter for a new block. Must only be called while all
    /// participants are quiescent (i.e. between the two block barriers).
    pub(crate) fn reset(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }
}
