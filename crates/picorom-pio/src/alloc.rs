//! Allocation of decode programs to the limited pool of state-machine units.

/// Number of state-machine blocks on the part.
pub const NUM_BLOCKS: usize = 2;
/// Units per block.
pub const UNITS_PER_BLOCK: usize = 4;

/// A claimed state-machine unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub block: usize,
    pub unit: usize,
}

/// Tracks which state-machine units are claimed.
///
/// Address decoding and mailbox decoding compete for the same pool; a
/// program that cannot claim a unit at boot is simply absent, and features
/// that depend on it report themselves unavailable rather than failing
/// later.
pub struct SlotAllocator {
    claimed: [[bool; UNITS_PER_BLOCK]; NUM_BLOCKS],
}

impl SlotAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            claimed: [[false; UNITS_PER_BLOCK]; NUM_BLOCKS],
        }
    }

    /// Claim the first free unit in the given block.
    pub fn claim(&mut self, block: usize) -> Option<Slot> {
        if block >= NUM_BLOCKS {
            return None;
        }
        for unit in 0..UNITS_PER_BLOCK {
            if !self.claimed[block][unit] {
                self.claimed[block][unit] = true;
                return Some(Slot { block, unit });
            }
        }
        None
    }

    /// Claim a free unit in any block.
    pub fn claim_any(&mut self) -> Option<Slot> {
        (0..NUM_BLOCKS).find_map(|block| self.claim(block))
    }

    pub fn release(&mut self, slot: Slot) {
        if slot.block < NUM_BLOCKS && slot.unit < UNITS_PER_BLOCK {
            self.claimed[slot.block][slot.unit] = false;
        }
    }

    /// Release every unit, as when the program set is rebuilt at boot.
    pub fn reset(&mut self) {
        self.claimed = [[false; UNITS_PER_BLOCK]; NUM_BLOCKS];
    }

    #[must_use]
    pub fn free_units(&self) -> usize {
        self.claimed
            .iter()
            .flatten()
            .filter(|claimed| !**claimed)
            .count()
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}
