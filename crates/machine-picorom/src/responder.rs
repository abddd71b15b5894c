//! The real-time responder: the uninterruptible byte-serving loop.

use std::sync::atomic::{AtomicBool, Ordering};

use picorom_pio::{BusPins, OutputDriver};

use crate::rom::RomBuffer;

/// Address-sampling strategy for the serving loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStrategy {
    /// Sample the address lines once per iteration. Cheapest; assumes the
    /// target only presents settled addresses.
    Single,
    /// Sample twice and only index once both samples agree, rejecting a
    /// mid-transition read at the cost of extra cycles.
    DoubleCompare,
}

impl SampleStrategy {
    /// Worst-case cycle count of one loop iteration on the real part.
    #[must_use]
    pub const fn worst_case_cycles(self) -> u32 {
        match self {
            // ldr, and, ldrb(2), strb, b(2)
            Self::Single => 7,
            // ldr, and, ldr, and, cmp, bne, ldrb(2), strb, b(2)
            Self::DoubleCompare => 11,
        }
    }
}

/// Serves one ROM byte per bus access: sample address, mask, index,
/// forward to the output driver.
///
/// The loop body holds no state between iterations beyond the immutable
/// strategy and the buffer's address mask, so stopping and restarting the
/// service (for flash persistence) is safe at any point. There is no
/// error path by design: a fault here is a timing violation to avoid by
/// construction, not a runtime condition. The body performs no heap
/// allocation and calls nothing outside the buffer index and the output
/// latch.
pub struct Responder {
    strategy: SampleStrategy,
    running: AtomicBool,
}

impl Responder {
    #[must_use]
    pub fn new(strategy: SampleStrategy) -> Self {
        Self {
            strategy,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> SampleStrategy {
        self.strategy
    }

    /// Enter the serving loop (launch the dedicated core).
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Stop the serving loop. Returns whether it was running, so a
    /// suspend/resume pair can restore the prior state exactly.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// One iteration of the serving loop against the current bus state.
    pub fn service(&self, rom: &RomBuffer, pins: &BusPins, output: &mut OutputDriver) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let addr = match self.strategy {
            SampleStrategy::Single => pins.sample_address(),
            SampleStrategy::DoubleCompare => loop {
                let first = pins.sample_address();
                let second = pins.sample_address();
                if first == second {
                    break second;
                }
            },
        };
        output.queue_byte(rom.read(addr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_the_masked_rom_byte() {
        let rom = RomBuffer::new();
        rom.poke(0x0042, 0x99);
        rom.set_mask(0x00FF);
        let pins = BusPins::new();
        let mut output = OutputDriver::new();
        let responder = Responder::new(SampleStrategy::Single);
        responder.start();

        pins.set_address(0x1F342);
        responder.service(&rom, &pins, &mut output);
        assert_eq!(output.latched(), 0x99);
    }

    #[test]
    fn stopped_responder_leaves_the_latch_alone() {
        let rom = RomBuffer::new();
        rom.poke(0, 0x11);
        let pins = BusPins::new();
        let mut output = OutputDriver::new();
        output.queue_byte(0xEE);
        let responder = Responder::new(SampleStrategy::Single);

        responder.service(&rom, &pins, &mut output);
        assert_eq!(output.latched(), 0xEE);

        responder.start();
        responder.service(&rom, &pins, &mut output);
        assert_eq!(output.latched(), 0x11);
    }

    #[test]
    fn stop_reports_the_prior_state() {
        let responder = Responder::new(SampleStrategy::DoubleCompare);
        assert!(!responder.stop());
        responder.start();
        assert!(responder.stop());
        assert!(!responder.is_running());
    }

    #[test]
    fn double_compare_costs_more_cycles() {
        assert!(
            SampleStrategy::DoubleCompare.worst_case_cycles()
                > SampleStrategy::Single.worst_case_cycles()
        );
    }
}
