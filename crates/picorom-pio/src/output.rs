//! Data-line output driver and output-enable sequencer.

use crate::pins::BusPins;

/// Shifts the most recently queued byte onto the data lines.
///
/// The responder queues one byte per bus access; the driver latches it and
/// the sequencer decides whether the latch reaches the pins. The latch
/// persists across accesses, so the lines keep their last value while the
/// responder is stopped.
pub struct OutputDriver {
    latch: u8,
}

impl OutputDriver {
    #[must_use]
    pub fn new() -> Self {
        Self { latch: 0xFF }
    }

    /// Queue a byte for output. Overwrites any unshifted byte.
    pub fn queue_byte(&mut self, value: u8) {
        self.latch = value;
    }

    /// The byte currently held in the output latch.
    #[must_use]
    pub fn latched(&self) -> u8 {
        self.latch
    }
}

impl Default for OutputDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches the enable lines and owns data-line direction.
///
/// While the enable lines are deasserted the data lines are floated and
/// the external tri-state buffer (if the board has one) is disabled; while
/// asserted, the latch is driven out and the buffer enabled. Ownership is
/// re-evaluated from the current line levels on every step, so arbitrarily
/// fast assert/deassert activity can never leave the lines driven while
/// the bus is disabled.
pub struct OutputEnableSequencer {
    has_buffer: bool,
}

impl OutputEnableSequencer {
    #[must_use]
    pub fn new(has_buffer: bool) -> Self {
        Self { has_buffer }
    }

    /// Re-evaluate data-line ownership from the enable lines.
    pub fn step(&self, pins: &BusPins, driver: &OutputDriver) {
        if pins.enable_asserted() {
            pins.drive_data(driver.latched());
            if self.has_buffer {
                pins.set_buffer_enable(true);
            }
        } else {
            pins.float_data();
            if self.has_buffer {
                pins.set_buffer_enable(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drives_latch_only_while_enabled() {
        let pins = BusPins::new();
        let seq = OutputEnableSequencer::new(false);
        let mut driver = OutputDriver::new();
        driver.queue_byte(0x5A);

        seq.step(&pins, &driver);
        assert_eq!(pins.data(), None);

        pins.assert_enable();
        seq.step(&pins, &driver);
        assert_eq!(pins.data(), Some(0x5A));

        pins.release_enable();
        seq.step(&pins, &driver);
        assert_eq!(pins.data(), None);
    }

    #[test]
    fn buffer_enable_follows_the_enable_lines() {
        let pins = BusPins::new();
        let seq = OutputEnableSequencer::new(true);
        let driver = OutputDriver::new();

        pins.assert_enable();
        seq.step(&pins, &driver);
        assert!(pins.buffer_enabled());

        pins.release_enable();
        seq.step(&pins, &driver);
        assert!(!pins.buffer_enabled());
    }

    #[test]
    fn rapid_toggling_never_leaves_the_lines_driven() {
        let pins = BusPins::new();
        let seq = OutputEnableSequencer::new(false);
        let driver = OutputDriver::new();

        for _ in 0..100 {
            pins.assert_enable();
            seq.step(&pins, &driver);
            pins.release_enable();
            seq.step(&pins, &driver);
        }
        assert_eq!(pins.data(), None);
    }
}
