//! Address-compare match detectors for the mailbox channel.

use std::collections::VecDeque;

/// Depth of a detector's RX FIFO.
pub const DETECT_FIFO_DEPTH: usize = 4;

/// Matches bus accesses against a programmed address pattern.
///
/// An access matches when `address & compare_mask == compare_value`; the
/// detector then captures `address & capture_mask` into its RX FIFO and
/// raises its interrupt line if enabled. Events that arrive while the FIFO
/// is full are dropped and counted; with the interrupt handler draining on
/// every event the FIFO never holds more than one entry in practice.
///
/// Reprogramming a detector discards any captured events.
pub struct MatchDetector {
    compare_value: u32,
    compare_mask: u32,
    capture_mask: u32,
    fifo: VecDeque<u32>,
    enabled: bool,
    irq_enabled: bool,
    overruns: u32,
}

impl MatchDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            compare_value: 0,
            compare_mask: 0,
            capture_mask: 0,
            fifo: VecDeque::with_capacity(DETECT_FIFO_DEPTH),
            enabled: false,
            irq_enabled: false,
            overruns: 0,
        }
    }

    /// Load a new compare pattern and start matching.
    pub fn program(&mut self, compare_value: u32, compare_mask: u32, capture_mask: u32) {
        self.compare_value = compare_value & compare_mask;
        self.compare_mask = compare_mask;
        self.capture_mask = capture_mask;
        self.fifo.clear();
        self.overruns = 0;
        self.enabled = true;
    }

    /// Stop matching and discard captured events.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.irq_enabled = false;
        self.fifo.clear();
    }

    pub fn set_irq_enabled(&mut self, enabled: bool) {
        self.irq_enabled = enabled;
    }

    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    /// Present one bus access to the detector.
    pub fn step(&mut self, address: u32) {
        if !self.enabled || (address & self.compare_mask) != self.compare_value {
            return;
        }
        if self.fifo.len() == DETECT_FIFO_DEPTH {
            self.overruns = self.overruns.wrapping_add(1);
            return;
        }
        self.fifo.push_back(address & self.capture_mask);
    }

    /// Interrupt line: captured events waiting and interrupts enabled.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_enabled && !self.fifo.is_empty()
    }

    /// Pop the oldest captured event.
    pub fn take_event(&mut self) -> Option<u32> {
        self.fifo.pop_front()
    }

    /// Events dropped on a full FIFO since the last reprogram.
    #[must_use]
    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

impl Default for MatchDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_an_exact_address() {
        let mut det = MatchDetector::new();
        det.program(0x1200C, !0, 0x1FF);
        det.step(0x1200C);
        det.step(0x1200D);
        assert_eq!(det.take_event(), Some(0x00C));
        assert_eq!(det.take_event(), None);
    }

    #[test]
    fn matches_a_window_and_captures_low_bits() {
        let mut det = MatchDetector::new();
        // 256-byte window at 0x12100, capture the byte offset.
        det.program(0x12100, !0xFF, 0xFF);
        det.step(0x12142);
        det.step(0x120FF);
        det.step(0x12200);
        assert_eq!(det.take_event(), Some(0x42));
        assert_eq!(det.take_event(), None);
    }

    #[test]
    fn disabled_detector_captures_nothing() {
        let mut det = MatchDetector::new();
        det.program(0x100, !0xFF, 0xFF);
        det.disable();
        det.step(0x123);
        assert_eq!(det.take_event(), None);
    }

    #[test]
    fn full_fifo_drops_and_counts() {
        let mut det = MatchDetector::new();
        det.program(0x000, !0xFF, 0xFF);
        for i in 0..6 {
            det.step(i);
        }
        assert_eq!(det.overruns(), 2);
        let mut events = Vec::new();
        while let Some(ev) = det.take_event() {
            events.push(ev);
        }
        assert_eq!(events, vec![0, 1, 2, 3]);
    }

    #[test]
    fn irq_follows_fifo_and_enable() {
        let mut det = MatchDetector::new();
        det.program(0x000, !0xFF, 0xFF);
        det.step(0x01);
        assert!(!det.irq_pending());
        det.set_irq_enabled(true);
        assert!(det.irq_pending());
        det.take_event();
        assert!(!det.irq_pending());
    }
}
