//! Free-running bus-clock counter for the clock-counting board variant.

/// Counts bus clock edges and zeroes itself when the target reads the
/// programmed reset address.
///
/// The count is mirrored into the mailbox's tick field by the machine on
/// every step, standing in for the hardware's continuous DMA copy.
pub struct ClockCounter {
    count: u32,
    reset_addr: u32,
    enabled: bool,
}

impl ClockCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: 0,
            reset_addr: 0,
            enabled: false,
        }
    }

    /// Program the reset address and start counting from zero.
    pub fn program(&mut self, reset_addr: u32) {
        self.reset_addr = reset_addr;
        self.count = 0;
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Advance one bus clock. `access` is the address of a concurrent bus
    /// access, if any; reading the reset address zeroes the counter.
    pub fn step(&mut self, access: Option<u32>) {
        if !self.enabled {
            return;
        }
        if access == Some(self.reset_addr) {
            self.count = 0;
        } else {
            self.count = self.count.wrapping_add(1);
        }
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.count
    }
}

impl Default for ClockCounter {
    fn default() -> Self {
        Self::new()
    }
}
