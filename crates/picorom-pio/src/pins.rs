//! Electrical state of the emulated ROM bus.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// Number of data lines.
pub const N_DATA_PINS: u32 = 8;
/// Largest address-line count across board variants.
pub const MAX_ADDR_PINS: u32 = 20;
/// Number of enable lines (/CE and /OE on the emulated part).
pub const N_OE_PINS: u32 = 2;

/// Shared pin-level state of the bus.
///
/// The target side sets address levels and asserts the enable lines; the
/// decode state machines sample addresses and drive or float the data
/// lines. All fields are plain levels, so the struct can be shared freely
/// between the bus-driving context and the control plane.
///
/// Enable lines are active low: the bus is enabled only while every
/// monitored line is low.
pub struct BusPins {
    /// Levels on the address lines.
    address: AtomicU32,
    /// Input-enable mask for the address lines. A line outside the
    /// configured address mask is disabled and samples as zero.
    addr_enable: AtomicU32,
    /// Enable-line levels, one bit per line, bit set = high (deasserted).
    oe: AtomicU8,
    /// Levels on the data lines. Meaningful only while driven.
    data: AtomicU8,
    /// Device side is driving the data lines (vs. high impedance).
    data_driven: AtomicBool,
    /// External tri-state buffer enable output, where the board has one.
    buf_oe: AtomicBool,
}

impl BusPins {
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: AtomicU32::new(0),
            addr_enable: AtomicU32::new((1 << MAX_ADDR_PINS) - 1),
            oe: AtomicU8::new((1 << N_OE_PINS) - 1),
            data: AtomicU8::new(0xFF),
            data_driven: AtomicBool::new(false),
            buf_oe: AtomicBool::new(false),
        }
    }

    /// Present an address on the bus (target side).
    pub fn set_address(&self, addr: u32) {
        self.address.store(addr, Ordering::Release);
    }

    /// Sample the address lines (device side). Disabled lines read zero.
    #[must_use]
    pub fn sample_address(&self) -> u32 {
        self.address.load(Ordering::Acquire) & self.addr_enable.load(Ordering::Relaxed)
    }

    /// Set the input-enable mask for the address lines.
    pub fn set_address_enable(&self, mask: u32) {
        self.addr_enable
            .store(mask & ((1 << MAX_ADDR_PINS) - 1), Ordering::Relaxed);
    }

    /// Pull every enable line low (target side, begin access).
    pub fn assert_enable(&self) {
        self.oe.store(0, Ordering::Release);
    }

    /// Release every enable line high (target side, end access).
    pub fn release_enable(&self) {
        self.oe.store((1 << N_OE_PINS) - 1, Ordering::Release);
    }

    /// True while every enable line is asserted (low).
    #[must_use]
    pub fn enable_asserted(&self) -> bool {
        self.oe.load(Ordering::Acquire) == 0
    }

    /// Drive a byte onto the data lines (device side).
    pub fn drive_data(&self, value: u8) {
        self.data.store(value, Ordering::Release);
        self.data_driven.store(true, Ordering::Release);
    }

    /// Float the data lines (device side).
    pub fn float_data(&self) {
        self.data_driven.store(false, Ordering::Release);
    }

    /// Read the data lines (target side). `None` while floating.
    #[must_use]
    pub fn data(&self) -> Option<u8> {
        if self.data_driven.load(Ordering::Acquire) {
            Some(self.data.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Set the external buffer enable output.
    pub fn set_buffer_enable(&self, enabled: bool) {
        self.buf_oe.store(enabled, Ordering::Release);
    }

    /// Level of the external buffer enable output.
    #[must_use]
    pub fn buffer_enabled(&self) -> bool {
        self.buf_oe.load(Ordering::Acquire)
    }
}

impl Default for BusPins {
    fn default() -> Self {
        Self::new()
    }
}
