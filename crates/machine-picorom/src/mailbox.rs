//! Mailbox record layout and typed accessors.
//!
//! The mailbox is a fixed-layout record embedded in the ROM buffer at a
//! window-aligned offset. The target polls it like memory-mapped
//! registers; the emulated bus is read-only, so the outbound direction is
//! encoded in the address: reading `base + OUT_AREA + b` pushes byte `b`.
//!
//! # Record layout (byte offsets)
//!
//! | Offset | Field             | Size |
//! |--------|-------------------|------|
//! | 0      | magic tag "PICO"  | 4    |
//! | 4      | active            | 4    |
//! | 8      | pending           | 4    |
//! | 12     | inbound byte      | 4    |
//! | 16     | inbound sequence  | 4    |
//! | 20     | outbound sequence | 4    |
//! | 24     | tick count*       | 4    |
//! | 256    | outbound area     | 256  |
//! | 512    | tick reset*       | 4    |
//!
//! Fields marked * exist only on the clock-counting variant, which grows
//! the window from 512 to 1024 bytes. Fields are 32 bits wide for
//! alignment, but only the least significant byte is visible over the
//! 8-bit bus.

use crate::rom::RomBuffer;

/// Magic tag the target looks for at the window base.
pub const MAILBOX_MAGIC: [u8; 4] = *b"PICO";

/// Reserved window size (and alignment) for the base contract.
pub const MAILBOX_WINDOW: u32 = 512;
/// Window size for the clock-counting variant.
pub const MAILBOX_WINDOW_CLOCK: u32 = 1024;

pub const OFFSET_MAGIC: u32 = 0;
pub const OFFSET_ACTIVE: u32 = 4;
pub const OFFSET_PENDING: u32 = 8;
pub const OFFSET_IN_BYTE: u32 = 12;
pub const OFFSET_IN_SEQ: u32 = 16;
pub const OFFSET_OUT_SEQ: u32 = 20;
pub const OFFSET_TICK_COUNT: u32 = 24;
pub const OFFSET_OUT_AREA: u32 = 256;
pub const OUT_AREA_LEN: u32 = 256;
pub const OFFSET_TICK_RESET: u32 = 512;

/// Typed view of a mailbox record at a given base offset.
///
/// Every field has exactly one writer across the system; the accessors
/// below are the only ROM-buffer writes the mailbox paths perform, which
/// is what keeps the protocol safe without locks.
#[derive(Clone, Copy)]
pub struct Mailbox<'a> {
    rom: &'a RomBuffer,
    base: u32,
}

impl<'a> Mailbox<'a> {
    /// View the record at `base`. `base` must already be window-aligned
    /// and in range; `begin_session` guarantees both by masking.
    #[must_use]
    pub fn new(rom: &'a RomBuffer, base: u32) -> Self {
        debug_assert_eq!(base % MAILBOX_WINDOW, 0);
        Self { rom, base }
    }

    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Zero the whole record and stamp the magic tag.
    pub fn initialise(&self, window: u32) {
        let zeroes = [0u8; MAILBOX_WINDOW_CLOCK as usize];
        self.rom.write_slice(self.base, &zeroes[..window as usize]);
        self.rom
            .write_slice(self.base + OFFSET_MAGIC, &MAILBOX_MAGIC);
    }

    pub fn set_active(&self, active: bool) {
        self.rom
            .write_u32_le(self.base + OFFSET_ACTIVE, u32::from(active));
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.rom.read_u32_le(self.base + OFFSET_ACTIVE) != 0
    }

    pub fn set_pending(&self, pending: bool) {
        self.rom
            .write_u32_le(self.base + OFFSET_PENDING, u32::from(pending));
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.rom.read_u32_le(self.base + OFFSET_PENDING) != 0
    }

    pub fn set_in_byte(&self, value: u8) {
        self.rom
            .write_u32_le(self.base + OFFSET_IN_BYTE, u32::from(value));
    }

    /// Bump the inbound sequence counter (low byte on the wire).
    pub fn bump_in_seq(&self) {
        self.rom.bump_byte(self.base + OFFSET_IN_SEQ);
    }

    /// Bump the outbound sequence counter (low byte on the wire).
    pub fn bump_out_seq(&self) {
        self.rom.bump_byte(self.base + OFFSET_OUT_SEQ);
    }

    #[must_use]
    pub fn in_seq(&self) -> u8 {
        self.rom.peek(self.base + OFFSET_IN_SEQ)
    }

    #[must_use]
    pub fn out_seq(&self) -> u8 {
        self.rom.peek(self.base + OFFSET_OUT_SEQ)
    }

    pub fn set_tick_count(&self, ticks: u32) {
        self.rom.write_u32_le(self.base + OFFSET_TICK_COUNT, ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialise_stamps_magic_and_zeroes_fields() {
        let rom = RomBuffer::new();
        rom.poke(0x1000 + OFFSET_PENDING, 0xFF);
        let mb = Mailbox::new(&rom, 0x1000);
        mb.initialise(MAILBOX_WINDOW);
        let mut magic = [0u8; 4];
        rom.read_slice(0x1000, &mut magic);
        assert_eq!(magic, MAILBOX_MAGIC);
        assert!(!mb.active());
        assert!(!mb.pending());
        assert_eq!(mb.in_seq(), 0);
        assert_eq!(mb.out_seq(), 0);
    }

    #[test]
    fn sequence_counters_wrap_at_the_bus_visible_byte() {
        let rom = RomBuffer::new();
        let mb = Mailbox::new(&rom, 0);
        mb.initialise(MAILBOX_WINDOW);
        for _ in 0..300 {
            mb.bump_in_seq();
        }
        assert_eq!(mb.in_seq(), (300 % 256) as u8);
        // The upper field bytes stay zero.
        assert_eq!(rom.read_u32_le(OFFSET_IN_SEQ), 300 % 256);
    }

    #[test]
    fn record_fits_inside_its_window() {
        assert!(OFFSET_OUT_AREA + OUT_AREA_LEN <= MAILBOX_WINDOW);
        assert!(OFFSET_TICK_RESET + 4 <= MAILBOX_WINDOW_CLOCK);
    }
}
