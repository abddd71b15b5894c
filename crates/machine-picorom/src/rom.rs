//! The ROM buffer: the in-memory image served to the emulated bus.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Capacity of the ROM buffer, sized to the largest supported image.
pub const ROM_SIZE: usize = 0x40000;
/// Widest usable address mask.
pub const ADDR_MASK: u32 = (ROM_SIZE as u32) - 1;

/// Byte-addressable memory region shared by all three execution layers.
///
/// The bus is 8 bits wide, so per-byte atomics are the accurate sharing
/// model: the responder and the decode layer read bytes, the control plane
/// and the mailbox interrupt paths write them. Stores use `Release` and
/// loads `Acquire` so a field written before a sequence-counter bump is
/// visible to a reader that has observed the bump.
///
/// Allocated once; never resized. Resizing would require reprogramming the
/// address mask and the decoders, which is not supported at runtime.
pub struct RomBuffer {
    data: Box<[AtomicU8]>,
    mask: AtomicU32,
}

impl RomBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: (0..ROM_SIZE).map(|_| AtomicU8::new(0)).collect(),
            mask: AtomicU32::new(ADDR_MASK),
        }
    }

    /// The configured address mask. Always a power-of-two-minus-one no
    /// larger than `ADDR_MASK`.
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask.load(Ordering::Acquire)
    }

    pub fn set_mask(&self, mask: u32) {
        debug_assert_eq!(mask & mask.wrapping_add(1), 0, "mask must be 2^n - 1");
        self.mask.store(mask & ADDR_MASK, Ordering::Release);
    }

    /// Serve one bus address: mask and index.
    #[must_use]
    pub fn read(&self, addr: u32) -> u8 {
        self.data[(addr & self.mask()) as usize].load(Ordering::Acquire)
    }

    /// Read a byte at an absolute buffer offset (no masking).
    #[must_use]
    pub fn peek(&self, offset: u32) -> u8 {
        self.data[offset as usize].load(Ordering::Acquire)
    }

    /// Write a byte at an absolute buffer offset (no masking).
    pub fn poke(&self, offset: u32, value: u8) {
        self.data[offset as usize].store(value, Ordering::Release);
    }

    /// Copy `src` into the buffer starting at `offset`. The caller has
    /// already bounds-checked the range.
    pub fn write_slice(&self, offset: u32, src: &[u8]) {
        debug_assert!(offset as usize + src.len() <= ROM_SIZE);
        for (i, &b) in src.iter().enumerate() {
            self.data[offset as usize + i].store(b, Ordering::Release);
        }
    }

    /// Copy out of the buffer starting at `offset`.
    pub fn read_slice(&self, offset: u32, dst: &mut [u8]) {
        debug_assert!(offset as usize + dst.len() <= ROM_SIZE);
        for (i, b) in dst.iter_mut().enumerate() {
            *b = self.data[offset as usize + i].load(Ordering::Acquire);
        }
    }

    /// Load an image into the start of the buffer, as at boot. Oversized
    /// images are truncated to the buffer capacity.
    pub fn load_image(&self, image: &[u8]) {
        let len = image.len().min(ROM_SIZE);
        self.write_slice(0, &image[..len]);
    }

    /// Copy the whole buffer out, as for flash persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = vec![0u8; ROM_SIZE];
        self.read_slice(0, &mut out);
        out
    }

    /// Read a little-endian 32-bit mailbox field.
    #[must_use]
    pub fn read_u32_le(&self, offset: u32) -> u32 {
        let mut bytes = [0u8; 4];
        self.read_slice(offset, &mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Write a little-endian 32-bit mailbox field.
    pub fn write_u32_le(&self, offset: u32, value: u32) {
        self.write_slice(offset, &value.to_le_bytes());
    }

    /// Atomically increment the low byte of a 32-bit field.
    ///
    /// Sequence counters are 32 bits wide for alignment but only the low
    /// byte is visible over the 8-bit bus, so a byte-wide read-modify-write
    /// is sufficient and cannot lose increments under concurrent bumps.
    pub fn bump_byte(&self, offset: u32) {
        self.data[offset as usize].fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for RomBuffer {
    fn default() -> Self {
        Self::new()
    }
}
