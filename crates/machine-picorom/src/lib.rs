//! ROM emulator machine: a quarter-megabyte buffer served onto a parallel
//! bus in real time, with a mailbox byte channel mapped into the address
//! space.
//!
//! Three execution layers share the ROM buffer:
//!
//! - the **responder**, an uninterruptible loop serving one byte per bus
//!   access (`crate::responder`);
//! - the **decode plane**, autonomous state machines watching the bus for
//!   output-enable edges and mailbox addresses (`picorom_pio`);
//! - the **control plane**, the public [`PicoRom`] API driving sessions,
//!   images and persistence.
//!
//! The mailbox channel rides entirely on ROM reads: the target polls a
//! window-aligned record for inbound bytes and encodes outbound bytes in
//! the addresses it reads. See `crate::comms` for the protocol.

mod comms;
mod config;
mod fifo;
mod flash;
mod link;
mod mailbox;
mod responder;
mod rom;
mod session;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

use picorom_pio::{
    AccessReporter, BusPins, ClockCounter, MatchDetector, OutputDriver, OutputEnableSequencer,
    SlotAllocator,
};

pub use picorom_pio::Slot;

pub use crate::comms::{COMMS_FIFO_DEPTH, CommsChannel, UpdateError};
pub use crate::config::{BoardConfig, CONFIG_VERSION, Config, ResetLevel};
pub use crate::fifo::ByteFifo;
pub use crate::flash::{FlashError, FlashStore, InMemoryFlash};
pub use crate::link::{MAX_PKT_PAYLOAD, PacketSink, VecSink};
pub use crate::mailbox::{
    MAILBOX_MAGIC, MAILBOX_WINDOW, MAILBOX_WINDOW_CLOCK, Mailbox, OFFSET_ACTIVE, OFFSET_IN_BYTE,
    OFFSET_IN_SEQ, OFFSET_MAGIC, OFFSET_OUT_AREA, OFFSET_OUT_SEQ, OFFSET_PENDING,
    OFFSET_TICK_COUNT, OFFSET_TICK_RESET, OUT_AREA_LEN,
};
pub use crate::responder::{Responder, SampleStrategy};
pub use crate::rom::{ADDR_MASK, ROM_SIZE, RomBuffer};
pub use crate::session::SessionState;

/// The address-decode programs came up at boot.
pub const STATUS_DECODE_INIT: u32 = 1 << 0;
/// Both mailbox detectors claimed a state-machine unit.
pub const STATUS_COMMS_READY: u32 = 1 << 1;
/// The clock counter claimed a state-machine unit.
pub const STATUS_CLOCK_READY: u32 = 1 << 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RomError {
    #[error("write of {len} bytes at {offset:#x} runs past the ROM buffer")]
    WriteOutOfRange { offset: u32, len: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommsError {
    /// The mailbox detectors never claimed state-machine units at boot, so
    /// no session can be started on this configuration.
    #[error("no state-machine units available for the mailbox detectors")]
    DetectorsUnavailable,
}

/// A decode program bound to its claimed state-machine unit.
struct DecodeProgram<T> {
    slot: Slot,
    sm: T,
}

/// The set of decode programs loaded at boot.
///
/// Every program is optional: a board that exhausts the state-machine pool
/// simply runs without the late claimants, and the status word says which
/// came up. The plane is locked only to step the bus or reprogram a
/// detector; the mailbox update path never takes this lock.
struct DecodePlane {
    alloc: SlotAllocator,
    reporter: Option<DecodeProgram<AccessReporter>>,
    output: Option<DecodeProgram<OutputDriver>>,
    oe_seq: Option<DecodeProgram<OutputEnableSequencer>>,
    read_detect: Option<DecodeProgram<MatchDetector>>,
    write_detect: Option<DecodeProgram<MatchDetector>>,
    clock: Option<DecodeProgram<ClockCounter>>,
    /// Pin-direction helpers and the expander driver, claimed but not
    /// stepped by the machine.
    aux_slots: Vec<Slot>,
}

/// Claim units and load programs for a board, mirroring the boot-time
/// layout: address decoding fills block 0, the mailbox detectors and the
/// enable sequencer fill block 1, and the clock counter takes whatever is
/// left there.
fn build_decode_plane(board: &BoardConfig) -> (DecodePlane, u32) {
    let mut alloc = SlotAllocator::new();
    let mut aux_slots = Vec::new();

    // Expander boards route the data lines through the external buffer and
    // need both pin-direction helpers resident in block 0.
    if board.has_expander {
        for _ in 0..2 {
            if let Some(slot) = alloc.claim(0) {
                aux_slots.push(slot);
            }
        }
    }
    let reporter = alloc.claim(0).map(|slot| DecodeProgram {
        slot,
        sm: AccessReporter::new(),
    });
    let output = alloc.claim(0).map(|slot| DecodeProgram {
        slot,
        sm: OutputDriver::new(),
    });

    let oe_seq = alloc.claim(1).map(|slot| DecodeProgram {
        slot,
        sm: OutputEnableSequencer::new(board.has_output_buffer),
    });
    let read_detect = alloc.claim(1).map(|slot| DecodeProgram {
        slot,
        sm: MatchDetector::new(),
    });
    let write_detect = alloc.claim(1).map(|slot| DecodeProgram {
        slot,
        sm: MatchDetector::new(),
    });
    if board.has_expander {
        if let Some(slot) = alloc.claim(1) {
            aux_slots.push(slot);
        }
    }
    let clock = if board.clock_counting {
        alloc.claim(1).map(|slot| DecodeProgram {
            slot,
            sm: ClockCounter::new(),
        })
    } else {
        None
    };

    let mut status = 0;
    if reporter.is_some() && output.is_some() && oe_seq.is_some() {
        status |= STATUS_DECODE_INIT;
    }
    if read_detect.is_some() && write_detect.is_some() {
        status |= STATUS_COMMS_READY;
    }
    if clock.is_some() {
        status |= STATUS_CLOCK_READY;
    }

    (
        DecodePlane {
            alloc,
            reporter,
            output,
            oe_seq,
            read_detect,
            write_detect,
            clock,
            aux_slots,
        },
        status,
    )
}

/// Shared state behind the machine's public handles.
struct Device {
    board: BoardConfig,
    pins: BusPins,
    rom: RomBuffer,
    plane: Mutex<DecodePlane>,
    comms: CommsChannel,
    responder: Responder,
    session: session::SessionController,
    rom_offset: AtomicU32,
    config: Mutex<Config>,
    status: u32,
}

impl Device {
    fn plane(&self) -> MutexGuard<'_, DecodePlane> {
        // A panic while stepping the plane is unrecoverable anyway.
        self.plane.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run one full bus access: present the address, step every decode
    /// program through the assert and release edges, and sample the data
    /// lines in between.
    ///
    /// Detector events are dispatched to the mailbox channel inline, which
    /// stands in for the interrupt handler; the channel touches only
    /// atomics, so holding the plane lock here cannot contend with
    /// `CommsChannel::update` on another thread.
    fn bus_access(&self, addr: u32) -> Option<u8> {
        // Pin setup happens under the plane lock so that concurrent
        // target handles serialise into whole bus cycles.
        let mut plane = self.plane();
        self.pins.set_address(addr);
        self.pins.assert_enable();
        let sampled = self.pins.sample_address();

        if let Some(output) = plane.output.as_mut() {
            self.responder.service(&self.rom, &self.pins, &mut output.sm);
        }
        if let (Some(oe_seq), Some(output)) = (plane.oe_seq.as_ref(), plane.output.as_ref()) {
            oe_seq.sm.step(&self.pins, &output.sm);
        }
        if let Some(reporter) = plane.reporter.as_mut() {
            reporter.sm.step(self.pins.enable_asserted());
        }

        if let Some(det) = plane.write_detect.as_mut() {
            det.sm.step(sampled);
            while det.sm.irq_pending() {
                if let Some(event) = det.sm.take_event() {
                    self.comms.on_outbound_match(&self.rom, event as u8);
                }
            }
        }
        if let Some(det) = plane.read_detect.as_mut() {
            det.sm.step(sampled);
            while det.sm.irq_pending() {
                det.sm.take_event();
                self.comms.on_inbound_consumed(&self.rom);
            }
        }
        if let Some(clock) = plane.clock.as_mut() {
            clock.sm.step(Some(sampled));
            self.comms.mirror_tick(&self.rom, clock.sm.value());
        }

        let data = self.pins.data();

        self.pins.release_enable();
        if let (Some(oe_seq), Some(output)) = (plane.oe_seq.as_ref(), plane.output.as_ref()) {
            oe_seq.sm.step(&self.pins, &output.sm);
        }
        if let Some(reporter) = plane.reporter.as_mut() {
            reporter.sm.step(false);
        }
        drop(plane);

        data
    }

    fn mailbox_window(&self) -> u32 {
        if self.board.clock_counting {
            MAILBOX_WINDOW_CLOCK
        } else {
            MAILBOX_WINDOW
        }
    }
}

/// Handle for the target side of the bus.
///
/// Clones share the machine; a test can hand one to a thread standing in
/// for the target processor.
#[derive(Clone)]
pub struct TargetPort {
    dev: Arc<Device>,
}

impl TargetPort {
    /// Perform one read cycle. Floating data lines read back as `0xFF`,
    /// as pulled-up lines do.
    #[must_use]
    pub fn read(&self, addr: u32) -> u8 {
        self.dev.bus_access(addr).unwrap_or(0xFF)
    }

    /// Perform one read cycle, distinguishing floating lines from data.
    #[must_use]
    pub fn read_bus(&self, addr: u32) -> Option<u8> {
        self.dev.bus_access(addr)
    }

    /// Read a little-endian 32-bit value with four bus cycles.
    #[must_use]
    pub fn read_u32(&self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read(addr + i as u32);
        }
        u32::from_le_bytes(bytes)
    }
}

/// The assembled machine.
pub struct PicoRom {
    dev: Arc<Device>,
}

impl PicoRom {
    /// Bring up a machine with default configuration and a zeroed buffer.
    #[must_use]
    pub fn new(board: BoardConfig) -> Self {
        Self::build(board, None, None)
    }

    /// Bring up a machine from persistent storage: committed image into
    /// the buffer, persisted configuration if its version matches.
    #[must_use]
    pub fn boot(board: BoardConfig, flash: &dyn FlashStore) -> Self {
        Self::build(board, flash.load_config(), flash.load_rom())
    }

    fn build(board: BoardConfig, config: Option<Config>, image: Option<Vec<u8>>) -> Self {
        let (plane, status) = build_decode_plane(&board);
        let config = config
            .filter(|c| c.version == CONFIG_VERSION)
            .unwrap_or_else(|| Config::default_for(&board));
        let addr_mask = config.addr_mask;

        let rom = RomBuffer::new();
        if let Some(image) = &image {
            rom.load_image(image);
        }

        let machine = Self {
            dev: Arc::new(Device {
                responder: Responder::new(board.sampling),
                board,
                pins: BusPins::new(),
                rom,
                plane: Mutex::new(plane),
                comms: CommsChannel::new(),
                session: session::SessionController::new(),
                rom_offset: AtomicU32::new(0),
                config: Mutex::new(config),
                status,
            }),
        };
        machine.set_address_mask(addr_mask);
        machine.rom_service_start();
        machine
    }

    /// A handle for the target side of the bus.
    #[must_use]
    pub fn target_port(&self) -> TargetPort {
        TargetPort {
            dev: Arc::clone(&self.dev),
        }
    }

    /// Boot status word (`STATUS_*` bits).
    #[must_use]
    pub fn status(&self) -> u32 {
        self.dev.status
    }

    #[must_use]
    pub fn board(&self) -> BoardConfig {
        self.dev.board
    }

    /// Snapshot of the current configuration record.
    #[must_use]
    pub fn config(&self) -> Config {
        self.config_lock().clone()
    }

    pub fn set_device_name(&self, name: &str) {
        self.config_lock().name = String::from(name);
    }

    pub fn set_rom_name(&self, name: &str) {
        self.config_lock().rom_name = String::from(name);
    }

    pub fn set_reset_levels(&self, initial: ResetLevel, default: ResetLevel) {
        let mut config = self.config_lock();
        config.initial_reset = initial;
        config.default_reset = default;
    }

    /// Set the served address width.
    ///
    /// The mask is rounded up to a power of two minus one and capped at
    /// what the board can decode; address lines outside it stop being
    /// sampled. Returns the mask actually applied.
    pub fn set_address_mask(&self, mask: u32) -> u32 {
        let capped = mask & self.dev.board.max_addr_mask();
        let mask = if capped == 0 {
            0
        } else {
            ((capped + 1).next_power_of_two() - 1) & self.dev.board.max_addr_mask()
        };
        self.dev.rom.set_mask(mask);
        self.dev.pins.set_address_enable(mask);
        self.config_lock().addr_mask = mask;
        mask
    }

    #[must_use]
    pub fn address_mask(&self) -> u32 {
        self.dev.rom.mask()
    }

    /// Start serving ROM bytes.
    pub fn rom_service_start(&self) {
        self.dev.responder.start();
    }

    /// Stop serving ROM bytes. Returns whether the service was running.
    pub fn rom_service_stop(&self) -> bool {
        self.dev.responder.stop()
    }

    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.dev.responder.is_running()
    }

    /// Poll-and-clear the access flag: true if the bus has been accessed
    /// since the last call.
    pub fn check_access(&self) -> bool {
        let mut plane = self.dev.plane();
        if let Some(reporter) = plane.reporter.as_mut() {
            if reporter.sm.pending() {
                reporter.sm.clear();
                return true;
            }
        }
        false
    }

    /// Direct access to the ROM buffer, for tooling and tests.
    #[must_use]
    pub fn rom(&self) -> &RomBuffer {
        &self.dev.rom
    }

    /// Load an image at the start of the buffer, as from a host upload.
    pub fn load_rom_image(&self, image: &[u8]) {
        self.dev.rom.load_image(image);
    }

    /// Set the transfer pointer for [`Self::write_bytes`] and
    /// [`Self::read_bytes`].
    pub fn set_pointer(&self, offset: u32) {
        self.dev.rom_offset.store(offset, Ordering::Release);
    }

    #[must_use]
    pub fn pointer(&self) -> u32 {
        self.dev.rom_offset.load(Ordering::Acquire)
    }

    /// Write at the transfer pointer and advance it. A write that would
    /// run past the buffer is rejected whole.
    pub fn write_bytes(&self, data: &[u8]) -> Result<(), RomError> {
        let offset = self.pointer();
        if offset as usize + data.len() > ROM_SIZE {
            return Err(RomError::WriteOutOfRange {
                offset,
                len: data.len(),
            });
        }
        self.dev.rom.write_slice(offset, data);
        self.dev
            .rom_offset
            .store(offset + data.len() as u32, Ordering::Release);
        Ok(())
    }

    /// Read at the transfer pointer and advance it. Reads clamp to the
    /// end of the buffer; returns the number of bytes produced.
    pub fn read_bytes(&self, buf: &mut [u8]) -> usize {
        let offset = self.pointer();
        if offset as usize >= ROM_SIZE {
            return 0;
        }
        let len = buf.len().min(ROM_SIZE - offset as usize);
        self.dev.rom.read_slice(offset, &mut buf[..len]);
        self.dev
            .rom_offset
            .store(offset + len as u32, Ordering::Release);
        len
    }

    /// Map a mailbox window and arm the detectors, replacing any active
    /// session. Returns the window base actually used: the requested
    /// address masked to the served width and aligned down to the window
    /// size.
    pub fn comms_start(&self, addr: u32) -> Result<u32, CommsError> {
        let mut plane = self.dev.plane();
        if plane.read_detect.is_none() || plane.write_detect.is_none() {
            return Err(CommsError::DetectorsUnavailable);
        }
        let window = self.dev.mailbox_window();

        // Quiesce the old session (if any) before touching the record.
        if let Some(det) = plane.read_detect.as_mut() {
            det.sm.disable();
        }
        if let Some(det) = plane.write_detect.as_mut() {
            det.sm.disable();
        }
        self.dev.comms.deactivate(&self.dev.rom);

        let base = addr & self.dev.rom.mask() & !(window - 1);
        self.dev.comms.begin(&self.dev.rom, base, window);

        if let Some(det) = plane.read_detect.as_mut() {
            det.sm.program(base + OFFSET_IN_BYTE, !0, window - 1);
            det.sm.set_irq_enabled(true);
        }
        if let Some(det) = plane.write_detect.as_mut() {
            det.sm
                .program(base + OFFSET_OUT_AREA, !(OUT_AREA_LEN - 1), OUT_AREA_LEN - 1);
            det.sm.set_irq_enabled(true);
        }
        if let Some(clock) = plane.clock.as_mut() {
            clock.sm.program(base + OFFSET_TICK_RESET);
        }

        self.dev.comms.activate(&self.dev.rom, base);
        self.dev.session.set_state(SessionState::Active);
        Ok(base)
    }

    /// Tear down the mailbox session. Idempotent.
    pub fn comms_end(&self) {
        let mut plane = self.dev.plane();
        if let Some(det) = plane.read_detect.as_mut() {
            det.sm.disable();
        }
        if let Some(det) = plane.write_detect.as_mut() {
            det.sm.disable();
        }
        if let Some(clock) = plane.clock.as_mut() {
            clock.sm.disable();
        }
        drop(plane);
        self.dev.comms.deactivate(&self.dev.rom);
        self.dev.session.set_state(SessionState::Idle);
    }

    /// Push host bytes toward the target and drain target bytes toward
    /// the sink. See [`CommsChannel::update`] for blocking and timeout
    /// behaviour.
    pub fn comms_update(
        &self,
        data: &[u8],
        timeout: Duration,
        sink: &mut dyn PacketSink,
    ) -> Result<(), UpdateError> {
        self.dev.comms.update(&self.dev.rom, data, timeout, sink)
    }

    /// Window base of the active mailbox session.
    #[must_use]
    pub fn comms_base(&self) -> Option<u32> {
        self.dev.comms.base()
    }

    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.dev.session.state()
    }

    /// Direct access to the mailbox channel's observability counters.
    #[must_use]
    pub fn comms(&self) -> &CommsChannel {
        &self.dev.comms
    }

    /// Suspend real-time activity: stop the responder and mask the
    /// detector interrupts. Dropping the guard restores the prior state
    /// exactly.
    #[must_use]
    pub fn suspend(&self) -> SuspendGuard {
        let was_serving = self.dev.responder.stop();
        let mut plane = self.dev.plane();
        let mut detectors_armed = false;
        if let Some(det) = plane.read_detect.as_mut() {
            detectors_armed |= det.sm.irq_enabled();
            det.sm.set_irq_enabled(false);
        }
        if let Some(det) = plane.write_detect.as_mut() {
            detectors_armed |= det.sm.irq_enabled();
            det.sm.set_irq_enabled(false);
        }
        drop(plane);
        SuspendGuard {
            dev: Arc::clone(&self.dev),
            was_serving,
            detectors_armed,
        }
    }

    /// Persist the buffer and the configuration record, suspending the
    /// real-time layers around the erase+program window.
    pub fn commit(&self, flash: &mut dyn FlashStore) -> Result<(), FlashError> {
        let guard = self.suspend();
        flash.save_rom(&self.dev.rom.snapshot())?;
        flash.save_config(&self.config_lock().clone())?;
        drop(guard);
        Ok(())
    }

    /// Which decode programs are resident, and where.
    #[must_use]
    pub fn program_slots(&self) -> Vec<(&'static str, Slot)> {
        let plane = self.dev.plane();
        let mut slots = Vec::new();
        if let Some(p) = &plane.reporter {
            slots.push(("report", p.slot));
        }
        if let Some(p) = &plane.output {
            slots.push(("output", p.slot));
        }
        if let Some(p) = &plane.oe_seq {
            slots.push(("oe-seq", p.slot));
        }
        if let Some(p) = &plane.read_detect {
            slots.push(("read-detect", p.slot));
        }
        if let Some(p) = &plane.write_detect {
            slots.push(("write-detect", p.slot));
        }
        if let Some(p) = &plane.clock {
            slots.push(("clock", p.slot));
        }
        for slot in &plane.aux_slots {
            slots.push(("aux", *slot));
        }
        slots
    }

    #[must_use]
    pub fn free_decode_units(&self) -> usize {
        self.dev.plane().alloc.free_units()
    }

    fn config_lock(&self) -> MutexGuard<'_, Config> {
        self.dev
            .config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Holds the machine suspended; dropping it resumes what was running.
pub struct SuspendGuard {
    dev: Arc<Device>,
    was_serving: bool,
    detectors_armed: bool,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        if self.detectors_armed {
            let mut plane = self.dev.plane();
            if let Some(det) = plane.read_detect.as_mut() {
                det.sm.set_irq_enabled(true);
            }
            if let Some(det) = plane.write_detect.as_mut() {
                det.sm.set_irq_enabled(true);
            }
        }
        if self.was_serving {
            self.dev.responder.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_board_leaves_the_pool_half_free() {
        let machine = PicoRom::new(BoardConfig::rom_28p());
        assert_eq!(
            machine.status(),
            STATUS_DECODE_INIT | STATUS_COMMS_READY
        );
        // reporter + output in block 0, oe + two detectors in block 1.
        assert_eq!(machine.free_decode_units(), 3);
    }

    #[test]
    fn expander_and_clock_compete_for_block_one() {
        let board = BoardConfig::rom_32p_tca().with_clock_counting(true);
        let machine = PicoRom::new(board);
        // Block 1 holds oe + detectors + expander driver; nothing is left
        // for the clock counter.
        assert_eq!(machine.status() & STATUS_CLOCK_READY, 0);
        assert_ne!(machine.status() & STATUS_COMMS_READY, 0);

        let board = BoardConfig::rom_28p().with_clock_counting(true);
        let machine = PicoRom::new(board);
        assert_ne!(machine.status() & STATUS_CLOCK_READY, 0);
    }

    #[test]
    fn address_mask_rounds_up_and_caps() {
        let machine = PicoRom::new(BoardConfig::rom_28p());
        assert_eq!(machine.set_address_mask(0x2ABC), 0x3FFF);
        assert_eq!(machine.address_mask(), 0x3FFF);
        assert_eq!(machine.set_address_mask(u32::MAX), ADDR_MASK);
        assert_eq!(machine.config().addr_mask, ADDR_MASK);
    }

    #[test]
    fn pointer_writes_advance_and_bound_check() {
        let machine = PicoRom::new(BoardConfig::rom_28p());
        machine.set_pointer(0x100);
        machine.write_bytes(&[1, 2, 3]).expect("in range");
        assert_eq!(machine.pointer(), 0x103);

        machine.set_pointer(ROM_SIZE as u32 - 2);
        assert_eq!(
            machine.write_bytes(&[0; 4]),
            Err(RomError::WriteOutOfRange {
                offset: ROM_SIZE as u32 - 2,
                len: 4,
            })
        );
        // A rejected write moves nothing.
        assert_eq!(machine.pointer(), ROM_SIZE as u32 - 2);

        machine.set_pointer(0x100);
        let mut back = [0u8; 3];
        assert_eq!(machine.read_bytes(&mut back), 3);
        assert_eq!(back, [1, 2, 3]);
    }

    #[test]
    fn served_bytes_follow_the_bus_address() {
        let machine = PicoRom::new(BoardConfig::rom_28p());
        machine.set_pointer(0);
        machine.write_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]).expect("in range");
        let port = machine.target_port();
        assert_eq!(port.read(0), 0xDE);
        assert_eq!(port.read(3), 0xEF);
        assert!(machine.check_access());
        assert!(!machine.check_access());
    }
}
