//! Mailbox channel: a flow-controlled byte stream multiplexed onto bus
//! reads inside the mailbox window.
//!
//! Two hardware detectors feed this driver. The write detector matches the
//! outbound area (`base + 256 + b` encodes byte `b` on the address lines);
//! the read detector matches the inbound byte field at `base + 12`. Their
//! events arrive on the interrupt path ([`CommsChannel::on_outbound_match`]
//! and [`CommsChannel::on_inbound_consumed`]), while the control plane
//! calls [`CommsChannel::update`].
//!
//! Flow control never stalls the bus. Outbound, the target treats an
//! outbound-sequence increment as the acknowledgment for its last byte; on
//! a full queue the increment is deferred and replayed once the control
//! plane drains, so a well-behaved target throttles itself. Inbound, the
//! `pending` flag and inbound-sequence counter tell the target when a new
//! byte is waiting.
//!
//! Single-writer discipline (what makes this safe without locks):
//!
//! | Field / counter                  | Writer                   |
//! |----------------------------------|--------------------------|
//! | `pending = 1`, inbound byte/seq  | control plane (`update`) |
//! | `pending = 0` on empty           | inbound irq path         |
//! | inbound byte/seq on next-byte    | inbound irq path         |
//! | outbound seq (immediate)         | outbound irq path        |
//! | outbound seq (deferred replay)   | control plane (`update`) |
//! | `out_deferred_req`, `in_empty_req` | irq paths              |
//! | `out_deferred_ack`, `in_empty_ack` | control plane          |
//!
//! The inbound byte/seq pair has two writers on paper, but the
//! empty-request/empty-acknowledge handshake ensures `update` only writes
//! them while the queue was empty, when the irq path has nothing to say.
//! Sequence increments are byte-wide atomic adds, so the deferred replay
//! and the irq path can never lose a count between them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::fifo::ByteFifo;
use crate::link::{MAX_PKT_PAYLOAD, PacketSink};
use crate::mailbox::Mailbox;
use crate::rom::RomBuffer;

/// Capacity of each direction's queue.
pub const COMMS_FIFO_DEPTH: usize = 32;

/// Sentinel for "no active session" in the base-offset register.
const NO_SESSION: u32 = u32::MAX;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    /// The deadline passed before every byte was accepted. Bytes already
    /// queued stay queued; the caller may retry with the remainder.
    #[error("timed out before all bytes were accepted")]
    Timeout,
}

/// Control-plane driver for the mailbox channel.
pub struct CommsChannel {
    out_fifo: ByteFifo<COMMS_FIFO_DEPTH>,
    in_fifo: ByteFifo<COMMS_FIFO_DEPTH>,
    /// Outbound-sequence increments owed to the target (queue was full).
    out_deferred_req: AtomicU32,
    out_deferred_ack: AtomicU32,
    /// Inbound-queue-went-empty events; `update` rearms the mailbox's
    /// inbound byte on the next push after each one.
    in_empty_req: AtomicU32,
    in_empty_ack: AtomicU32,
    /// Window base of the active session, or `NO_SESSION`.
    base: AtomicU32,
}

impl CommsChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            out_fifo: ByteFifo::new(),
            in_fifo: ByteFifo::new(),
            out_deferred_req: AtomicU32::new(0),
            out_deferred_ack: AtomicU32::new(0),
            in_empty_req: AtomicU32::new(0),
            in_empty_ack: AtomicU32::new(0),
            base: AtomicU32::new(NO_SESSION),
        }
    }

    /// Window base of the active session.
    #[must_use]
    pub fn base(&self) -> Option<u32> {
        match self.base.load(Ordering::Acquire) {
            NO_SESSION => None,
            base => Some(base),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.base().is_some()
    }

    /// Reset queues and handshake counters and zero-initialise the record
    /// at `base`. Only valid while the detectors are disabled.
    pub(crate) fn begin(&self, rom: &RomBuffer, base: u32, window: u32) {
        self.out_fifo.clear();
        self.in_fifo.clear();
        self.out_deferred_req.store(0, Ordering::Release);
        self.out_deferred_ack.store(0, Ordering::Release);
        // One empty-event outstanding: the first push must arm the
        // mailbox's inbound byte itself.
        self.in_empty_req.store(1, Ordering::Release);
        self.in_empty_ack.store(0, Ordering::Release);
        Mailbox::new(rom, base).initialise(window);
    }

    /// Publish the session: record the base and raise `active`.
    pub(crate) fn activate(&self, rom: &RomBuffer, base: u32) {
        self.base.store(base, Ordering::Release);
        Mailbox::new(rom, base).set_active(true);
    }

    /// Tear the session down. Idempotent; returns whether one was active.
    pub(crate) fn deactivate(&self, rom: &RomBuffer) -> bool {
        let Some(base) = self.base() else {
            return false;
        };
        Mailbox::new(rom, base).set_active(false);
        self.base.store(NO_SESSION, Ordering::Release);
        true
    }

    /// Interrupt path: the target pushed a byte through the outbound area.
    ///
    /// The acknowledgment (outbound-sequence increment) is immediate while
    /// the queue has headroom, deferred otherwise; the target is never
    /// stalled, it simply waits for the acknowledgment before pushing more.
    pub(crate) fn on_outbound_match(&self, rom: &RomBuffer, byte: u8) {
        let Some(base) = self.base() else {
            return;
        };
        let mailbox = Mailbox::new(rom, base);
        if self.out_fifo.push(byte) {
            if self.out_fifo.is_full() {
                self.out_deferred_req.fetch_add(1, Ordering::AcqRel);
            } else {
                mailbox.bump_out_seq();
            }
        } else {
            // Queue overrun (target pushed past an unacknowledged byte).
            // The acknowledgment is still owed, or the channel would jam.
            self.out_deferred_req.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Interrupt path: the target consumed the inbound mailbox byte.
    pub(crate) fn on_inbound_consumed(&self, rom: &RomBuffer) {
        let Some(base) = self.base() else {
            return;
        };
        let mailbox = Mailbox::new(rom, base);
        let _ = self.in_fifo.pop();
        if let Some(next) = self.in_fifo.peek() {
            mailbox.set_in_byte(next);
            mailbox.bump_in_seq();
        } else {
            self.in_empty_req.fetch_add(1, Ordering::AcqRel);
            mailbox.set_pending(false);
        }
    }

    /// Replay deferred acknowledgments and drain the outbound queue,
    /// forwarding full chunks to the sink.
    fn drain_outbound(&self, rom: &RomBuffer, chunk: &mut Vec<u8>, sink: &mut dyn PacketSink) {
        if let Some(base) = self.base() {
            let mailbox = Mailbox::new(rom, base);
            while self.out_deferred_ack.load(Ordering::Acquire)
                != self.out_deferred_req.load(Ordering::Acquire)
            {
                mailbox.bump_out_seq();
                self.out_deferred_ack.fetch_add(1, Ordering::AcqRel);
            }
        }
        while let Some(byte) = self.out_fifo.pop() {
            chunk.push(byte);
            if chunk.len() == MAX_PKT_PAYLOAD {
                sink.comms_data(chunk);
                chunk.clear();
            }
        }
    }

    /// Push host bytes into the inbound queue and drain the outbound one.
    ///
    /// Blocks (from the control plane's point of view) only while the
    /// inbound queue is full, re-draining the outbound queue meanwhile,
    /// until `timeout` elapses. On timeout the bytes already accepted stay
    /// queued. A call with no active session is a successful no-op.
    pub fn update(
        &self,
        rom: &RomBuffer,
        data: &[u8],
        timeout: Duration,
        sink: &mut dyn PacketSink,
    ) -> Result<(), UpdateError> {
        if !self.is_active() {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        let mut chunk = Vec::with_capacity(MAX_PKT_PAYLOAD);

        self.drain_outbound(rom, &mut chunk, sink);

        for &byte in data {
            if let Some(base) = self.base() {
                Mailbox::new(rom, base).set_pending(true);
            }
            while self.in_fifo.is_full() {
                self.drain_outbound(rom, &mut chunk, sink);
                if Instant::now() >= deadline {
                    if !chunk.is_empty() {
                        sink.comms_data(&chunk);
                    }
                    return Err(UpdateError::Timeout);
                }
                std::thread::yield_now();
            }
            let accepted = self.in_fifo.push(byte);
            debug_assert!(accepted, "queue cannot fill between check and push");

            if self.in_empty_ack.load(Ordering::Acquire) != self.in_empty_req.load(Ordering::Acquire)
            {
                if let Some(base) = self.base() {
                    let mailbox = Mailbox::new(rom, base);
                    if let Some(front) = self.in_fifo.peek() {
                        mailbox.set_in_byte(front);
                        mailbox.bump_in_seq();
                    }
                }
                self.in_empty_ack.fetch_add(1, Ordering::AcqRel);
            }
        }

        self.drain_outbound(rom, &mut chunk, sink);
        if !chunk.is_empty() {
            sink.comms_data(&chunk);
        }
        Ok(())
    }

    /// Mirror the clock counter into the mailbox's tick field.
    pub(crate) fn mirror_tick(&self, rom: &RomBuffer, ticks: u32) {
        if let Some(base) = self.base() {
            Mailbox::new(rom, base).set_tick_count(ticks);
        }
    }

    /// Bytes waiting in the outbound queue.
    #[must_use]
    pub fn outbound_count(&self) -> u32 {
        self.out_fifo.count()
    }

    /// Bytes waiting in the inbound queue.
    #[must_use]
    pub fn inbound_count(&self) -> u32 {
        self.in_fifo.count()
    }

    /// Acknowledgments currently deferred by a full outbound queue.
    #[must_use]
    pub fn deferred_count(&self) -> u32 {
        self.out_deferred_req
            .load(Ordering::Acquire)
            .wrapping_sub(self.out_deferred_ack.load(Ordering::Acquire))
    }
}

impl Default for CommsChannel {
    fn default() -> Self {
        Self::new()
    }
}
