//! Interface to the host-facing packet transport.
//!
//! The USB transport and packet framing are external collaborators; the
//! core only needs somewhere to forward outbound mailbox bytes as they
//! accumulate during `update`.

/// Largest payload the packet layer carries in one packet. Outbound
/// mailbox bytes are forwarded in chunks of this size.
pub const MAX_PKT_PAYLOAD: usize = 30;

/// Consumer of drained outbound mailbox bytes.
///
/// `update` calls this with non-empty chunks of at most
/// [`MAX_PKT_PAYLOAD`] bytes, in arrival order.
pub trait PacketSink {
    fn comms_data(&mut self, bytes: &[u8]);
}

/// Sink that concatenates everything it receives. Handy for tests and for
/// callers that do their own framing.
#[derive(Debug, Default)]
pub struct VecSink {
    pub bytes: Vec<u8>,
    pub chunks: usize,
}

impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PacketSink for VecSink {
    fn comms_data(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
        self.chunks += 1;
    }
}
