//! Lock-free single-producer/single-consumer byte queue.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Fixed-capacity ring buffer with monotonically increasing head/tail
/// counters (`count = head - tail`, wrapping subtraction).
///
/// Safe without locks under a strict role split: exactly one context ever
/// advances `head` (the producer) and exactly one ever advances `tail`
/// (the consumer). The producer stores the byte before publishing `head`
/// with `Release`; the consumer's `Acquire` load of `head` then guarantees
/// it sees the byte. The counters never run backwards.
pub struct ByteFifo<const N: usize> {
    head: AtomicU32,
    tail: AtomicU32,
    data: [AtomicU8; N],
}

impl<const N: usize> ByteFifo<N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            data: [const { AtomicU8::new(0) }; N],
        }
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count() as usize >= N
    }

    /// Push a byte (producer side). Returns `false` on a full queue.
    pub fn push(&self, value: u8) -> bool {
        if self.is_full() {
            return false;
        }
        let head = self.head.load(Ordering::Relaxed);
        self.data[head as usize % N].store(value, Ordering::Relaxed);
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Pop the front byte (consumer side).
    pub fn pop(&self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let tail = self.tail.load(Ordering::Relaxed);
        let value = self.data[tail as usize % N].load(Ordering::Relaxed);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Read the front byte without consuming it (consumer side).
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let tail = self.tail.load(Ordering::Relaxed);
        Some(self.data[tail as usize % N].load(Ordering::Relaxed))
    }

    /// Discard everything queued. Only valid while the producer side is
    /// quiescent (detectors disabled during session setup/teardown).
    pub fn clear(&self) {
        self.tail
            .store(self.head.load(Ordering::Acquire), Ordering::Release);
    }
}

impl<const N: usize> Default for ByteFifo<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_preserves_order() {
        let fifo: ByteFifo<8> = ByteFifo::new();
        for b in 1..=5u8 {
            assert!(fifo.push(b));
        }
        for b in 1..=5u8 {
            assert_eq!(fifo.pop(), Some(b));
        }
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn push_fails_on_full_without_corruption() {
        let fifo: ByteFifo<4> = ByteFifo::new();
        for b in 0..4u8 {
            assert!(fifo.push(b));
        }
        assert!(fifo.is_full());
        assert!(!fifo.push(0xFF));
        assert_eq!(fifo.count(), 4);
        assert_eq!(fifo.pop(), Some(0));
    }

    #[test]
    fn counters_survive_wrapping_past_capacity() {
        let fifo: ByteFifo<4> = ByteFifo::new();
        for round in 0..100u32 {
            assert!(fifo.push(round as u8));
            assert_eq!(fifo.pop(), Some(round as u8));
        }
        assert!(fifo.is_empty());
    }

    #[test]
    fn peek_does_not_consume() {
        let fifo: ByteFifo<4> = ByteFifo::new();
        fifo.push(0x42);
        assert_eq!(fifo.peek(), Some(0x42));
        assert_eq!(fifo.count(), 1);
        assert_eq!(fifo.pop(), Some(0x42));
    }

    #[test]
    fn clear_empties_the_queue() {
        let fifo: ByteFifo<4> = ByteFifo::new();
        fifo.push(1);
        fifo.push(2);
        fifo.clear();
        assert!(fifo.is_empty());
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn concurrent_producer_and_consumer_lose_nothing() {
        use std::sync::Arc;

        let fifo: Arc<ByteFifo<8>> = Arc::new(ByteFifo::new());
        let producer = {
            let fifo = Arc::clone(&fifo);
            std::thread::spawn(move || {
                for b in 0..=255u8 {
                    while !fifo.push(b) {
                        std::thread::yield_now();
                    }
                }
            })
        };
        let mut seen = Vec::new();
        while seen.len() < 256 {
            if let Some(b) = fifo.pop() {
                seen.push(b);
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().expect("producer thread");
        let expected: Vec<u8> = (0..=255u8).collect();
        assert_eq!(seen, expected);
    }
}
