//! Lock-free ring buffer for captured voice samples.
//!
//! This buffer is designed for single-producer, single-consumer scenarios
//! where the host capture callback writes samples and the session drains them.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicI16, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free single-producer, single-consumer ring buffer of 16-bit samples.
///
/// Designed for real-time audio where allocations in the hot path are forbidden.
/// Slots are relaxed atomics; the positions carry the acquire/release ordering.
pub struct RingBuffer {
    /// The underlying buffer storage.
    buffer: Box<[AtomicI16]>,
    /// Current read position.
    read_pos: AtomicUsize,
    /// Current write position.
    write_pos: AtomicUsize,
    /// Buffer capacity (power of 2 for efficient modulo).
    capacity: usize,
    /// Mask for efficient modulo (capacity - 1).
    mask: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity.
    ///
    /// The capacity will be rounded up to the next power of 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let buffer = (0..capacity).map(|_| AtomicI16::new(0)).collect();

        Self {
            buffer,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        }
    }

    /// Get the number of samples available for reading.
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Write samples to the buffer.
    ///
    /// Returns the number of samples actually written; the rest is dropped.
    /// Called from the producer thread only.
    pub fn write(&self, samples: &[i16]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let available_space = self.capacity - write_pos.wrapping_sub(read_pos);
        let to_write = samples.len().min(available_space);

        for (offset, &sample) in samples[..to_write].iter().enumerate() {
            let idx = write_pos.wrapping_add(offset) & self.mask;
            self.buffer[idx].store(sample, Ordering::Relaxed);
        }

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);

        to_write
    }

    /// Read samples from the buffer.
    ///
    /// Returns the number of samples actually read.
    /// Called from the consumer thread only.
    pub fn read(&self, output: &mut [i16]) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let available = write_pos.wrapping_sub(read_pos);
        let to_read = output.len().min(available);

        for (offset, slot) in output[..to_read].iter_mut().enumerate() {
            let idx = read_pos.wrapping_add(offset) & self.mask;
            *slot = self.buffer[idx].load(Ordering::Relaxed);
        }

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);

        to_read
    }
}

/// Thread-safe reference to a ring buffer.
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer.
pub fn shared_ring_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}
