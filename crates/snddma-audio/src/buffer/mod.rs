//! Lock-free buffer implementations for real-time audio.

pub mod dma;
pub mod ring;

pub use dma::DmaBuffer;
pub use ring::{shared_ring_buffer, RingBuffer, SharedRingBuffer};
