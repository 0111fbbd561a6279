//! Core domain types for snddma.

pub mod format;
pub mod layout;

pub use format::{
    DeviceFormat, NegotiatedFormat, StreamFormat, StreamRequest, DEFAULT_CHUNK_FRAMES,
    DEFAULT_SAMPLE_RATE,
};
pub use layout::{align_to_frames, DmaLayout, CHUNKS_PER_BUFFER};
