//! # snddma-audio
//!
//! Presents a classic DMA ring buffer to a software mixer on top of a
//! pull-based host audio stream.
//!
//! Features:
//! - Fixed-size byte ring buffer shared lock-free between mixer and host
//! - Pull bridge callback with wraparound copies and cursor bookkeeping
//! - Session lifecycle with format negotiation and graceful fallback
//! - Optional voice capture path
//! - cpal host backend, plus an in-process mock for tests

pub mod backend;
pub mod bridge;
pub mod buffer;
pub mod capture;
pub mod mock;
pub mod output;
pub mod session;

pub use backend::{CaptureStream, PlaybackStream, PullCallback, PullSource, StreamEvent, StreamSink};
pub use bridge::PullBridge;
pub use buffer::DmaBuffer;
pub use capture::CaptureBridge;
pub use output::CpalSource;
pub use session::DmaSession;
