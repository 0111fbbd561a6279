//! Capabilities the host audio runtime provides to the bridge.
//!
//! A [`PullSource`] opens streams. Playback streams pull bytes through a
//! [`PullCallback`] registered at open time; closing a stream is dropping it.

use crossbeam_channel::Sender;
use snddma_core::{DeviceFormat, Result, StreamFormat, StreamRequest};

/// Destination for the bytes produced during one callback invocation.
pub trait StreamSink {
    /// Append bytes to the host stream. Slices are always sample aligned.
    fn put(&mut self, bytes: &[u8]);
}

impl StreamSink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Callback the host invokes with the number of bytes it wants.
///
/// May run on a host-owned audio thread. Implementations must not block,
/// allocate, or perform I/O.
pub type PullCallback = Box<dyn FnMut(usize, &mut dyn StreamSink) + Send + 'static>;

/// Asynchronous notifications raised by the host on its own threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The playback stream reported an error.
    PlaybackError(String),
    /// The capture stream reported an error.
    CaptureError(String),
}

/// An open playback stream. Dropping it closes the stream, after which the
/// registered callback is never invoked again.
pub trait PlaybackStream {
    /// Format and chunk size actually granted by the device.
    fn device_format(&self) -> Result<DeviceFormat>;

    fn resume(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Host-side output gain, 1.0 being unity.
    fn set_gain(&self, gain: f32);
}

/// An open capture stream delivering bytes in the requested format.
pub trait CaptureStream {
    fn resume(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Bytes ready to be read.
    fn available_bytes(&self) -> usize;

    /// Read up to `out.len()` bytes, returning how many were written.
    fn read(&mut self, out: &mut [u8]) -> usize;
}

/// The host audio runtime.
pub trait PullSource {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Open a paused playback stream that pulls through `callback`.
    ///
    /// Failures are reported as [`snddma_core::Error::Initialization`].
    fn open_playback(
        &mut self,
        request: &StreamRequest,
        callback: PullCallback,
        events: Sender<StreamEvent>,
    ) -> Result<Box<dyn PlaybackStream>>;

    /// Open a paused capture stream in exactly `format`.
    fn open_capture(
        &mut self,
        format: &StreamFormat,
        events: Sender<StreamEvent>,
    ) -> Result<Box<dyn CaptureStream>>;
}
