//! Voice capture path.
//!
//! Much simpler than playback: the caller drains every request in full, so
//! there is no ring arithmetic here. When no capture device is open every
//! read yields silence.

use crate::CaptureStream;
use snddma_core::config::CAPTURE_FORMAT;
use snddma_core::Result;
use tracing::debug;

/// Bytes per captured (mono16) sample.
const CAPTURE_SAMPLE_BYTES: usize = CAPTURE_FORMAT.frame_size();

/// Optional capture stream plus the zero-fill policy.
#[derive(Default)]
pub struct CaptureBridge {
    stream: Option<Box<dyn CaptureStream>>,
}

impl CaptureBridge {
    /// Bridge with no capture device.
    pub const fn absent() -> Self {
        Self { stream: None }
    }

    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Start delivering samples. No-op without a device.
    pub fn start(&mut self) -> Result<()> {
        match &mut self.stream {
            Some(stream) => stream.resume(),
            None => Ok(()),
        }
    }

    /// Stop delivering samples. No-op without a device.
    pub fn stop(&mut self) -> Result<()> {
        match &mut self.stream {
            Some(stream) => stream.pause(),
            None => Ok(()),
        }
    }

    /// Captured samples ready to read.
    pub fn available_samples(&self) -> usize {
        self.stream
            .as_ref()
            .map_or(0, |stream| stream.available_bytes() / CAPTURE_SAMPLE_BYTES)
    }

    /// Fill `data` with up to `samples` mono16 samples.
    ///
    /// Whatever the device could not supply is zeroed, as is the whole
    /// request when there is no device. Returns the bytes filled from the
    /// device.
    pub fn capture(&mut self, samples: usize, data: &mut [u8]) -> usize {
        let wanted = samples.saturating_mul(CAPTURE_SAMPLE_BYTES).min(data.len());
        let out = &mut data[..wanted];

        let filled = match &mut self.stream {
            Some(stream) => stream.read(out),
            None => 0,
        };
        out[filled..].fill(0);
        filled
    }

    /// Close the capture stream.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Capture stream closed");
        }
    }
}
