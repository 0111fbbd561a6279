//! Stream format types exchanged with the host audio runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample rate requested when the caller leaves the rate to the device and the
/// device cannot tell us what it picked.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Chunk size assumed when the host cannot report its callback period.
pub const DEFAULT_CHUNK_FRAMES: u32 = 1024;

/// PCM layout of a stream.
///
/// 8-bit samples are unsigned, 16-bit samples are signed little-endian,
/// 32-bit float samples are little-endian IEEE.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per channel sample.
    pub sample_bits: u16,
    /// Whether samples are floating point.
    pub is_float: bool,
}

impl StreamFormat {
    /// Integer PCM format.
    pub const fn pcm(sample_rate: u32, channels: u16, sample_bits: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sample_bits,
            is_float: false,
        }
    }

    /// Bytes occupied by one channel sample.
    pub const fn bytes_per_sample(&self) -> usize {
        (self.sample_bits / 8) as usize
    }

    /// Bytes occupied by one frame (one sample for every channel).
    pub const fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Short encoding name, e.g. `S16LE`.
    pub const fn encoding_name(&self) -> &'static str {
        match (self.sample_bits, self.is_float) {
            (8, false) => "U8",
            (16, false) => "S16LE",
            (32, true) => "F32LE",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} Hz, {} ch",
            self.encoding_name(),
            self.sample_rate,
            self.channels
        )
    }
}

/// What we ask the host for when opening a playback stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    /// Explicit rate, or `None` for the device default.
    pub sample_rate: Option<u32>,
    pub channels: u16,
    pub sample_bits: u16,
    /// Preferred callback period in frames, or `None` for the device default.
    pub chunk_frames: Option<u32>,
}

impl StreamRequest {
    /// The format assumed when the host opened a stream but cannot report
    /// what it actually granted.
    pub const fn fallback_format(&self) -> StreamFormat {
        let sample_rate = match self.sample_rate {
            Some(rate) => rate,
            None => DEFAULT_SAMPLE_RATE,
        };
        StreamFormat::pcm(sample_rate, self.channels, self.sample_bits)
    }

    /// Fallback format together with the default chunk size.
    pub const fn fallback_device_format(&self) -> DeviceFormat {
        DeviceFormat {
            format: self.fallback_format(),
            chunk_frames: match self.chunk_frames {
                Some(frames) if frames > 0 => frames,
                _ => DEFAULT_CHUNK_FRAMES,
            },
        }
    }
}

/// Format actually in effect on an open stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceFormat {
    pub format: StreamFormat,
    /// Frames the host asks for per callback invocation.
    pub chunk_frames: u32,
}

impl DeviceFormat {
    /// Known stream format whose callback period may not be reported.
    ///
    /// An unreported period is taken as [`DEFAULT_CHUNK_FRAMES`]; the rate and
    /// channel count stay those of the stream.
    pub const fn with_chunk(format: StreamFormat, chunk_frames: Option<u32>) -> Self {
        let chunk_frames = match chunk_frames {
            Some(frames) => frames,
            None => DEFAULT_CHUNK_FRAMES,
        };
        Self {
            format,
            chunk_frames,
        }
    }
}

/// Outcome of format negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedFormat {
    /// The host reported the granted format.
    Queried(DeviceFormat),
    /// The host could not report it; the requested format is assumed.
    Fallback(DeviceFormat),
}

impl NegotiatedFormat {
    pub const fn device_format(&self) -> &DeviceFormat {
        match self {
            Self::Queried(format) | Self::Fallback(format) => format,
        }
    }

    pub const fn format(&self) -> &StreamFormat {
        &self.device_format().format
    }

    pub const fn chunk_frames(&self) -> u32 {
        self.device_format().chunk_frames
    }

    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(StreamFormat::pcm(44_100, 2, 16).frame_size(), 4);
        assert_eq!(StreamFormat::pcm(22_050, 1, 8).frame_size(), 1);
        assert_eq!(StreamFormat::pcm(48_000, 1, 16).bytes_per_sample(), 2);
    }

    #[test]
    fn test_display() {
        let format = StreamFormat::pcm(44_100, 2, 16);
        assert_eq!(format.to_string(), "S16LE 44100 Hz, 2 ch");
        assert_eq!(StreamFormat::pcm(8000, 1, 8).encoding_name(), "U8");
        assert_eq!(StreamFormat::pcm(8000, 1, 24).encoding_name(), "UNKNOWN");
    }

    #[test]
    fn test_fallback_uses_defaults() {
        let request = StreamRequest {
            sample_rate: None,
            channels: 2,
            sample_bits: 16,
            chunk_frames: None,
        };
        let fallback = request.fallback_device_format();
        assert_eq!(fallback.format.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(fallback.chunk_frames, DEFAULT_CHUNK_FRAMES);

        let request = StreamRequest {
            sample_rate: Some(22_050),
            chunk_frames: Some(256),
            ..request
        };
        let fallback = request.fallback_device_format();
        assert_eq!(fallback.format, StreamFormat::pcm(22_050, 2, 16));
        assert_eq!(fallback.chunk_frames, 256);
    }

    #[test]
    fn test_unreported_chunk_keeps_stream_format() {
        let format = StreamFormat::pcm(48_000, 6, 16);

        let device = DeviceFormat::with_chunk(format, None);
        assert_eq!(device.format, format);
        assert_eq!(device.chunk_frames, DEFAULT_CHUNK_FRAMES);

        assert_eq!(DeviceFormat::with_chunk(format, Some(480)).chunk_frames, 480);
    }

    #[test]
    fn test_negotiated_paths_are_distinguishable() {
        let device = DeviceFormat {
            format: StreamFormat::pcm(48_000, 2, 16),
            chunk_frames: 512,
        };
        let queried = NegotiatedFormat::Queried(device);
        let fallback = NegotiatedFormat::Fallback(device);

        assert!(!queried.is_fallback());
        assert!(fallback.is_fallback());
        assert_ne!(queried, fallback);
        assert_eq!(queried.chunk_frames(), 512);
        assert_eq!(fallback.format().sample_rate, 48_000);
    }
}
