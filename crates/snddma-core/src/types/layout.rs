//! DMA buffer layout and sizing policy.

use crate::{Error, Result, StreamFormat};

/// Callback periods held by an automatically sized buffer.
///
/// The mixer refills the buffer roughly once per engine frame; ten host chunks
/// keeps the read cursor from lapping the refill.
pub const CHUNKS_PER_BUFFER: usize = 10;

/// Round `samples` down to a whole number of frames.
pub const fn align_to_frames(samples: usize, channels: usize) -> usize {
    samples - samples % channels
}

/// Geometry of the DMA ring buffer, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaLayout {
    pub sample_bits: u16,
    pub is_float: bool,
    pub channels: u16,
    /// Total scalar samples across all channels.
    pub samples: usize,
    /// Total frames (`samples / channels`).
    pub full_samples: usize,
    /// Granularity the mixer must respect when submitting. Always 1 here.
    pub submission_chunk: usize,
    /// Sample rate in Hz.
    pub speed: u32,
}

impl DmaLayout {
    /// Size the buffer for a granted device format.
    ///
    /// `mix_samples` overrides the automatic size of
    /// `chunk_frames * channels * CHUNKS_PER_BUFFER`. Either way the count is
    /// rounded down to a multiple of `channels`.
    pub fn plan(format: &StreamFormat, chunk_frames: u32, mix_samples: Option<usize>) -> Result<Self> {
        if format.channels == 0 {
            return Err(Error::Config("device granted zero channels".to_string()));
        }
        if format.sample_bits == 0 || format.sample_bits % 8 != 0 {
            return Err(Error::Config(format!(
                "unsupported sample size of {} bits",
                format.sample_bits
            )));
        }

        let channels = usize::from(format.channels);
        let requested = mix_samples
            .filter(|&samples| samples > 0)
            .unwrap_or(chunk_frames as usize * channels * CHUNKS_PER_BUFFER);
        let samples = align_to_frames(requested, channels);

        if samples == 0 {
            return Err(Error::Initialization(format!(
                "DMA buffer of {requested} samples holds no whole {channels}-channel frame"
            )));
        }

        Ok(Self {
            sample_bits: format.sample_bits,
            is_float: format.is_float,
            channels: format.channels,
            samples,
            full_samples: samples / channels,
            submission_chunk: 1,
            speed: format.sample_rate,
        })
    }

    pub const fn bytes_per_sample(&self) -> usize {
        (self.sample_bits / 8) as usize
    }

    pub const fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Length of the byte buffer (`dmasize`).
    pub const fn size_bytes(&self) -> usize {
        self.samples * self.bytes_per_sample()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_auto_size_from_chunk() {
        let format = StreamFormat::pcm(44_100, 2, 16);
        let layout = DmaLayout::plan(&format, 512, None).unwrap();

        assert_eq!(layout.samples, 10_240);
        assert_eq!(layout.full_samples, 5120);
        assert_eq!(layout.size_bytes(), 20_480);
        assert_eq!(layout.frame_size(), 4);
        assert_eq!(layout.speed, 44_100);
        assert_eq!(layout.submission_chunk, 1);
    }

    #[test]
    fn test_override_rounds_down_to_frames() {
        let format = StreamFormat::pcm(48_000, 6, 16);
        let layout = DmaLayout::plan(&format, 512, Some(32_771)).unwrap();

        assert_eq!(layout.samples, 32_766);
        assert_eq!(layout.samples % 6, 0);
        assert_eq!(layout.size_bytes(), 65_532);
    }

    #[test]
    fn test_zero_override_means_auto() {
        let format = StreamFormat::pcm(22_050, 1, 8);
        let layout = DmaLayout::plan(&format, 100, Some(0)).unwrap();
        assert_eq!(layout.samples, 1000);
        assert_eq!(layout.size_bytes(), 1000);
    }

    #[test]
    fn test_rejects_degenerate_formats() {
        let no_channels = StreamFormat::pcm(44_100, 0, 16);
        assert!(matches!(
            DmaLayout::plan(&no_channels, 512, None),
            Err(Error::Config(_))
        ));

        let odd_bits = StreamFormat::pcm(44_100, 2, 12);
        assert!(matches!(
            DmaLayout::plan(&odd_bits, 512, None),
            Err(Error::Config(_))
        ));

        let stereo = StreamFormat::pcm(44_100, 2, 16);
        assert!(matches!(
            DmaLayout::plan(&stereo, 512, Some(1)),
            Err(Error::Initialization(_))
        ));
        assert!(matches!(
            DmaLayout::plan(&stereo, 0, None),
            Err(Error::Initialization(_))
        ));
    }

    proptest! {
        #[test]
        fn sizing_is_frame_aligned(samples in 1usize..1_000_000, channels in 1u16..=8) {
            let format = StreamFormat::pcm(44_100, channels, 16);
            if let Ok(layout) = DmaLayout::plan(&format, 512, Some(samples)) {
                prop_assert_eq!(layout.samples % usize::from(channels), 0);
                prop_assert!(layout.samples <= samples);
                prop_assert_eq!(layout.size_bytes(), layout.samples * 2);
                prop_assert_eq!(layout.full_samples * usize::from(channels), layout.samples);
            } else {
                prop_assert!(samples < usize::from(channels));
            }
        }
    }
}
