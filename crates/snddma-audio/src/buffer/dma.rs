//! The DMA ring buffer shared between the mixer and the pull bridge.
//!
//! The mixer owns the byte contents and the pull bridge owns the cursor. Each
//! field has exactly one writer, so no locking is needed; every access is a
//! relaxed atomic and a stale cursor read only shifts where the mixer paints.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::StreamSink;
use snddma_core::{DmaLayout, Error, Result};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Bytes staged per `StreamSink::put` call when streaming out of the buffer.
/// A multiple of every supported sample size.
const STAGING_BYTES: usize = 512;

/// Fixed-length byte ring buffer plus the playback cursor.
pub struct DmaBuffer {
    bytes: Box<[AtomicU8]>,
    /// Read position in frames, always below `layout.full_samples`.
    cursor: AtomicUsize,
    layout: DmaLayout,
}

impl DmaBuffer {
    /// Allocate a zero-filled buffer for `layout`.
    pub fn new(layout: DmaLayout) -> Result<Self> {
        let size = layout.size_bytes();

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| Error::Allocation { bytes: size })?;
        bytes.resize_with(size, || AtomicU8::new(0));

        Ok(Self {
            bytes: bytes.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
            layout,
        })
    }

    pub const fn layout(&self) -> &DmaLayout {
        &self.layout
    }

    /// Length in bytes (`dmasize`).
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub const fn frame_size(&self) -> usize {
        self.layout.frame_size()
    }

    /// Frames the buffer holds (`fullsamples`).
    pub const fn frame_count(&self) -> usize {
        self.layout.full_samples
    }

    /// Current playback position in frames. May be momentarily stale.
    pub fn cursor_frames(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    pub(crate) fn set_cursor_frames(&self, frames: usize) {
        self.cursor.store(frames, Ordering::Relaxed);
    }

    /// Copy `data` in starting at `offset` bytes, wrapping at the end.
    ///
    /// Writes are not checked against the cursor.
    pub fn write(&self, offset: usize, data: &[u8]) {
        if self.bytes.is_empty() {
            return;
        }

        let mut pos = offset % self.bytes.len();
        for &byte in data {
            self.bytes[pos].store(byte, Ordering::Relaxed);
            pos += 1;
            if pos == self.bytes.len() {
                pos = 0;
            }
        }
    }

    /// Same as [`write`](Self::write) with the offset given in frames.
    pub fn write_frames(&self, frame: usize, data: &[u8]) {
        self.write(frame * self.frame_size(), data);
    }

    /// Copy bytes out starting at `offset`, wrapping at the end.
    pub fn read(&self, offset: usize, out: &mut [u8]) {
        if self.bytes.is_empty() {
            out.fill(0);
            return;
        }

        let mut pos = offset % self.bytes.len();
        for slot in out.iter_mut() {
            *slot = self.bytes[pos].load(Ordering::Relaxed);
            pos += 1;
            if pos == self.bytes.len() {
                pos = 0;
            }
        }
    }

    /// Feed `[start, start + len)` to `sink` without allocating.
    ///
    /// The range must lie inside the buffer; callers derive it from the
    /// buffer length.
    pub(crate) fn stream_range(&self, start: usize, len: usize, sink: &mut dyn StreamSink) {
        let mut staging = [0u8; STAGING_BYTES];

        for chunk in self.bytes[start..start + len].chunks(STAGING_BYTES) {
            let staged = &mut staging[..chunk.len()];
            for (dst, src) in staged.iter_mut().zip(chunk) {
                *dst = src.load(Ordering::Relaxed);
            }
            sink.put(staged);
        }
    }
}

impl std::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("len", &self.bytes.len())
            .field("cursor", &self.cursor_frames())
            .field("layout", &self.layout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snddma_core::StreamFormat;

    fn stereo16(samples: usize) -> DmaBuffer {
        let format = StreamFormat::pcm(44_100, 2, 16);
        DmaBuffer::new(DmaLayout::plan(&format, 512, Some(samples)).unwrap()).unwrap()
    }

    #[test]
    fn test_oversized_layout_fails_allocation() {
        let layout = DmaLayout {
            sample_bits: 16,
            is_float: false,
            channels: 1,
            samples: usize::MAX / 2,
            full_samples: usize::MAX / 2,
            submission_chunk: 1,
            speed: 44_100,
        };

        let err = DmaBuffer::new(layout).unwrap_err();
        assert!(matches!(err, Error::Allocation { bytes } if bytes == layout.size_bytes()));
    }

    #[test]
    fn test_new_is_zeroed() {
        let dma = stereo16(64);
        assert_eq!(dma.len(), 128);
        assert_eq!(dma.frame_count(), 32);
        assert_eq!(dma.cursor_frames(), 0);

        let mut out = [0xffu8; 128];
        dma.read(0, &mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_wraps() {
        let dma = stereo16(8); // 16 bytes
        dma.write(12, &[1, 2, 3, 4, 5, 6]);

        let mut out = [0u8; 16];
        dma.read(0, &mut out);
        assert_eq!(&out[12..], &[1, 2, 3, 4]);
        assert_eq!(&out[..2], &[5, 6]);

        let mut tail = [0u8; 6];
        dma.read(12, &mut tail);
        assert_eq!(tail, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_write_frames_offsets_by_frame_size() {
        let dma = stereo16(8);
        dma.write_frames(3, &[9, 9, 9, 9]);

        let mut out = [0u8; 4];
        dma.read(12, &mut out);
        assert_eq!(out, [9, 9, 9, 9]);
    }

    #[test]
    fn test_stream_range_stages_in_chunks() {
        let dma = stereo16(1024); // 2048 bytes
        let pattern: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        dma.write(0, &pattern);

        let mut sink: Vec<u8> = Vec::new();
        dma.stream_range(100, 1500, &mut sink);
        assert_eq!(sink, &pattern[100..1600]);
    }
}
