//! The pull bridge: copies from the DMA ring buffer into the host stream.
//!
//! The host calls [`PullBridge::on_pull`] on its own thread whenever its
//! internal stream runs low. The bridge copies from the cursor, wraps at the
//! buffer end and advances the cursor by the frames consumed. It never
//! blocks, allocates, or logs.

use crate::buffer::DmaBuffer;
use crate::{PullCallback, StreamSink};
use snddma_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

struct BridgeShared {
    active: AtomicBool,
    dma: OnceLock<DmaBuffer>,
}

/// Handle to the state shared between a session and its host callback.
///
/// The stream is opened before the buffer can be sized, so the buffer is
/// attached afterwards. Until [`activate`](Self::activate) every pull is a
/// no-op.
#[derive(Clone)]
pub struct PullBridge {
    shared: Arc<BridgeShared>,
}

impl PullBridge {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(BridgeShared {
                active: AtomicBool::new(false),
                dma: OnceLock::new(),
            }),
        }
    }

    /// Install the ring buffer. A bridge holds at most one buffer.
    pub fn attach(&self, dma: DmaBuffer) -> Result<()> {
        self.shared
            .dma
            .set(dma)
            .map_err(|_| Error::Initialization("DMA buffer already attached".to_string()))
    }

    pub fn dma(&self) -> Option<&DmaBuffer> {
        self.shared.dma.get()
    }

    pub fn activate(&self) {
        self.shared.active.store(true, Ordering::Release);
    }

    pub fn deactivate(&self) {
        self.shared.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire) && self.shared.dma.get().is_some()
    }

    /// Box this bridge up as the host callback.
    pub fn into_callback(self) -> PullCallback {
        Box::new(move |requested: usize, sink: &mut dyn StreamSink| {
            self.on_pull(requested, sink);
        })
    }

    /// Write exactly `requested` bytes to `sink`, returning the byte count.
    ///
    /// Inactive bridges and empty requests write nothing and leave the
    /// cursor alone.
    pub fn on_pull(&self, requested: usize, sink: &mut dyn StreamSink) -> usize {
        if requested == 0 || !self.shared.active.load(Ordering::Acquire) {
            return 0;
        }
        let Some(dma) = self.shared.dma.get() else {
            return 0;
        };

        let len = dma.len();
        let frame_size = dma.frame_size();

        let mut pos = dma.cursor_frames() * frame_size;
        if pos >= len {
            pos = 0;
        }
        let to_end = len - pos;

        let cursor = if requested <= to_end {
            dma.stream_range(pos, requested, sink);
            pos / frame_size + requested / frame_size
        } else {
            dma.stream_range(pos, to_end, sink);

            let mut remainder = requested - to_end;
            while remainder > len {
                dma.stream_range(0, len, sink);
                remainder -= len;
            }
            dma.stream_range(0, remainder, sink);

            // Recomputed from the remainder so repeated wraps cannot drift.
            remainder / frame_size
        };

        let cursor = if cursor >= dma.frame_count() { 0 } else { cursor };
        dma.set_cursor_frames(cursor);

        requested
    }
}

impl Default for PullBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;
    use snddma_core::{DmaLayout, StreamFormat};

    /// Active bridge over a buffer whose byte `i` holds `i % 256`.
    fn bridge_with(format: StreamFormat, samples: usize) -> PullBridge {
        let layout = DmaLayout::plan(&format, 1, Some(samples)).unwrap();
        let dma = DmaBuffer::new(layout).unwrap();
        let pattern: Vec<u8> = (0..dma.len()).map(|i| (i % 256) as u8).collect();
        dma.write(0, &pattern);

        let bridge = PullBridge::new();
        bridge.attach(dma).unwrap();
        bridge.activate();
        bridge
    }

    /// 100 byte buffer, 2 byte frames.
    fn mono16_100() -> PullBridge {
        bridge_with(StreamFormat::pcm(22_050, 1, 16), 50)
    }

    #[test]
    fn test_contiguous_pull() {
        let bridge = mono16_100();
        let mut sink: Vec<u8> = Vec::new();

        assert_eq!(bridge.on_pull(30, &mut sink), 30);
        assert_eq!(sink, (0..30).collect::<Vec<u8>>());
        assert_eq!(bridge.dma().unwrap().cursor_frames(), 15);
    }

    #[test]
    fn test_wraparound_pull() {
        let bridge = mono16_100();
        let dma = bridge.dma().unwrap();
        dma.set_cursor_frames(45); // byte 90

        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(bridge.on_pull(20, &mut sink), 20);

        let expected: Vec<u8> = (90..100).chain(0..10).collect();
        assert_eq!(sink, expected);
        assert_eq!(dma.cursor_frames(), 5);
    }

    #[test]
    fn test_pull_to_exact_end_wraps_cursor() {
        let bridge = mono16_100();
        let dma = bridge.dma().unwrap();
        dma.set_cursor_frames(40);

        let mut sink: Vec<u8> = Vec::new();
        bridge.on_pull(20, &mut sink);

        assert_eq!(sink, (80..100).collect::<Vec<u8>>());
        assert_eq!(dma.cursor_frames(), 0);
    }

    #[test]
    fn test_full_buffer_pull_from_middle_clamps_cursor() {
        let bridge = mono16_100();
        let dma = bridge.dma().unwrap();
        dma.set_cursor_frames(25);

        let mut sink: Vec<u8> = Vec::new();
        bridge.on_pull(100, &mut sink);

        let expected: Vec<u8> = (50..100).chain(0..50).collect();
        assert_eq!(sink, expected);
        assert_eq!(dma.cursor_frames(), 25);
    }

    #[test]
    fn test_stale_cursor_at_frame_count_reads_from_start() {
        let bridge = mono16_100();
        let dma = bridge.dma().unwrap();
        dma.set_cursor_frames(dma.frame_count());

        let mut sink: Vec<u8> = Vec::new();
        bridge.on_pull(8, &mut sink);

        assert_eq!(sink, (0..8).collect::<Vec<u8>>());
        assert_eq!(dma.cursor_frames(), 4);
    }

    #[test]
    fn test_oversized_pull_writes_every_byte() {
        let bridge = mono16_100();
        let dma = bridge.dma().unwrap();
        dma.set_cursor_frames(45);

        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(bridge.on_pull(250, &mut sink), 250);

        let expected: Vec<u8> = (90..100).chain(0..100).chain(0..100).chain(0..40).collect();
        assert_eq!(sink, expected);
        assert_eq!(dma.cursor_frames(), 20);
    }

    #[test]
    fn test_inactive_pull_is_noop() {
        let bridge = mono16_100();
        let dma = bridge.dma().unwrap();
        dma.set_cursor_frames(7);
        bridge.deactivate();

        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(bridge.on_pull(40, &mut sink), 0);
        assert!(sink.is_empty());
        assert_eq!(dma.cursor_frames(), 7);
        assert!(!bridge.is_active());
    }

    #[test]
    fn test_unattached_pull_is_noop() {
        let bridge = PullBridge::new();
        bridge.activate();
        assert!(!bridge.is_active());

        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(bridge.on_pull(64, &mut sink), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_zero_request_is_noop() {
        let bridge = mono16_100();
        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(bridge.on_pull(0, &mut sink), 0);
        assert_eq!(bridge.dma().unwrap().cursor_frames(), 0);
    }

    #[test]
    fn test_attach_twice_fails() {
        let bridge = mono16_100();
        let layout = *bridge.dma().unwrap().layout();
        let err = bridge.attach(DmaBuffer::new(layout).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
    }

    #[test]
    fn test_callback_drives_bridge() {
        let bridge = mono16_100();
        let mut callback = bridge.clone().into_callback();

        let mut sink: Vec<u8> = Vec::new();
        callback(12, &mut sink);
        callback(12, &mut sink);

        assert_eq!(sink, (0..24).collect::<Vec<u8>>());
        assert_eq!(bridge.dma().unwrap().cursor_frames(), 12);
    }

    proptest! {
        #[test]
        fn cursor_tracks_cumulative_frames(
            channels in 1u16..=2,
            frames in 1usize..400,
            pulls in prop::collection::vec(1usize..400, 1..64),
        ) {
            let bridge = bridge_with(StreamFormat::pcm(44_100, channels, 16), frames * usize::from(channels));
            let dma = bridge.dma().unwrap();
            let frame_size = dma.frame_size();

            let mut consumed = 0usize;
            let mut sink: Vec<u8> = Vec::new();
            for pull in pulls {
                let pull_frames = (pull % frames) + 1;
                sink.clear();
                bridge.on_pull(pull_frames * frame_size, &mut sink);
                prop_assert_eq!(sink.len(), pull_frames * frame_size);

                consumed += pull_frames;
                prop_assert_eq!(dma.cursor_frames(), consumed % frames);
                prop_assert!(dma.cursor_frames() < dma.frame_count());
            }
        }
    }
}
