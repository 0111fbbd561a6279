//! A minimal mixer: paints a sine tone ahead of the playback cursor.

use snddma_audio::DmaBuffer;
use snddma_core::DmaLayout;
use std::f64::consts::TAU;
use std::time::Duration;

/// Paints a tone into a DMA buffer, tracking elapsed sound time across
/// cursor wraps.
pub struct ToneMixer {
    /// Radians per frame.
    step: f64,
    amplitude: f64,
    mixahead_frames: usize,
    /// Absolute frame painted up to.
    painted: usize,
    /// Times the cursor has wrapped.
    buffers: usize,
    old_cursor: usize,
}

impl ToneMixer {
    pub fn new(layout: &DmaLayout, frequency: f64, amplitude: f64, mixahead: Duration) -> Self {
        let speed = f64::from(layout.speed.max(1));
        Self {
            step: TAU * frequency / speed,
            amplitude: amplitude.clamp(0.0, 1.0),
            mixahead_frames: (mixahead.as_secs_f64() * speed) as usize,
            painted: 0,
            buffers: 0,
            old_cursor: 0,
        }
    }

    /// Absolute frames the host has consumed.
    ///
    /// Misses wraps if called less than once per buffer length.
    pub fn sound_time(&mut self, dma: &DmaBuffer) -> usize {
        let cursor = dma.cursor_frames();
        if cursor < self.old_cursor {
            self.buffers += 1;
        }
        self.old_cursor = cursor;
        self.buffers * dma.frame_count() + cursor
    }

    /// Fill the buffer up to the mixahead point. Returns frames painted.
    pub fn paint(&mut self, dma: &DmaBuffer) -> usize {
        let sound_time = self.sound_time(dma);

        // Fell behind the cursor; skip the frames already played.
        if self.painted < sound_time {
            self.painted = sound_time;
        }

        let end = (sound_time + self.mixahead_frames).min(sound_time + dma.frame_count());
        if end <= self.painted {
            return 0;
        }

        let layout = dma.layout();
        let frames = end - self.painted;
        let mut chunk = Vec::with_capacity(frames * dma.frame_size());
        for frame in self.painted..end {
            let value = (frame as f64 * self.step).sin() * self.amplitude;
            for _ in 0..layout.channels {
                encode_sample(layout, value, &mut chunk);
            }
        }

        dma.write_frames(self.painted % dma.frame_count(), &chunk);
        self.painted = end;
        frames
    }
}

/// Append one sample in the buffer's encoding.
fn encode_sample(layout: &DmaLayout, value: f64, out: &mut Vec<u8>) {
    let value = value.clamp(-1.0, 1.0);
    match layout.sample_bits {
        8 => out.push((value * 127.0 + 128.0) as u8),
        16 => out.extend_from_slice(&((value * 32767.0) as i16).to_le_bytes()),
        _ => out.resize(out.len() + layout.bytes_per_sample(), 0),
    }
}
