//! Host audio through cpal.
//!
//! cpal hands the callback a slice of device samples to fill. The bridge
//! produces DMA-format bytes, so a [`SampleSink`] decodes them straight into
//! that slice, applying the master gain on the way.

use crate::buffer::{shared_ring_buffer, SharedRingBuffer};
use crate::{CaptureStream, PlaybackStream, PullCallback, PullSource, StreamEvent, StreamSink};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, FromSample, Host, SampleFormat, SampleRate, SizedSample, Stream,
    StreamConfig, SupportedBufferSize, SupportedStreamConfig,
};
use crossbeam_channel::Sender;
use snddma_core::{DeviceFormat, Error, Result, StreamFormat, StreamRequest, DEFAULT_CHUNK_FRAMES};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Seconds of captured audio held before new samples are dropped.
const CAPTURE_BUFFER_SECS: usize = 2;

/// Samples converted per step in the capture callback and reader.
const CAPTURE_STAGING: usize = 256;

/// The default cpal host.
pub struct CpalSource {
    host: Host,
}

impl CpalSource {
    /// Use the default host and its default devices.
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PullSource for CpalSource {
    fn name(&self) -> &str {
        self.host.id().name()
    }

    fn open_playback(
        &mut self,
        request: &StreamRequest,
        callback: PullCallback,
        events: Sender<StreamEvent>,
    ) -> Result<Box<dyn PlaybackStream>> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| Error::Initialization("No output device found".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let supported = select_output_config(&device, request)?;
        debug!("Supported output config: {:?}", supported);

        let sample_format = supported.sample_format();
        let chunk_frames = chunk_frames(supported.buffer_size(), request.chunk_frames);
        let mut config: StreamConfig = supported.config();
        config.buffer_size = stream_buffer_size(chunk_frames);
        if chunk_frames.is_none() {
            debug!("{device_name} does not report a buffer size, assuming {DEFAULT_CHUNK_FRAMES} frames");
        }

        // The device runs in its own sample type; bit depth stays ours.
        let format = StreamFormat::pcm(config.sample_rate.0, config.channels, request.sample_bits);
        let granted = DeviceFormat::with_chunk(format, chunk_frames);
        let gain = Arc::new(AtomicU32::new(1.0f32.to_bits()));

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_output_stream::<f32>(&device, &config, format, callback, Arc::clone(&gain), events)?
            }
            SampleFormat::I16 => {
                build_output_stream::<i16>(&device, &config, format, callback, Arc::clone(&gain), events)?
            }
            SampleFormat::U16 => {
                build_output_stream::<u16>(&device, &config, format, callback, Arc::clone(&gain), events)?
            }
            _ => {
                return Err(Error::Initialization(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        // Some backends start streams on creation.
        if let Err(e) = stream.pause() {
            debug!("Could not pause new output stream: {e}");
        }

        Ok(Box::new(CpalPlayback {
            stream,
            device_name,
            granted,
            gain,
        }))
    }

    fn open_capture(
        &mut self,
        format: &StreamFormat,
        events: Sender<StreamEvent>,
    ) -> Result<Box<dyn CaptureStream>> {
        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| Error::Capture("No input device found".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let range = device
            .supported_input_configs()
            .map_err(|e| Error::Capture(format!("Failed to list input configs: {e}")))?
            .find(|range| {
                range.channels() == format.channels
                    && range.min_sample_rate().0 <= format.sample_rate
                    && format.sample_rate <= range.max_sample_rate().0
                    && is_supported(range.sample_format())
            })
            .ok_or_else(|| Error::Capture(format!("{device_name} cannot capture {format}")))?;

        let supported = range.with_sample_rate(SampleRate(format.sample_rate));
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let ring = shared_ring_buffer(
            format.sample_rate as usize * usize::from(format.channels) * CAPTURE_BUFFER_SECS,
        );

        let stream = match sample_format {
            SampleFormat::I16 => build_input_stream::<i16>(&device, &config, Arc::clone(&ring), events)?,
            SampleFormat::F32 => build_input_stream::<f32>(&device, &config, Arc::clone(&ring), events)?,
            SampleFormat::U16 => build_input_stream::<u16>(&device, &config, Arc::clone(&ring), events)?,
            _ => {
                return Err(Error::Capture(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        // Capture only runs between start_capture and stop_capture.
        if let Err(e) = stream.pause() {
            debug!("Could not pause new capture stream: {e}");
        }

        info!("Using audio capture device: {device_name}");
        Ok(Box::new(CpalCapture { stream, ring }))
    }
}

const fn is_supported(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
    )
}

/// Pick the device config closest to the request, or the device default.
fn select_output_config(device: &Device, request: &StreamRequest) -> Result<SupportedStreamConfig> {
    let default = device
        .default_output_config()
        .map_err(|e| Error::Initialization(format!("Failed to get output config: {e}")))?;

    let rate = request.sample_rate.unwrap_or(default.sample_rate().0);
    let exact = device.supported_output_configs().ok().and_then(|mut ranges| {
        ranges.find(|range| {
            range.channels() == request.channels
                && range.min_sample_rate().0 <= rate
                && rate <= range.max_sample_rate().0
                && is_supported(range.sample_format())
        })
    });

    Ok(match exact {
        Some(range) => range.with_sample_rate(SampleRate(rate)),
        None => {
            debug!(
                "No output config for {} channels at {rate} Hz, using device default",
                request.channels
            );
            default
        }
    })
}

/// Callback period the device will use, if it reports one.
fn chunk_frames(buffer_size: &SupportedBufferSize, preferred: Option<u32>) -> Option<u32> {
    match buffer_size {
        SupportedBufferSize::Range { min, max } => {
            Some(preferred.unwrap_or(DEFAULT_CHUNK_FRAMES).clamp(*min, *max))
        }
        SupportedBufferSize::Unknown => None,
    }
}

/// Run the stream at the period the buffer is sized from, when there is one.
const fn stream_buffer_size(chunk_frames: Option<u32>) -> BufferSize {
    match chunk_frames {
        Some(frames) => BufferSize::Fixed(frames),
        None => BufferSize::Default,
    }
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    format: StreamFormat,
    mut callback: PullCallback,
    gain: Arc<AtomicU32>,
    events: Sender<StreamEvent>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let bytes_per_sample = format.bytes_per_sample();

    let err_fn = move |err: cpal::StreamError| {
        error!("Audio stream error: {err}");
        let _ = events.send(StreamEvent::PlaybackError(err.to_string()));
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let requested = data.len() * bytes_per_sample;
                let mut sink = SampleSink {
                    out: data,
                    filled: 0,
                    bytes_per_sample,
                    gain: f32::from_bits(gain.load(Ordering::Relaxed)),
                };
                callback(requested, &mut sink);
                // Inactive bridge or short write
                sink.silence_rest();
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Initialization(format!("Failed to build stream: {e}")))
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    ring: SharedRingBuffer,
    events: Sender<StreamEvent>,
) -> Result<Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let err_fn = move |err: cpal::StreamError| {
        error!("Audio capture error: {err}");
        let _ = events.send(StreamEvent::CaptureError(err.to_string()));
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut staging = [0i16; CAPTURE_STAGING];
                for chunk in data.chunks(CAPTURE_STAGING) {
                    let staged = &mut staging[..chunk.len()];
                    for (dst, &src) in staged.iter_mut().zip(chunk) {
                        *dst = i16::from_sample_(src);
                    }
                    // Drops samples if nobody drains the buffer
                    ring.write(staged);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Capture(format!("Failed to build capture stream: {e}")))
}

/// Decode one DMA-format sample to `[-1.0, 1.0)`.
fn decode_sample(raw: &[u8]) -> f32 {
    match *raw {
        [b] => (f32::from(b) - 128.0) / 128.0,
        [lo, hi] => f32::from(i16::from_le_bytes([lo, hi])) / 32768.0,
        [a, b, c, d] => f32::from_le_bytes([a, b, c, d]),
        _ => 0.0,
    }
}

/// Writes DMA bytes into a device sample slice.
struct SampleSink<'a, T> {
    out: &'a mut [T],
    filled: usize,
    bytes_per_sample: usize,
    gain: f32,
}

impl<T: SizedSample + FromSample<f32>> SampleSink<'_, T> {
    fn silence_rest(&mut self) {
        for sample in &mut self.out[self.filled..] {
            *sample = T::from_sample(0.0f32);
        }
    }
}

impl<T: SizedSample + FromSample<f32>> StreamSink for SampleSink<'_, T> {
    fn put(&mut self, bytes: &[u8]) {
        let free = &mut self.out[self.filled..];
        let mut written = 0;
        for (slot, raw) in free.iter_mut().zip(bytes.chunks_exact(self.bytes_per_sample)) {
            *slot = T::from_sample(decode_sample(raw) * self.gain);
            written += 1;
        }
        self.filled += written;
    }
}

struct CpalPlayback {
    stream: Stream,
    device_name: String,
    granted: DeviceFormat,
    gain: Arc<AtomicU32>,
}

impl PlaybackStream for CpalPlayback {
    fn device_format(&self) -> Result<DeviceFormat> {
        Ok(self.granted)
    }

    fn resume(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::Stream(format!("Failed to start stream: {e}")))
    }

    fn pause(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::Stream(format!("Failed to pause stream: {e}")))
    }

    fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        debug!("Closing output stream on {}", self.device_name);
    }
}

struct CpalCapture {
    stream: Stream,
    ring: SharedRingBuffer,
}

impl CaptureStream for CpalCapture {
    fn resume(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::Capture(format!("Failed to start capture: {e}")))
    }

    fn pause(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::Capture(format!("Failed to pause capture: {e}")))
    }

    fn available_bytes(&self) -> usize {
        self.ring.available() * 2
    }

    fn read(&mut self, out: &mut [u8]) -> usize {
        let mut staging = [0i16; CAPTURE_STAGING];
        let mut filled = 0;

        while out.len() - filled >= 2 {
            let want = ((out.len() - filled) / 2).min(CAPTURE_STAGING);
            let got = self.ring.read(&mut staging[..want]);
            if got == 0 {
                break;
            }
            for (dst, sample) in out[filled..filled + got * 2]
                .chunks_exact_mut(2)
                .zip(&staging[..got])
            {
                dst.copy_from_slice(&sample.to_le_bytes());
            }
            filled += got * 2;
        }

        filled
    }
}
