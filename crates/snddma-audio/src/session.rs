//! Audio session: initialization, shutdown, and mixer-facing queries.

use crate::bridge::PullBridge;
use crate::buffer::DmaBuffer;
use crate::capture::CaptureBridge;
use crate::{PlaybackStream, PullSource, StreamEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use snddma_core::config::CAPTURE_FORMAT;
use snddma_core::{DmaLayout, Error, NegotiatedFormat, Result, SoundConfig};
use tracing::{debug, error, info, warn};

/// One active (or inactive) audio output session on top of a host backend.
///
/// The host calls back into the session's [`PullBridge`] on its own thread.
/// Everything else, including [`init`](Self::init) and
/// [`shutdown`](Self::shutdown), runs on the owner's thread.
pub struct DmaSession<S: PullSource> {
    source: S,
    playback: Option<Box<dyn PlaybackStream>>,
    bridge: Option<PullBridge>,
    negotiated: Option<NegotiatedFormat>,
    capture: CaptureBridge,
    event_tx: Sender<StreamEvent>,
    event_rx: Receiver<StreamEvent>,
}

impl<S: PullSource> DmaSession<S> {
    /// Create an inactive session.
    pub fn new(source: S) -> Self {
        let (event_tx, event_rx) = unbounded();

        Self {
            source,
            playback: None,
            bridge: None,
            negotiated: None,
            capture: CaptureBridge::absent(),
            event_tx,
            event_rx,
        }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    pub fn is_active(&self) -> bool {
        self.bridge.as_ref().is_some_and(PullBridge::is_active)
    }

    /// Open the host stream, size and allocate the DMA buffer, and start
    /// playback.
    ///
    /// On failure nothing is left open or allocated and the call may be
    /// retried. Calling this on an active session does nothing.
    pub fn init(&mut self, config: &SoundConfig) -> Result<NegotiatedFormat> {
        if let Some(negotiated) = self.negotiated.filter(|_| self.is_active()) {
            debug!("Audio already initialized");
            return Ok(negotiated);
        }

        let request = config.stream_request()?;
        info!(
            "Opening {} playback stream: {} bits, {} channels, {}",
            self.source.name(),
            request.sample_bits,
            request.channels,
            request
                .sample_rate
                .map_or_else(|| "device rate".to_string(), |rate| format!("{rate} Hz"))
        );

        let bridge = PullBridge::new();
        let mut stream = self
            .source
            .open_playback(&request, bridge.clone().into_callback(), self.event_tx.clone())
            .inspect_err(|e| error!("Failed to open playback stream: {e}"))?;

        let negotiated = match stream.device_format() {
            Ok(device) => NegotiatedFormat::Queried(device),
            Err(e) => {
                warn!("{e}; using requested format");
                NegotiatedFormat::Fallback(request.fallback_device_format())
            }
        };
        info!(
            "Device format: {} ({} frames per chunk)",
            negotiated.format(),
            negotiated.chunk_frames()
        );

        // `stream` is dropped, and so closed, on every early return below.
        let layout = DmaLayout::plan(
            negotiated.format(),
            negotiated.chunk_frames(),
            config.mix_samples_override(),
        )?;
        let dma = DmaBuffer::new(layout).map_err(|e| {
            error!("Failed to allocate DMA buffer: {e}");
            Error::Initialization(e.to_string())
        })?;
        bridge.attach(dma)?;

        let capture = if config.capture {
            self.open_capture()
        } else {
            info!("Audio capture disabled");
            CaptureBridge::absent()
        };

        bridge.activate();
        if let Err(e) = stream.resume() {
            bridge.deactivate();
            error!("Failed to start playback stream: {e}");
            return Err(Error::Initialization(e.to_string()));
        }

        info!(
            "Audio initialized: {} byte DMA buffer, {} frames at {} Hz",
            layout.size_bytes(),
            layout.full_samples,
            layout.speed
        );

        self.playback = Some(stream);
        self.bridge = Some(bridge);
        self.negotiated = Some(negotiated);
        self.capture = capture;
        Ok(negotiated)
    }

    fn open_capture(&mut self) -> CaptureBridge {
        match self
            .source
            .open_capture(&CAPTURE_FORMAT, self.event_tx.clone())
        {
            Ok(stream) => {
                info!("Capture device opened ({CAPTURE_FORMAT})");
                CaptureBridge::new(stream)
            }
            Err(e) => {
                warn!("Capture device failed to open: {e}");
                CaptureBridge::absent()
            }
        }
    }

    /// Stop the host stream, then release the buffer.
    ///
    /// Safe to call at any time, any number of times.
    pub fn shutdown(&mut self) {
        if let Some(bridge) = &self.bridge {
            bridge.deactivate();
        }

        if let Some(mut stream) = self.playback.take() {
            info!("Closing playback stream...");
            if let Err(e) = stream.pause() {
                debug!("Failed to pause playback stream: {e}");
            }
            drop(stream);
            info!("Playback stream closed");
        }

        if self.capture.is_open() {
            info!("Closing capture stream...");
            self.capture.close();
        }

        if let Some(bridge) = self.bridge.take() {
            if let Some(dma) = bridge.dma() {
                dma.set_cursor_frames(0);
            }
            info!("Audio shut down");
        }
        self.negotiated = None;
    }

    /// Playback position in frames, 0 while inactive.
    pub fn cursor_frames(&self) -> usize {
        self.active_dma().map_or(0, DmaBuffer::cursor_frames)
    }

    /// Playback position in scalar samples (`frames * channels`).
    pub fn cursor_samples(&self) -> usize {
        self.active_dma().map_or(0, |dma| {
            dma.cursor_frames() * usize::from(dma.layout().channels)
        })
    }

    /// The ring buffer, for the mixer to paint into.
    pub fn dma(&self) -> Option<&DmaBuffer> {
        self.active_dma()
    }

    pub fn layout(&self) -> Option<&DmaLayout> {
        self.active_dma().map(DmaBuffer::layout)
    }

    pub const fn negotiated_format(&self) -> Option<&NegotiatedFormat> {
        self.negotiated.as_ref()
    }

    fn active_dma(&self) -> Option<&DmaBuffer> {
        self.bridge
            .as_ref()
            .filter(|bridge| bridge.is_active())
            .and_then(PullBridge::dma)
    }

    /// Host-side output gain.
    pub fn set_master_gain(&self, gain: f32) {
        if let Some(stream) = &self.playback {
            stream.set_gain(gain.max(0.0));
        }
    }

    /// Resume the capture device, if there is one.
    pub fn start_capture(&mut self) {
        if let Err(e) = self.capture.start() {
            warn!("Failed to start capture: {e}");
        }
    }

    /// Pause the capture device, if there is one.
    pub fn stop_capture(&mut self) {
        if let Err(e) = self.capture.stop() {
            warn!("Failed to stop capture: {e}");
        }
    }

    pub const fn has_capture(&self) -> bool {
        self.capture.is_open()
    }

    /// Captured mono16 samples ready to read.
    pub fn available_capture_samples(&self) -> usize {
        self.capture.available_samples()
    }

    /// Read `samples` mono16 samples into `data`, zero-filling any shortfall.
    pub fn capture(&mut self, samples: usize, data: &mut [u8]) -> usize {
        self.capture.capture(samples, data)
    }

    /// Next asynchronous host event, if any.
    pub fn try_recv_event(&self) -> Option<StreamEvent> {
        self.event_rx.try_recv().ok()
    }
}

impl<S: PullSource> Drop for DmaSession<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
