//! In-process host audio runtime for tests and headless runs.
//!
//! [`MockSource`] hands out streams whose callbacks are driven explicitly
//! through a [`MockHandle`], so every pull happens at a known point.

use crate::{CaptureStream, PlaybackStream, PullCallback, PullSource, StreamEvent};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use snddma_core::{DeviceFormat, Error, Result, StreamFormat, StreamRequest};
use std::collections::VecDeque;
use std::sync::Arc;

/// Behaviour of a [`MockSource`].
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Format reported by `device_format`; `None` makes the query fail.
    pub granted: Option<DeviceFormat>,
    /// Report the granted format without its callback period.
    pub unreported_chunk: bool,
    /// Refuse to open playback streams.
    pub fail_open: bool,
    /// Refuse to resume playback streams.
    pub fail_resume: bool,
    /// Whether a capture device exists.
    pub capture_device: bool,
}

#[derive(Default)]
struct MockState {
    callback: Option<PullCallback>,
    playback_open: bool,
    playback_running: bool,
    playback_pauses: usize,
    gain: Option<f32>,
    opens: usize,
    last_request: Option<StreamRequest>,
    capture_open: bool,
    capture_running: bool,
    capture_queue: VecDeque<u8>,
    events: Option<Sender<StreamEvent>>,
}

/// Fake host whose streams are driven by a [`MockHandle`].
pub struct MockSource {
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockSource {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Host that grants exactly `format` with `chunk_frames` per callback.
    pub fn granting(format: StreamFormat, chunk_frames: u32) -> Self {
        Self::new(MockConfig {
            granted: Some(DeviceFormat {
                format,
                chunk_frames,
            }),
            capture_device: true,
            ..MockConfig::default()
        })
    }

    /// Test-side handle sharing this host's state.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl PullSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn open_playback(
        &mut self,
        request: &StreamRequest,
        callback: PullCallback,
        events: Sender<StreamEvent>,
    ) -> Result<Box<dyn PlaybackStream>> {
        if self.config.fail_open {
            return Err(Error::Initialization(
                "mock host refused to open playback".to_string(),
            ));
        }

        let mut state = self.state.lock();
        state.callback = Some(callback);
        state.playback_open = true;
        state.playback_running = false;
        state.opens += 1;
        state.last_request = Some(*request);
        state.events = Some(events);

        let granted = self.config.granted.map(|device| {
            if self.config.unreported_chunk {
                DeviceFormat::with_chunk(device.format, None)
            } else {
                device
            }
        });

        Ok(Box::new(MockPlayback {
            granted,
            fail_resume: self.config.fail_resume,
            state: Arc::clone(&self.state),
        }))
    }

    fn open_capture(
        &mut self,
        format: &StreamFormat,
        _events: Sender<StreamEvent>,
    ) -> Result<Box<dyn CaptureStream>> {
        if !self.config.capture_device {
            return Err(Error::Capture(format!("no mock capture device for {format}")));
        }

        let mut state = self.state.lock();
        state.capture_open = true;
        state.capture_running = false;

        Ok(Box::new(MockCapture {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockPlayback {
    granted: Option<DeviceFormat>,
    fail_resume: bool,
    state: Arc<Mutex<MockState>>,
}

impl PlaybackStream for MockPlayback {
    fn device_format(&self) -> Result<DeviceFormat> {
        self.granted
            .ok_or_else(|| Error::FormatQuery("mock device has no format".to_string()))
    }

    fn resume(&mut self) -> Result<()> {
        if self.fail_resume {
            return Err(Error::Stream("mock host refused to resume".to_string()));
        }
        self.state.lock().playback_running = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.playback_running = false;
        state.playback_pauses += 1;
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        self.state.lock().gain = Some(gain);
    }
}

impl Drop for MockPlayback {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.callback = None;
        state.playback_open = false;
        state.playback_running = false;
        state.events = None;
    }
}

struct MockCapture {
    state: Arc<Mutex<MockState>>,
}

impl CaptureStream for MockCapture {
    fn resume(&mut self) -> Result<()> {
        self.state.lock().capture_running = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.state.lock().capture_running = false;
        Ok(())
    }

    fn available_bytes(&self) -> usize {
        self.state.lock().capture_queue.len()
    }

    fn read(&mut self, out: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let n = out.len().min(state.capture_queue.len());
        for (slot, byte) in out.iter_mut().zip(state.capture_queue.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.capture_open = false;
        state.capture_running = false;
        state.capture_queue.clear();
    }
}

/// Drives and inspects the streams of a [`MockSource`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Pull `bytes` through the playback callback the way the host would.
    ///
    /// Returns nothing unless a playback stream is open and running.
    pub fn pull(&self, bytes: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        let mut out: Vec<u8> = Vec::with_capacity(bytes);
        if state.playback_running {
            if let Some(callback) = state.callback.as_mut() {
                callback(bytes, &mut out);
            }
        }
        out
    }

    /// Pull even while paused, as a host racing a teardown might.
    pub fn pull_unchecked(&self, bytes: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        let mut out: Vec<u8> = Vec::new();
        if let Some(callback) = state.callback.as_mut() {
            callback(bytes, &mut out);
        }
        out
    }

    pub fn is_playback_open(&self) -> bool {
        self.state.lock().playback_open
    }

    pub fn is_playback_running(&self) -> bool {
        self.state.lock().playback_running
    }

    /// Times a playback stream was paused.
    pub fn playback_pauses(&self) -> usize {
        self.state.lock().playback_pauses
    }

    pub fn has_callback(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    pub fn gain(&self) -> Option<f32> {
        self.state.lock().gain
    }

    /// Number of playback streams opened so far.
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        self.state.lock().last_request
    }

    pub fn is_capture_open(&self) -> bool {
        self.state.lock().capture_open
    }

    pub fn is_capture_running(&self) -> bool {
        self.state.lock().capture_running
    }

    /// Queue captured bytes, as if recorded by the device.
    pub fn push_capture(&self, bytes: &[u8]) {
        let mut state = self.state.lock();
        if state.capture_open && state.capture_running {
            state.capture_queue.extend(bytes);
        }
    }

    /// Report a host-side playback error.
    pub fn emit_error(&self, message: &str) {
        if let Some(events) = &self.state.lock().events {
            let _ = events.send(StreamEvent::PlaybackError(message.to_string()));
        }
    }
}
