//! # snddma
//!
//! Opens the default output device through the DMA ring buffer bridge and
//! plays a short test tone. An optional first argument names a JSON sound
//! config; otherwise the platform config directory is used.

mod tone;

use anyhow::{Context, Result};
use snddma_audio::{CpalSource, DmaSession};
use snddma_core::SoundConfig;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tone::ToneMixer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PLAY_TIME: Duration = Duration::from_secs(3);
const TICK: Duration = Duration::from_millis(10);
const MIXAHEAD: Duration = Duration::from_millis(100);
const TONE_HZ: f64 = 440.0;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snddma=info,snddma_core=info,snddma_audio=info".into()),
        )
        .init();

    info!("Starting snddma v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args_os().nth(1) {
        Some(path) => SoundConfig::from_path(Path::new(&path))
            .with_context(|| format!("Failed to load {}", path.to_string_lossy()))?,
        None => SoundConfig::load().context("Failed to load sound config")?,
    };

    let mut session = DmaSession::new(CpalSource::new());

    // No sound is not fatal.
    let negotiated = match session.init(&config) {
        Ok(negotiated) => negotiated,
        Err(e) => {
            error!("Sound initialization failed: {e}");
            return Ok(());
        }
    };
    if negotiated.is_fallback() {
        warn!("Device did not report its format, assuming {}", negotiated.format());
    }

    play(&mut session);

    session.shutdown();
    info!("Done");
    Ok(())
}

fn play(session: &mut DmaSession<CpalSource>) {
    let Some(layout) = session.layout().copied() else {
        return;
    };
    let mut mixer = ToneMixer::new(&layout, TONE_HZ, 0.25, MIXAHEAD);
    let mut voice = Vec::new();
    let mut peak = 0i16;

    session.start_capture();

    let started = Instant::now();
    while started.elapsed() < PLAY_TIME {
        if let Some(dma) = session.dma() {
            mixer.paint(dma);
        }

        while let Some(event) = session.try_recv_event() {
            warn!("Audio stream event: {event:?}");
        }

        let pending = session.available_capture_samples();
        if pending > 0 {
            voice.resize(pending * 2, 0);
            session.capture(pending, &mut voice);
            peak = voice
                .chunks_exact(2)
                .map(|s| i16::from_le_bytes([s[0], s[1]]).saturating_abs())
                .fold(peak, i16::max);
        }

        thread::sleep(TICK);
    }

    session.stop_capture();
    if session.has_capture() {
        info!("Peak capture level: {peak}");
    }
    debug!("Played until frame {}", session.cursor_frames());
}
