//! Sound driver configuration.

use crate::{Error, Result, StreamFormat, StreamRequest};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the configuration file inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "sound.json";

/// Fixed format of the voice capture stream.
pub const CAPTURE_FORMAT: StreamFormat = StreamFormat::pcm(48_000, 1, 16);

/// User-facing sound settings.
///
/// Every field has a default, so a partial JSON document is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SoundConfig {
    /// Bits per sample, 8 or 16. Anything else is treated as 16.
    pub bits: u16,
    /// Sample rate in Hz, 0 for the device default.
    pub speed: u32,
    /// Channel count.
    pub channels: u16,
    /// Preferred device callback period in frames, 0 for the device default.
    pub dev_samples: u32,
    /// Total DMA buffer size in samples, 0 to size from the device chunk.
    pub mix_samples: u32,
    /// Open the voice capture device during init.
    pub capture: bool,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            bits: 16,
            speed: 0,
            channels: 2,
            dev_samples: 0,
            mix_samples: 0,
            capture: true,
        }
    }
}

impl SoundConfig {
    /// Location of the configuration file, if the platform has a config dir.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "snddma", "snddma")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from the platform config directory, or defaults if there is none.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_path(&path),
            Some(path) => {
                debug!("No sound config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        debug!("Loaded sound config from {}", path.display());
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Bit depth after sanitising.
    pub fn sample_bits(&self) -> u16 {
        match self.bits {
            8 | 16 => self.bits,
            other => {
                warn!("Unsupported sample size of {other} bits, using 16");
                16
            }
        }
    }

    /// Explicit buffer size override, if any.
    pub const fn mix_samples_override(&self) -> Option<usize> {
        if self.mix_samples == 0 {
            None
        } else {
            Some(self.mix_samples as usize)
        }
    }

    /// Translate the settings into a playback stream request.
    pub fn stream_request(&self) -> Result<StreamRequest> {
        if self.channels == 0 {
            return Err(Error::Config("channels must be at least 1".to_string()));
        }

        Ok(StreamRequest {
            sample_rate: (self.speed != 0).then_some(self.speed),
            channels: self.channels,
            sample_bits: self.sample_bits(),
            chunk_frames: (self.dev_samples != 0).then_some(self.dev_samples),
        })
    }
}
