//! Engine configuration.
//!
//! `EngineConfig` captures everything `AudioEngine::init` needs: the output
//! format, the device buffer size, and the flags passed through to the media
//! backend. Hosts typically deserialize it from their own settings store;
//! the demo binary maps CLI flags onto it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the audio engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub freq: u32,

    /// Output channel count. Only stereo (2) is supported.
    pub channels: u16,

    /// Device buffer size in frames per callback.
    pub samples: u32,

    /// Ask the media backend to log decode diagnostics.
    pub status: bool,

    /// Mix mono sources at equal power (-3 dB per lane) instead of
    /// duplicating them at full amplitude.
    pub equal_mono: bool,

    /// Output device name; None selects the host default.
    pub device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            freq: 48000,
            channels: 2,
            samples: 1024,
            status: false,
            equal_mono: false,
            device: None,
        }
    }
}

impl EngineConfig {
    /// Check the configuration before opening a device.
    pub fn validate(&self) -> Result<()> {
        if self.channels != 2 {
            return Err(Error::Device(format!(
                "unsupported channel count {} (only stereo output is supported)",
                self.channels
            )));
        }
        if self.freq == 0 {
            return Err(Error::Device("sample rate must be nonzero".to_string()));
        }
        if self.samples == 0 {
            return Err(Error::Device("buffer size must be nonzero".to_string()));
        }
        Ok(())
    }
}
