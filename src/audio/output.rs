//! Audio output using cpal.
//!
//! Opens the output device, negotiates a stereo stream at the requested
//! rate, and runs the engine's render path from the device callback. The
//! render produces interleaved i16; devices that only take f32 get a
//! converted copy of the same buffer.

use crate::config::EngineConfig;
use crate::engine::EngineShared;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Audio output manager.
pub(crate) struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl AudioOutput {
    /// List available output device names.
    pub(crate) fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::Device(format!("failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the configured device (or the host default) with a stereo
    /// stream as close to the requested format as the device allows.
    pub(crate) fn open(config: &EngineConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match config.device.as_ref() {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::Device(format!("failed to enumerate devices: {}", e)))?;

                match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                    Some(dev) => {
                        info!("found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!(
                            "requested device '{}' not found, falling back to default",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::Device(format!(
                                "device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Device("no default output device found".to_string()))?,
        };

        let (mut stream_config, sample_format) = Self::negotiate(&device, config.freq)?;
        stream_config.buffer_size = cpal::BufferSize::Fixed(config.samples);

        debug!(
            "audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            stream_config.sample_rate.0, stream_config.channels, sample_format,
            stream_config.buffer_size
        );

        Ok(Self {
            device,
            config: stream_config,
            sample_format,
            stream: None,
        })
    }

    /// Pick a stereo configuration, preferring the requested rate and an
    /// i16 stream (the engine's native output), then f32.
    fn negotiate(device: &Device, freq: u32) -> Result<(StreamConfig, SampleFormat)> {
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::Device(format!("failed to get device configs: {}", e)))?
            .collect();

        for format in [SampleFormat::I16, SampleFormat::F32] {
            if let Some(range) = ranges.iter().find(|r| {
                r.channels() == 2
                    && r.min_sample_rate().0 <= freq
                    && r.max_sample_rate().0 >= freq
                    && r.sample_format() == format
            }) {
                let config = range
                    .clone()
                    .with_sample_rate(cpal::SampleRate(freq))
                    .config();
                return Ok((config, format));
            }
        }

        // Fall back to the device default; the realized rate becomes the
        // engine rate and the decoder contract follows it.
        let supported = device
            .default_output_config()
            .map_err(|e| Error::Device(format!("failed to get default config: {}", e)))?;

        if supported.channels() != 2 {
            return Err(Error::Device(format!(
                "device offers {} channels, stereo required",
                supported.channels()
            )));
        }

        warn!(
            "requested rate {} Hz unavailable, using device default {} Hz",
            freq,
            supported.sample_rate().0
        );

        let sample_format = supported.sample_format();
        Ok((supported.config(), sample_format))
    }

    /// Start the stream; the callback runs the engine render under the
    /// audio lock.
    pub(crate) fn start(&mut self, shared: Arc<EngineShared>) -> Result<()> {
        info!("starting audio stream");

        let stream = match self.sample_format {
            SampleFormat::I16 => self.build_stream_i16(shared)?,
            SampleFormat::F32 => self.build_stream_f32(shared)?,
            sample_format => {
                return Err(Error::Device(format!(
                    "unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Device(format!("failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("audio stream started");
        Ok(())
    }

    fn build_stream_i16(&self, shared: Arc<EngineShared>) -> Result<Stream> {
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    shared.render(data);
                },
                move |err| {
                    error!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::Device(format!("failed to build stream: {}", e)))?;
        Ok(stream)
    }

    fn build_stream_f32(&self, shared: Arc<EngineShared>) -> Result<Stream> {
        let mut staging: Vec<i16> = Vec::new();
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    staging.resize(data.len(), 0);
                    shared.render(&mut staging);
                    for (dst, &src) in data.iter_mut().zip(staging.iter()) {
                        *dst = src as f32 / 32768.0;
                    }
                },
                move |err| {
                    error!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::Device(format!("failed to build stream: {}", e)))?;
        Ok(stream)
    }

    /// Pause and drop the stream.
    pub(crate) fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("failed to pause stream on stop: {}", e);
            }
            drop(stream);
            info!("audio stream stopped");
        }
    }

    pub(crate) fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_does_not_panic() {
        // Requires audio hardware to return anything useful; either
        // outcome is acceptable here.
        let result = AudioOutput::list_devices();
        assert!(result.is_ok() || result.is_err());
    }
}
