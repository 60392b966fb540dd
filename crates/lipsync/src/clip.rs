use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use modelpack::ResourceFetcher;
use rodio::{Decoder, Source};

use crate::LipSyncError;

/// Gain applied to the RMS of the analysis window before clamping.
pub const RMS_GAIN: f32 = 4.0;

/// Number of frames fed to each RMS measurement.
pub const ANALYSIS_WINDOW: usize = 256;

/// Decoded PCM audio, interleaved, normalised to [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
}

impl AudioClip {
    /// Decodes WAV or MP3 bytes. Safe to call off the frame thread.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, LipSyncError> {
        let decoder = Decoder::new(Cursor::new(bytes))?;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let samples: Vec<f32> = decoder.map(|s| s as f32 / i16::MAX as f32).collect();
        Self::from_samples(channels, sample_rate, samples)
    }

    /// Fetches `uri` (URL, path or blob) and decodes it.
    pub fn fetch(fetcher: &ResourceFetcher, uri: &str) -> Result<Self, LipSyncError> {
        let bytes = fetcher.fetch(uri)?;
        Self::decode(bytes)
    }

    pub fn from_samples(
        channels: u16,
        sample_rate: u32,
        samples: Vec<f32>,
    ) -> Result<Self, LipSyncError> {
        if channels == 0 || sample_rate == 0 || samples.len() < channels as usize {
            return Err(LipSyncError::EmptyClip);
        }
        Ok(Self {
            samples: samples.into(),
            channels,
            sample_rate,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Mouth level of the window ending at `position` into playback.
    pub fn level_at(&self, position: Duration, window: &mut Vec<f32>) -> f32 {
        let end = ((position.as_secs_f64() * self.sample_rate as f64) as usize).min(self.frames());
        let start = end.saturating_sub(ANALYSIS_WINDOW);
        let channels = self.channels as usize;

        window.clear();
        window.extend(
            self.samples[start * channels..end * channels]
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
        rms_level(window)
    }
}

/// RMS of `samples` scaled by [`RMS_GAIN`], clamped to [0, 1].
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    let level = (sum / samples.len() as f32).sqrt() * RMS_GAIN;
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}
