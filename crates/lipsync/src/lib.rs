//! Mouth-openness source for a puppet model.
//!
//! Audio playback takes priority whenever a clip is playing: each update
//! measures the RMS of the samples just played. Otherwise the value follows a
//! manually set target using [`approach`].
mod clip;
mod output;

pub use clip::{rms_level, AudioClip, ANALYSIS_WINDOW, RMS_GAIN};
pub use output::{AudioOutput, ClockPlayback, ManualOutput, Playback, RodioOutput};

use modelpack::{AssetError, ResourceFetcher};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LipSyncError {
    #[error("failed to fetch audio: {0}")]
    Fetch(#[from] AssetError),
    #[error("failed to decode audio: {0}")]
    Decode(#[from] rodio::decoder::DecoderError),
    #[error("audio clip contains no samples")]
    EmptyClip,
    #[error("audio output error: {0}")]
    Output(String),
    #[error("failed to start audio fetch worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// One step of the exponential approach used for every interpolated target.
///
/// `speed == 0` snaps to `goal`. Otherwise `current` moves by
/// `(goal - current) * speed * dt`, with the factor capped at 1 so the value
/// never passes the goal.
pub fn approach(current: f32, goal: f32, speed: f32, dt: f32) -> f32 {
    if speed == 0.0 {
        return goal;
    }
    let factor = (speed * dt).clamp(0.0, 1.0);
    current + (goal - current) * factor
}

struct AudioSession {
    clip: AudioClip,
    playback: Box<dyn Playback>,
}

pub struct LipSync {
    output: Box<dyn AudioOutput>,
    session: Option<AudioSession>,
    manual_value: f32,
    manual_speed: f32,
    current_value: f32,
    window: Vec<f32>,
}

impl LipSync {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            session: None,
            manual_value: 0.0,
            manual_speed: 0.0,
            current_value: 0.0,
            window: Vec::with_capacity(ANALYSIS_WINDOW),
        }
    }

    /// Sets the target used while no audio is playing.
    pub fn set_manual(&mut self, value: f32, speed: f32) {
        self.manual_value = value;
        self.manual_speed = speed;
    }

    pub fn manual_value(&self) -> f32 {
        self.manual_value
    }

    /// Starts playing an already decoded clip, replacing any current session.
    pub fn start_clip(&mut self, clip: AudioClip) -> Result<(), LipSyncError> {
        self.stop();
        let playback = self.output.play(&clip)?;
        debug!(
            channels = clip.channels(),
            sample_rate = clip.sample_rate(),
            duration_ms = clip.duration().as_millis() as u64,
            "lip sync audio started"
        );
        self.session = Some(AudioSession { clip, playback });
        Ok(())
    }

    /// Decodes `bytes` and plays them. A decode failure leaves the current
    /// session untouched.
    pub fn start_from_bytes(&mut self, bytes: Vec<u8>) -> Result<(), LipSyncError> {
        let clip = AudioClip::decode(bytes)?;
        self.start_clip(clip)
    }

    pub fn start_from_uri(
        &mut self,
        fetcher: &ResourceFetcher,
        uri: &str,
    ) -> Result<(), LipSyncError> {
        let clip = AudioClip::fetch(fetcher, uri)?;
        self.start_clip(clip)
    }

    /// Stops audio and returns to manual mode.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.playback.stop();
        }
    }

    /// True while an audio clip is driving the value.
    pub fn is_speaking(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.playback.is_finished())
    }

    /// Advances one frame and returns the mouth value.
    pub fn update(&mut self, dt: f32) -> f32 {
        if let Some(session) = &self.session {
            if session.playback.is_finished() {
                debug!("lip sync audio finished");
                self.session = None;
            } else {
                let position = session.playback.position();
                self.current_value = session.clip.level_at(position, &mut self.window);
                return self.current_value;
            }
        }

        self.current_value = approach(
            self.current_value,
            self.manual_value,
            self.manual_speed,
            dt,
        );
        self.current_value
    }

    /// Releases the audio session. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.stop();
        self.window = Vec::new();
    }
}

impl Drop for LipSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }

    fn loud_wav() -> Vec<u8> {
        let samples: Vec<i16> = (0..8000)
            .map(|i| if i % 2 == 0 { i16::MAX / 2 } else { -(i16::MAX / 2) })
            .collect();
        wav_bytes(8000, &samples)
    }

    #[test]
    fn approach_snaps_without_speed() {
        assert_eq!(approach(0.2, 0.9, 0.0, 0.016), 0.9);
    }

    #[test]
    fn approach_uses_discrete_law() {
        assert_eq!(approach(0.0, 1.0, 2.0, 0.5), 1.0);
        assert!((approach(0.0, 1.0, 1.0, 0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn approach_converges_monotonically() {
        let goal = 0.75;
        let mut current = -1.0f32;
        let mut previous_gap = (goal - current).abs();
        for _ in 0..400 {
            current = approach(current, goal, 3.0, 0.1);
            let gap = (goal - current).abs();
            assert!(current <= goal, "overshot: {current}");
            assert!(gap <= previous_gap);
            previous_gap = gap;
        }
        assert!((current - goal).abs() < 1e-5);

        // Large steps saturate instead of overshooting.
        assert_eq!(approach(0.0, 1.0, 10.0, 1.0), 1.0);
    }

    #[test]
    fn manual_mode_blends_toward_target() {
        let mut lip = LipSync::new(Box::new(ManualOutput::new()));
        lip.set_manual(1.0, 0.0);
        assert_eq!(lip.update(0.016), 1.0);

        lip.set_manual(0.0, 2.0);
        let value = lip.update(0.25);
        assert!((value - 0.5).abs() < 1e-6);
        assert!(!lip.is_speaking());
    }

    #[test]
    fn audio_takes_priority_then_falls_back() {
        let output = ManualOutput::new();
        let mut lip = LipSync::new(Box::new(output.clone()));
        lip.set_manual(0.3, 0.0);

        lip.start_from_bytes(loud_wav()).expect("decode wav");
        assert!(lip.is_speaking());

        output.advance(Duration::from_millis(500));
        let speaking = lip.update(0.016);
        assert_eq!(speaking, 1.0);

        output.advance(Duration::from_secs(2));
        assert!(!lip.is_speaking());
        let value = lip.update(0.016);
        assert_eq!(value, 0.3);
        assert!(!lip.is_speaking());
    }

    #[test]
    fn decode_failure_keeps_current_session() {
        let output = ManualOutput::new();
        let mut lip = LipSync::new(Box::new(output.clone()));
        lip.start_from_bytes(loud_wav()).unwrap();

        let err = lip.start_from_bytes(b"garbage".to_vec()).unwrap_err();
        assert!(matches!(err, LipSyncError::Decode(_)));
        assert!(lip.is_speaking());
        assert_eq!(output.plays(), 1);
    }

    #[test]
    fn new_session_replaces_previous() {
        let output = ManualOutput::new();
        let mut lip = LipSync::new(Box::new(output.clone()));
        lip.start_from_bytes(loud_wav()).unwrap();
        output.advance(Duration::from_millis(100));
        lip.start_from_bytes(loud_wav()).unwrap();
        assert_eq!(output.plays(), 2);
        assert_eq!(output.position(), Duration::ZERO);
        assert!(lip.is_speaking());
    }

    #[test]
    fn dispose_is_idempotent() {
        let output = ManualOutput::new();
        let mut lip = LipSync::new(Box::new(output.clone()));
        lip.start_from_bytes(loud_wav()).unwrap();
        lip.dispose();
        assert!(output.was_stopped());
        assert!(!lip.is_speaking());
        lip.dispose();
        lip.set_manual(0.4, 0.0);
        assert_eq!(lip.update(0.016), 0.4);
    }
}
