use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::warn;

use crate::clip::AudioClip;
use crate::LipSyncError;

/// Somewhere decoded clips can be played.
pub trait AudioOutput {
    fn play(&mut self, clip: &AudioClip) -> Result<Box<dyn Playback>, LipSyncError>;
}

/// One playing clip.
pub trait Playback {
    /// Time elapsed since playback started.
    fn position(&self) -> Duration;
    fn is_finished(&self) -> bool;
    fn stop(&mut self);
}

struct Device {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

/// Plays through the default output device.
///
/// Without a device, clips still run on a wall clock so lip movement is
/// unaffected; only the sound is missing.
pub struct RodioOutput {
    device: Option<Device>,
}

impl RodioOutput {
    pub fn new() -> Self {
        let device = match OutputStream::try_default() {
            Ok((stream, handle)) => Some(Device {
                _stream: stream,
                handle,
            }),
            Err(error) => {
                warn!(%error, "audio output unavailable; lip sync will run silently");
                None
            }
        };
        Self { device }
    }

    pub fn silent() -> Self {
        Self { device: None }
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RodioOutput {
    fn play(&mut self, clip: &AudioClip) -> Result<Box<dyn Playback>, LipSyncError> {
        let clock = ClockPlayback::start(clip.duration());
        let Some(device) = &self.device else {
            return Ok(Box::new(clock));
        };
        let sink =
            Sink::try_new(&device.handle).map_err(|err| LipSyncError::Output(err.to_string()))?;
        sink.append(SamplesBuffer::new(
            clip.channels(),
            clip.sample_rate(),
            clip.samples().to_vec(),
        ));
        Ok(Box::new(SinkPlayback { sink, clock }))
    }
}

struct SinkPlayback {
    sink: Sink,
    clock: ClockPlayback,
}

impl Playback for SinkPlayback {
    fn position(&self) -> Duration {
        self.clock.position()
    }

    fn is_finished(&self) -> bool {
        self.clock.is_finished() || self.sink.empty()
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.clock.stop();
    }
}

/// Playback that only tracks time.
#[derive(Debug, Clone, Copy)]
pub struct ClockPlayback {
    started: Instant,
    duration: Duration,
    stopped: bool,
}

impl ClockPlayback {
    pub fn start(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
            stopped: false,
        }
    }
}

impl Playback for ClockPlayback {
    fn position(&self) -> Duration {
        self.started.elapsed().min(self.duration)
    }

    fn is_finished(&self) -> bool {
        self.stopped || self.started.elapsed() >= self.duration
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[derive(Debug, Default)]
struct ManualClock {
    position: Cell<Duration>,
    stopped: Cell<bool>,
    plays: Cell<u32>,
}

/// Output driven by the caller instead of a device clock.
///
/// Used for offline envelope recording and deterministic tests: the position
/// only moves when [`ManualOutput::advance`] is called.
#[derive(Debug, Clone, Default)]
pub struct ManualOutput {
    clock: Rc<ManualClock>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.position.set(self.clock.position.get() + by);
    }

    pub fn position(&self) -> Duration {
        self.clock.position.get()
    }

    /// Number of clips started so far.
    pub fn plays(&self) -> u32 {
        self.clock.plays.get()
    }

    pub fn was_stopped(&self) -> bool {
        self.clock.stopped.get()
    }
}

impl AudioOutput for ManualOutput {
    fn play(&mut self, clip: &AudioClip) -> Result<Box<dyn Playback>, LipSyncError> {
        self.clock.position.set(Duration::ZERO);
        self.clock.stopped.set(false);
        self.clock.plays.set(self.clock.plays.get() + 1);
        Ok(Box::new(ManualPlayback {
            clock: self.clock.clone(),
            duration: clip.duration(),
        }))
    }
}

struct ManualPlayback {
    clock: Rc<ManualClock>,
    duration: Duration,
}

impl Playback for ManualPlayback {
    fn position(&self) -> Duration {
        self.clock.position.get().min(self.duration)
    }

    fn is_finished(&self) -> bool {
        self.clock.stopped.get() || self.clock.position.get() >= self.duration
    }

    fn stop(&mut self) {
        self.clock.stopped.set(true);
    }
}
