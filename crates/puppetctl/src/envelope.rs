//! `puppetctl lipsync`: samples the mouth-openness envelope of an audio clip the way a
//! model's lip sync would see it, frame by frame on the scheduler's clock.
//!
//! Types:
//!
//! - `EnvelopeSample` is one frame's time and mouth value.
//! - `EnvelopeRecorder` is the frame target that drives [`LipSync`] and records its output.
//!
//! Functions:
//!
//! - `run` backs the subcommand.
//! - `record_offline` samples a clip on a fixed step without touching an audio device.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use lipsync::{AudioClip, AudioOutput, LipSync, ManualOutput, RodioOutput};
use scheduler::{FixedTicker, FrameTarget, Runner, SystemTicker, TargetId, Ticker};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::LipsyncArgs;
use crate::run::open_fetcher;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvelopeSample {
    pub time: f32,
    pub value: f32,
}

pub struct EnvelopeRecorder {
    lip_sync: LipSync,
    clock: Option<ManualOutput>,
    elapsed: f32,
    samples: Vec<EnvelopeSample>,
}

impl EnvelopeRecorder {
    fn start(
        clip: AudioClip,
        output: Box<dyn AudioOutput>,
        clock: Option<ManualOutput>,
    ) -> Result<Self> {
        let mut lip_sync = LipSync::new(output);
        lip_sync
            .start_clip(clip)
            .context("failed to start audio playback")?;
        Ok(Self {
            lip_sync,
            clock,
            elapsed: 0.0,
            samples: Vec::new(),
        })
    }

    fn is_speaking(&self) -> bool {
        self.lip_sync.is_speaking()
    }
}

impl FrameTarget for EnvelopeRecorder {
    fn render(&mut self, dt: f32) {
        let value = self.lip_sync.update(dt);
        self.samples.push(EnvelopeSample {
            time: self.elapsed,
            value,
        });
        // The manual clock stands in for the device: move it after sampling.
        if let Some(clock) = &self.clock {
            clock.advance(Duration::from_secs_f32(dt));
        }
        self.elapsed += dt;
    }
}

pub fn run(args: LipsyncArgs) -> Result<()> {
    let fetcher = open_fetcher()?;
    let clip = AudioClip::fetch(&fetcher, &args.audio)
        .with_context(|| format!("failed to load audio {}", args.audio))?;
    info!(
        channels = clip.channels(),
        sample_rate = clip.sample_rate(),
        duration_ms = clip.duration().as_millis() as u64,
        "audio decoded"
    );

    let samples = if args.play {
        record_playing(clip, args.fps)?
    } else {
        record_offline(clip, args.fps)?
    };

    for sample in &samples {
        println!("{}", format_sample(sample, args.width));
    }
    let peak = samples.iter().map(|s| s.value).fold(0.0f32, f32::max);
    println!("{} frame(s), peak {:.3}", samples.len(), peak);
    Ok(())
}

/// Samples `clip` at `fps` against a manual clock; returns immediately.
pub fn record_offline(clip: AudioClip, fps: u32) -> Result<Vec<EnvelopeSample>> {
    let clock = ManualOutput::new();
    let recorder = EnvelopeRecorder::start(clip, Box::new(clock.clone()), Some(clock))?;
    let ticker = FixedTicker::new(1.0 / fps as f32);
    drive(recorder, Box::new(ticker), Duration::ZERO)
}

fn record_playing(clip: AudioClip, fps: u32) -> Result<Vec<EnvelopeSample>> {
    let output = RodioOutput::new();
    if !output.has_device() {
        warn!("no audio device; sampling on the wall clock without sound");
    }
    let recorder = EnvelopeRecorder::start(clip, Box::new(output), None)?;
    drive(
        recorder,
        Box::new(SystemTicker::new()),
        Duration::from_secs_f64(1.0 / fps as f64),
    )
}

fn drive(
    recorder: EnvelopeRecorder,
    ticker: Box<dyn Ticker>,
    interval: Duration,
) -> Result<Vec<EnvelopeSample>> {
    let recorder = Rc::new(RefCell::new(recorder));
    let mut runner = Runner::new(ticker, interval);
    let id = TargetId::new("lipsync");
    runner.register(id.clone(), recorder.clone())?;
    runner.run_while(|_| recorder.borrow().is_speaking());
    runner.unregister(&id)?;

    let mut recorder = recorder.borrow_mut();
    recorder.lip_sync.dispose();
    Ok(std::mem::take(&mut recorder.samples))
}

fn format_sample(sample: &EnvelopeSample, width: usize) -> String {
    let filled = (sample.value.clamp(0.0, 1.0) * width as f32).round() as usize;
    format!("{:>8.3}s {:>6.3} {}", sample.time, sample.value, "#".repeat(filled))
}
