mod ticker;

pub use ticker::{FixedTicker, FrameTick, SystemTicker, Ticker};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use stageconfig::StageConfig;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("target '{0}' is already registered")]
    DuplicateTarget(String),
    #[error("target '{0}' is not registered")]
    UnknownTarget(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        TargetId(id.into())
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything driven once per frame by the [`Runner`].
pub trait FrameTarget {
    fn render(&mut self, dt: f32);
}

pub type SharedTarget = Rc<RefCell<dyn FrameTarget>>;

/// The single frame clock. Every tick samples the ticker once and renders
/// every registered target with the same delta.
pub struct Runner {
    ticker: Box<dyn Ticker>,
    targets: Vec<(TargetId, SharedTarget)>,
    frame_interval: Duration,
    last_tick: Option<FrameTick>,
}

impl Runner {
    pub fn new(ticker: Box<dyn Ticker>, frame_interval: Duration) -> Self {
        Self {
            ticker,
            targets: Vec::new(),
            frame_interval,
            last_tick: None,
        }
    }

    pub fn from_config(config: &StageConfig, ticker: Box<dyn Ticker>) -> Self {
        Self::new(ticker, config.runner.frame_interval)
    }

    pub fn register(&mut self, id: TargetId, target: SharedTarget) -> Result<(), SchedulerError> {
        if self.is_registered(&id) {
            return Err(SchedulerError::DuplicateTarget(id.0));
        }
        debug!(target_id = %id, "frame target registered");
        self.targets.push((id, target));
        Ok(())
    }

    /// Stops future renders of `id`. Work the target started earlier is not
    /// cancelled.
    pub fn unregister(&mut self, id: &TargetId) -> Result<SharedTarget, SchedulerError> {
        let index = self
            .targets
            .iter()
            .position(|(existing, _)| existing == id)
            .ok_or_else(|| SchedulerError::UnknownTarget(id.0.clone()))?;
        debug!(target_id = %id, "frame target unregistered");
        Ok(self.targets.remove(index).1)
    }

    pub fn is_registered(&self, id: &TargetId) -> bool {
        self.targets.iter().any(|(existing, _)| existing == id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn last_tick(&self) -> Option<FrameTick> {
        self.last_tick
    }

    /// Runs one frame.
    pub fn tick(&mut self) -> FrameTick {
        let tick = self.ticker.tick();
        // Snapshot so a target may be unregistered by its owner between ticks
        // without invalidating this frame's iteration.
        let targets: Vec<SharedTarget> = self.targets.iter().map(|(_, t)| t.clone()).collect();
        for target in targets {
            target.borrow_mut().render(tick.dt);
        }
        self.last_tick = Some(tick);
        tick
    }

    /// Ticks on the configured interval until `keep_running` returns false.
    pub fn run_while(&mut self, mut keep_running: impl FnMut(&FrameTick) -> bool) -> u64 {
        let mut frames = 0;
        loop {
            let started = Instant::now();
            let tick = self.tick();
            frames += 1;
            if !keep_running(&tick) {
                return frames;
            }
            if let Some(remaining) = self.frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
    }
}
