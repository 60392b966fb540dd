use std::time::Instant;

/// Time state for one frame. Seconds throughout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Time since the previous tick.
    pub dt: f32,
    /// Time since the ticker started or was reset.
    pub elapsed: f32,
    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Abstraction over where frame timing originates from.
pub trait Ticker {
    /// Resets the ticker to its initial state.
    fn reset(&mut self);
    /// Produces the timing of the next frame.
    fn tick(&mut self) -> FrameTick;
}

/// Ticker backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTicker {
    origin: Instant,
    last: Option<Instant>,
    frame: u64,
}

impl SystemTicker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            last: None,
            frame: 0,
        }
    }
}

impl Ticker for SystemTicker {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn tick(&mut self) -> FrameTick {
        let now = Instant::now();
        // The first frame has nothing to measure against.
        let dt = self
            .last
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last = Some(now);
        let tick = FrameTick {
            dt,
            elapsed: now.duration_since(self.origin).as_secs_f32(),
            frame_index: self.frame,
        };
        self.frame = self.frame.saturating_add(1);
        tick
    }
}

/// Ticker that advances by a fixed step each frame.
#[derive(Debug, Clone, Copy)]
pub struct FixedTicker {
    step: f32,
    elapsed: f32,
    frame: u64,
}

impl FixedTicker {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            elapsed: 0.0,
            frame: 0,
        }
    }

    pub fn step(&self) -> f32 {
        self.step
    }
}

impl Ticker for FixedTicker {
    fn reset(&mut self) {
        self.elapsed = 0.0;
        self.frame = 0;
    }

    fn tick(&mut self) -> FrameTick {
        self.elapsed += self.step;
        let tick = FrameTick {
            dt: self.step,
            elapsed: self.elapsed,
            frame_index: self.frame,
        };
        self.frame = self.frame.saturating_add(1);
        tick
    }
}
