use crate::control::MotionControl;
use crate::model::load::LoadError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionEvent {
    Started { group: String, index: usize },
    /// The queue drained, or a newer motion replaced this one.
    Finished { group: String, index: usize },
}

/// Hit areas under a pointer press, in manifest order. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct HitEvent {
    pub areas: Vec<String>,
    pub x: f32,
    pub y: f32,
}

/// Receives a model's lifecycle events.
///
/// Callbacks run on the frame thread after the model's state is released, so
/// a listener may call back into the [`MotionControl`] it was given.
pub trait ModelListener {
    /// The whole load pipeline succeeded and the model is registered.
    fn on_load(&mut self, _control: MotionControl) {}

    /// The load failed; nothing was registered.
    fn on_error(&mut self, _error: &LoadError) {}

    fn on_motion(&mut self, _event: &MotionEvent) {}

    fn on_hit(&mut self, _event: &HitEvent) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ModelListener for NoopListener {}
