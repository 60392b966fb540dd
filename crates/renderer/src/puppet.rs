//! Narrow interface to the puppet engine.
//!
//! The engine evaluates motion curves, physics, pose, breath and eye-blink
//! and owns the deformed mesh data. The runtime only ever talks to it through
//! the traits in this module, so any engine (or a test fake) can be plugged in
//! via [`PuppetEngine`].

use std::sync::Arc;

use crate::math::Rect;

/// Error returned by engine collaborators. Engines report free-form messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiplicative,
}

/// One drawable mesh as deformed by the last `Puppet::update`.
#[derive(Debug, Clone, Copy)]
pub struct DrawableView<'a> {
    pub id: &'a str,
    pub texture_index: usize,
    pub render_order: i32,
    pub opacity: f32,
    pub blend: BlendMode,
    pub visible: bool,
    /// Model-space vertex positions.
    pub positions: &'a [[f32; 2]],
    pub uvs: &'a [[f32; 2]],
    pub indices: &'a [u16],
}

/// A loaded model instance.
pub trait Puppet: Send {
    /// Canvas size in model units.
    fn canvas_size(&self) -> (f32, f32);

    fn parameter(&self, id: &str) -> Option<f32>;

    /// Moves the parameter toward `value`; `weight == 1` overwrites it.
    fn set_parameter(&mut self, id: &str, value: f32, weight: f32);

    /// Adds `value * weight` to the parameter.
    fn add_parameter(&mut self, id: &str, value: f32, weight: f32);

    /// Restores the parameter snapshot taken by `save_parameters`.
    fn load_parameters(&mut self);

    fn save_parameters(&mut self);

    /// Commits parameters and deforms the meshes.
    fn update(&mut self);

    fn drawables(&self) -> Vec<DrawableView<'_>>;

    /// Bounding box of a drawable in model space.
    fn drawable_bounds(&self, id: &str) -> Option<Rect>;

    /// Point-in-shape test in model space.
    fn hit_drawable(&self, id: &str, x: f32, y: f32) -> bool;
}

/// A compiled motion or expression. Evaluation happens inside the engine's
/// [`MotionQueue`]; the runtime only keeps and hands out handles.
pub trait Motion: Send + Sync {
    /// Length in seconds, `None` for looping motions.
    fn duration(&self) -> Option<f32>;
}

pub type SharedMotion = Arc<dyn Motion>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MotionPriority {
    None = 0,
    Idle = 1,
    #[default]
    Normal = 2,
    Force = 3,
}

/// Plays motions (or expressions) with cross-fading.
pub trait MotionQueue: Send {
    /// Returns false when a motion of equal or higher priority is already
    /// playing.
    fn start(&mut self, motion: SharedMotion, priority: MotionPriority) -> bool;

    /// Advances the queue; returns true if any parameter was written.
    fn update(&mut self, puppet: &mut dyn Puppet, dt: f32) -> bool;

    fn is_finished(&self) -> bool;

    fn stop_all(&mut self);
}

/// Eye blink, breath, physics and pose all write parameters once per frame.
pub trait ParameterEffect: Send {
    fn apply(&mut self, puppet: &mut dyn Puppet, dt: f32);
}

/// One sinusoidal breath channel.
#[derive(Debug, Clone, PartialEq)]
pub struct BreathChannel {
    pub parameter: String,
    pub offset: f32,
    pub peak: f32,
    pub cycle: f32,
    pub weight: f32,
}

impl BreathChannel {
    pub fn new(parameter: &str, offset: f32, peak: f32, cycle: f32, weight: f32) -> Self {
        Self {
            parameter: parameter.to_string(),
            offset,
            peak,
            cycle,
            weight,
        }
    }
}

/// What a motion is compiled with besides its curve data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MotionSpec {
    pub name: String,
    pub group: String,
    pub index: usize,
    pub fade_in: Option<f32>,
    pub fade_out: Option<f32>,
    pub eye_blink_ids: Vec<String>,
    pub lip_sync_ids: Vec<String>,
}

/// Factory for every engine-side collaborator of a model.
pub trait PuppetEngine: Send + Sync {
    fn load_model(&self, bytes: &[u8]) -> EngineResult<Box<dyn Puppet>>;

    fn load_expression(&self, bytes: &[u8], name: &str) -> EngineResult<SharedMotion>;

    fn load_motion(&self, bytes: &[u8], spec: &MotionSpec) -> EngineResult<SharedMotion>;

    fn load_physics(&self, bytes: &[u8]) -> EngineResult<Box<dyn ParameterEffect>>;

    fn load_pose(&self, bytes: &[u8]) -> EngineResult<Box<dyn ParameterEffect>>;

    fn create_eye_blink(&self, parameter_ids: &[String]) -> Box<dyn ParameterEffect>;

    fn create_breath(&self, channels: &[BreathChannel]) -> Box<dyn ParameterEffect>;

    fn create_motion_queue(&self) -> Box<dyn MotionQueue>;
}
