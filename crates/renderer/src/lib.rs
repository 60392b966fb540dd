//! Puppet runtime: loads parametric 2D models, animates them every frame and
//! draws them through a [`GraphicsDevice`].
//!
//! The overall flow is:
//!
//! ```text
//!   scheduler::Runner tick
//!          │ render(dt)
//!          ▼
//!   CanvasManager ──▶ poll loads ──▶ ModelRuntime::render ×N ──▶ GraphicsDevice
//!          ▲                               │
//!          │ LoadOutcome                   ├─▶ motion / expression queues (engine)
//!   worker thread: prepare_model           ├─▶ gaze, body, breath, physics, lip sync, pose
//!          ▲                               └─▶ projection ─▶ draw_mesh / draw_outline
//!          │ AssetSource (modelpack)
//! ```
//!
//! Curve evaluation, physics and mesh deformation belong to a [`PuppetEngine`]
//! supplied by the embedding application. UI code drives each model through
//! the [`MotionControl`] handed to [`ModelListener::on_load`].

mod canvas;
mod control;
mod device;
mod events;
pub mod gpu;
pub mod math;
pub mod model;
mod orientation;
mod puppet;
mod stage;
mod texture;

pub use canvas::{AudioFactory, CanvasManager, ModelId, PointerMode, RuntimeContext};
pub use control::MotionControl;
pub use device::{GpuError, GraphicsDevice, MeshDraw, MipLevel, TextureHandle, TextureUpload};
pub use events::{HitEvent, ModelListener, MotionEvent, NoopListener};
pub use gpu::WgpuDevice;
pub use model::load::{
    breath_profile, load_blocking, prepare_model, ArchiveInput, LoadError, LoadRequest, LoadStage,
    PreparedModel, UserData, UserDataEntry,
};
pub use model::{params, CanvasFrame, FrameSnapshot, ModelOptions, ModelRuntime};
pub use orientation::{Orientation, OrientationFrame, Target};
pub use puppet::{
    BlendMode, BreathChannel, DrawableView, EngineError, EngineResult, Motion, MotionPriority,
    MotionQueue, MotionSpec, ParameterEffect, Puppet, PuppetEngine, SharedMotion,
};
pub use texture::{decode_texture, TextureCache, TextureEntry, TextureError, TextureKey};
