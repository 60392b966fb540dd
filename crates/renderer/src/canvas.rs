//! A canvas owns one graphics device and every model drawn on it.
//!
//! ```text
//!   load_model ─▶ spawn_load (worker) ──LoadOutcome──▶ pending
//!                                                        │ polled by render
//!   render(dt) ─▶ PreparedModel::finish ─▶ ModelSlot ─▶ on_load(MotionControl)
//!             └─▶ begin_frame ─▶ ModelRuntime::render ×N ─▶ end_frame
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use lipsync::{AudioOutput, RodioOutput};
use modelpack::ResourceFetcher;
use scheduler::FrameTarget;
use tracing::{debug, error, info, warn};

use crate::control::MotionControl;
use crate::device::GraphicsDevice;
use crate::events::{HitEvent, ModelListener};
use crate::math::{Matrix44, Vec2, ViewMatrix};
use crate::model::load::{spawn_load, LoadError, LoadOutcome, LoadRequest};
use crate::model::{CanvasFrame, ModelOptions, ModelRuntime};
use crate::puppet::PuppetEngine;
use crate::texture::TextureCache;

/// How pointer input drives the models' look-at targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerMode {
    #[default]
    Off,
    /// Every pointer move retargets gaze and body.
    Follow,
    /// Only presses retarget.
    Click,
}

pub type AudioFactory = Rc<dyn Fn() -> Box<dyn AudioOutput>>;

/// Shared collaborators created once by the embedding application and handed
/// to every canvas.
#[derive(Clone)]
pub struct RuntimeContext {
    pub engine: Arc<dyn PuppetEngine>,
    pub fetcher: ResourceFetcher,
    pub audio: AudioFactory,
}

impl RuntimeContext {
    /// Models play sound through the default output device.
    pub fn new(engine: Arc<dyn PuppetEngine>, fetcher: ResourceFetcher) -> Self {
        Self {
            engine,
            fetcher,
            audio: Rc::new(|| Box::new(RodioOutput::new())),
        }
    }

    pub fn with_audio(mut self, audio: AudioFactory) -> Self {
        self.audio = audio;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

struct ModelSlot {
    id: ModelId,
    runtime: Rc<RefCell<ModelRuntime>>,
    listener: Box<dyn ModelListener>,
}

struct PendingLoad {
    id: ModelId,
    receiver: Receiver<LoadOutcome>,
    listener: Box<dyn ModelListener>,
    options: ModelOptions,
}

pub struct CanvasManager {
    context: RuntimeContext,
    device: Box<dyn GraphicsDevice>,
    textures: TextureCache,
    view: ViewMatrix,
    device_to_canvas: Matrix44,
    last_ratio: Option<f32>,
    width: u32,
    height: u32,
    offset: Vec2,
    clear_color: [f32; 4],
    pointer_mode: PointerMode,
    show_hit_areas: bool,
    models: Vec<ModelSlot>,
    pending: Vec<PendingLoad>,
    next_id: u64,
    disposed: bool,
}

impl CanvasManager {
    pub fn new(context: RuntimeContext, device: Box<dyn GraphicsDevice>) -> Self {
        let (width, height) = device.size();
        let mut canvas = Self {
            context,
            device,
            textures: TextureCache::new(),
            view: ViewMatrix::default(),
            device_to_canvas: Matrix44::identity(),
            last_ratio: None,
            width: 0,
            height: 0,
            offset: Vec2::ZERO,
            clear_color: [0.0; 4],
            pointer_mode: PointerMode::Off,
            show_hit_areas: false,
            models: Vec::new(),
            pending: Vec::new(),
            next_id: 0,
            disposed: false,
        };
        canvas.update_geometry(width, height);
        canvas
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn view(&self) -> &ViewMatrix {
        &self.view
    }

    pub fn device_to_canvas(&self) -> &Matrix44 {
        &self.device_to_canvas
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.textures
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Page position of the canvas' top-left corner.
    pub fn set_offset(&mut self, x: f32, y: f32) {
        self.offset = Vec2::new(x, y);
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn set_pointer_mode(&mut self, mode: PointerMode) {
        self.pointer_mode = mode;
    }

    pub fn pointer_mode(&self) -> PointerMode {
        self.pointer_mode
    }

    pub fn set_show_hit_areas(&mut self, show: bool) {
        self.show_hit_areas = show;
        for slot in &self.models {
            if let Ok(mut runtime) = slot.runtime.try_borrow_mut() {
                runtime.set_show_hit_areas(show);
            }
        }
    }

    pub fn show_hit_areas(&self) -> bool {
        self.show_hit_areas
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.disposed || width == 0 || height == 0 {
            return;
        }
        self.device.resize(width, height);
        self.update_geometry(width, height);
    }

    /// Rebuilds the device-to-canvas matrix, and the view matrix only when the
    /// aspect ratio changed.
    fn update_geometry(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        let w = self.width as f32;
        let h = self.height as f32;
        let ratio = w / h;

        if self.last_ratio != Some(ratio) {
            let mut view = ViewMatrix::default();
            view.set_screen_rect(-ratio, ratio, -1.0, 1.0);
            view.scale(1.0, 1.0);
            view.set_max_screen_rect(-2.0, 2.0, -2.0, 2.0);
            self.view = view;
            self.last_ratio = Some(ratio);
            debug!(width, height, ratio, "view matrix rebuilt");
        }

        // The logical rect spans [-ratio, ratio] x [-1, 1], so one device
        // pixel is 2 / h logical units on both axes.
        let scale = 2.0 / h;
        self.device_to_canvas.load_identity();
        self.device_to_canvas.scale_relative(scale, -scale);
        self.device_to_canvas.translate_relative(-w / 2.0, -h / 2.0);
    }

    /// Starts loading a model. The listener hears `on_load` or `on_error`
    /// from a later `render`. A request without any source is rejected here.
    pub fn load_model(
        &mut self,
        request: LoadRequest,
        options: ModelOptions,
        listener: Box<dyn ModelListener>,
    ) -> Result<ModelId, LoadError> {
        let receiver = spawn_load(
            self.context.engine.clone(),
            request,
            self.context.fetcher.clone(),
        )?;
        let id = ModelId(self.next_id);
        self.next_id += 1;
        debug!(model_id = %id, "model load started");
        self.pending.push(PendingLoad {
            id,
            receiver,
            listener,
            options,
        });
        Ok(id)
    }

    /// Drops a pending load. The worker runs to completion but its result is
    /// discarded.
    pub fn cancel_load(&mut self, id: ModelId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| pending.id != id);
        let cancelled = self.pending.len() != before;
        if cancelled {
            debug!(model_id = %id, "model load cancelled");
        }
        cancelled
    }

    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    /// Finishes every load whose worker has reported.
    pub fn poll_loads(&mut self) {
        let mut index = 0;
        while index < self.pending.len() {
            match self.pending[index].receiver.try_recv() {
                Ok(outcome) => {
                    let pending = self.pending.remove(index);
                    self.complete_load(pending, outcome);
                }
                Err(TryRecvError::Empty) => index += 1,
                Err(TryRecvError::Disconnected) => {
                    let pending = self.pending.remove(index);
                    self.complete_load(pending, Err(LoadError::WorkerDisconnected));
                }
            }
        }
    }

    /// Blocks until every pending load reported or `timeout` passed. Returns
    /// the number of loads still pending.
    pub fn wait_for_loads(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        while let Some(pending) = self.pending.first() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match pending.receiver.recv_timeout(remaining) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => Err(LoadError::WorkerDisconnected),
            };
            let pending = self.pending.remove(0);
            self.complete_load(pending, outcome);
        }
        self.pending.len()
    }

    fn complete_load(&mut self, pending: PendingLoad, outcome: LoadOutcome) {
        let PendingLoad {
            id,
            listener: mut listener,
            options,
            ..
        } = pending;
        let finished = outcome.and_then(|prepared| {
            prepared.finish(
                self.device.as_mut(),
                &mut self.textures,
                (self.context.audio)(),
                self.context.fetcher.clone(),
                &options,
            )
        });
        match finished {
            Ok(mut runtime) => {
                runtime.set_show_hit_areas(self.show_hit_areas);
                info!(model_id = %id, model = %runtime.name(), "model registered on canvas");
                let runtime = Rc::new(RefCell::new(runtime));
                listener.on_load(MotionControl::new(&runtime));
                self.models.push(ModelSlot {
                    id,
                    runtime,
                    listener,
                });
            }
            Err(err) => {
                error!(model_id = %id, error = %err, "model load failed");
                listener.on_error(&err);
            }
        }
    }

    pub fn model_ids(&self) -> Vec<ModelId> {
        self.models.iter().map(|slot| slot.id).collect()
    }

    pub fn model(&self, id: ModelId) -> Option<MotionControl> {
        self.models
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| MotionControl::new(&slot.runtime))
    }

    /// Unregisters and disposes a model. Outstanding `MotionControl` handles
    /// become no-ops.
    pub fn remove_model(&mut self, id: ModelId) -> bool {
        let Some(index) = self.models.iter().position(|slot| slot.id == id) else {
            return false;
        };
        let slot = self.models.remove(index);
        if let Ok(mut runtime) = slot.runtime.try_borrow_mut() {
            runtime.dispose();
        }
        debug!(model_id = %id, "model removed from canvas");
        true
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        if self.pointer_mode != PointerMode::Follow {
            return;
        }
        self.look_at(x, y);
    }

    /// Retargets look-at in click mode and reports hit areas to listeners.
    pub fn pointer_down(&mut self, x: f32, y: f32) {
        if self.pointer_mode == PointerMode::Click {
            self.look_at(x, y);
        }
        for slot in &mut self.models {
            let areas = match slot.runtime.try_borrow() {
                Ok(runtime) => runtime.hit_test(x, y),
                Err(_) => continue,
            };
            if !areas.is_empty() {
                debug!(model_id = %slot.id, ?areas, "hit areas pressed");
                slot.listener.on_hit(&HitEvent { areas, x, y });
            }
        }
    }

    fn look_at(&mut self, x: f32, y: f32) {
        for slot in &self.models {
            if let Ok(mut runtime) = slot.runtime.try_borrow_mut() {
                runtime.look_at(x, y);
            }
        }
    }

    /// Draws one frame: finishes ready loads, clears, renders every model and
    /// then delivers queued motion events.
    pub fn render(&mut self, dt: f32) {
        if self.disposed {
            return;
        }
        self.poll_loads();

        if let Err(err) = self.device.begin_frame(self.clear_color) {
            warn!(error = %err, "skipping frame");
            return;
        }
        let frame = CanvasFrame {
            view: &self.view,
            device_to_canvas: &self.device_to_canvas,
            width: self.width,
            height: self.height,
            offset: self.offset,
        };
        for slot in &mut self.models {
            let events = {
                let Ok(mut runtime) = slot.runtime.try_borrow_mut() else {
                    continue;
                };
                runtime.render(dt, &frame, self.device.as_mut());
                runtime.take_events()
            };
            for event in &events {
                slot.listener.on_motion(event);
            }
        }
        if let Err(err) = self.device.end_frame() {
            warn!(error = %err, "failed to present frame");
        }
    }

    /// Removes every model, drops pending loads and releases all textures.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for slot in self.models.drain(..) {
            if let Ok(mut runtime) = slot.runtime.try_borrow_mut() {
                runtime.dispose();
            }
        }
        self.pending.clear();
        self.textures.dispose(self.device.as_mut());
        self.disposed = true;
        debug!("canvas disposed");
    }
}

impl FrameTarget for CanvasManager {
    fn render(&mut self, dt: f32) {
        CanvasManager::render(self, dt);
    }
}

impl Drop for CanvasManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
