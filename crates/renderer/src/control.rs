//! Public control surface for one model.
//!
//! `MotionControl` holds a weak handle: every call is a no-op (returning an
//! empty or default value) once the model has been removed from its canvas,
//! or while the runtime is busy rendering. UI code can keep stale handles
//! around across model switches without special casing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use lipsync::{AudioClip, LipSyncError};
use tracing::debug;

use crate::model::load::UserData;
use crate::model::ModelRuntime;
use crate::orientation::Target;
use crate::puppet::MotionPriority;

#[derive(Clone, Default)]
pub struct MotionControl {
    runtime: Weak<RefCell<ModelRuntime>>,
}

impl std::fmt::Debug for MotionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionControl")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl MotionControl {
    pub(crate) fn new(runtime: &Rc<RefCell<ModelRuntime>>) -> Self {
        Self {
            runtime: Rc::downgrade(runtime),
        }
    }

    /// A handle not bound to any model.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|runtime| runtime.try_borrow().is_ok_and(|r| !r.is_disposed()))
    }

    fn with<R>(&self, f: impl FnOnce(&ModelRuntime) -> R) -> Option<R> {
        let runtime = self.runtime.upgrade()?;
        let guard = runtime.try_borrow().ok()?;
        if guard.is_disposed() {
            return None;
        }
        Some(f(&guard))
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut ModelRuntime) -> R) -> Option<R> {
        let Some(runtime) = self.runtime.upgrade() else {
            debug!("control call on a removed model ignored");
            return None;
        };
        let mut guard = runtime.try_borrow_mut().ok()?;
        if guard.is_disposed() {
            return None;
        }
        Some(f(&mut guard))
    }

    pub fn name(&self) -> Option<String> {
        self.with(|r| r.name().to_string())
    }

    pub fn list_expressions(&self) -> Vec<String> {
        self.with(ModelRuntime::list_expressions).unwrap_or_default()
    }

    pub fn set_expression(&self, name: &str) {
        self.with_mut(|r| r.set_expression(name));
    }

    pub fn list_motion_groups(&self) -> BTreeMap<String, usize> {
        self.with(ModelRuntime::list_motion_groups)
            .unwrap_or_default()
    }

    /// Returns whether the motion started.
    pub fn set_motion(&self, group: &str, index: usize, priority: MotionPriority) -> bool {
        self.with_mut(|r| r.start_motion(group, index, priority))
            .unwrap_or(false)
    }

    pub fn set_motion_with_sound(
        &self,
        group: &str,
        index: usize,
        priority: MotionPriority,
    ) -> bool {
        self.with_mut(|r| r.start_motion_with_sound(group, index, priority))
            .unwrap_or(false)
    }

    /// Looks at a page position.
    pub fn set_gaze_target(&self, x: f32, y: f32, speed: f32) {
        self.with_mut(|r| r.set_gaze_target(Target::Absolute { x, y }, speed));
    }

    /// Looks toward normalised `[-1, 1]` offsets from the canvas centre.
    pub fn set_gaze_target_relative(&self, x: f32, y: f32, speed: f32) {
        self.with_mut(|r| r.set_gaze_target(Target::Relative { x, y }, speed));
    }

    pub fn set_body_orientation_target(&self, x: f32, y: f32, speed: f32) {
        self.with_mut(|r| r.set_body_target(Target::Absolute { x, y }, speed));
    }

    pub fn set_body_orientation_target_relative(&self, x: f32, y: f32, speed: f32) {
        self.with_mut(|r| r.set_body_target(Target::Relative { x, y }, speed));
    }

    pub fn set_lip_value(&self, value: f32, speed: f32) {
        self.with_mut(|r| r.set_lip_value(value, speed));
    }

    /// Fetches and decodes on a worker; playback starts on the first frame
    /// after the clip is ready. A failed fetch is logged and leaves any
    /// playing audio untouched.
    pub fn start_lip_sync_from_url(&self, url: &str) -> Result<(), LipSyncError> {
        self.with_mut(|r| r.start_lip_sync_from_url(url))
            .unwrap_or(Ok(()))
    }

    pub fn start_lip_sync_from_buffer(&self, bytes: Vec<u8>) -> Result<(), LipSyncError> {
        self.with_mut(|r| r.start_lip_sync_from_buffer(bytes))
            .unwrap_or(Ok(()))
    }

    /// Plays a clip decoded elsewhere, e.g. with [`AudioClip::fetch`] on a
    /// worker thread.
    pub fn start_lip_sync_clip(&self, clip: AudioClip) -> Result<(), LipSyncError> {
        self.with_mut(|r| r.start_lip_sync_clip(clip))
            .unwrap_or(Ok(()))
    }

    pub fn stop_lip_sync(&self) {
        self.with_mut(ModelRuntime::stop_lip_sync);
    }

    pub fn is_loading_sound(&self) -> bool {
        self.with(ModelRuntime::is_loading_sound).unwrap_or(false)
    }

    pub fn is_speaking(&self) -> bool {
        self.with(ModelRuntime::is_speaking).unwrap_or(false)
    }

    pub fn set_scale(&self, scale: f32) {
        self.with_mut(|r| r.set_scale(scale));
    }

    pub fn set_position(&self, x: f32, y: f32) {
        self.with_mut(|r| r.set_position(x, y));
    }

    pub fn hit_test(&self, page_x: f32, page_y: f32) -> Vec<String> {
        self.with(|r| r.hit_test(page_x, page_y))
            .unwrap_or_default()
    }

    pub fn set_show_hit_areas(&self, show: bool) {
        self.with_mut(|r| r.set_show_hit_areas(show));
    }

    pub fn list_hit_area_names(&self) -> Vec<String> {
        self.with(ModelRuntime::list_hit_area_names)
            .unwrap_or_default()
    }

    pub fn user_data(&self) -> Option<UserData> {
        self.with(|r| r.user_data().cloned()).flatten()
    }
}
