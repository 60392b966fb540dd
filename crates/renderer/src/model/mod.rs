//! One loaded model: its engine handles, textures, look-at and lip-sync state.
//!
//! A `ModelRuntime` only exists once the whole load pipeline succeeded (see
//! [`load`]). It is owned by a canvas and mutated from the frame thread, both
//! by `render` and by [`crate::MotionControl`] calls between frames.

mod frame;
mod hit;
pub mod load;
mod sound;

pub use frame::CanvasFrame;
pub use hit::FrameSnapshot;

use std::collections::{BTreeMap, HashMap};

use lipsync::{AudioClip, LipSync, LipSyncError};
use modelpack::{ModelSettings, ResourceFetcher, SharedSource};
use tracing::{debug, warn};

use crate::events::MotionEvent;
use crate::math::{ModelMatrix, Vec2};
use crate::orientation::{Orientation, Target};
use crate::puppet::{MotionPriority, MotionQueue, ParameterEffect, Puppet, SharedMotion};
use crate::texture::TextureEntry;

use self::load::UserData;
use self::sound::{PendingSound, SoundPoll};

/// Standard parameter ids written by the runtime.
pub mod params {
    pub const ANGLE_X: &str = "ParamAngleX";
    pub const ANGLE_Y: &str = "ParamAngleY";
    pub const ANGLE_Z: &str = "ParamAngleZ";
    pub const BODY_ANGLE_X: &str = "ParamBodyAngleX";
    pub const EYE_BALL_X: &str = "ParamEyeBallX";
    pub const EYE_BALL_Y: &str = "ParamEyeBallY";
    pub const BREATH: &str = "ParamBreath";
}

/// Per-model settings applied when the load finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    /// Defaults to the manifest file name.
    pub name: Option<String>,
    pub scale: f32,
    pub position: Vec2,
    /// Speed used when the canvas routes the pointer to the gaze target.
    pub gaze_speed: f32,
    pub body_speed: f32,
    pub premultiplied_alpha: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            name: None,
            scale: 1.0,
            position: Vec2::ZERO,
            gaze_speed: 0.0,
            body_speed: 0.0,
            premultiplied_alpha: true,
        }
    }
}

pub struct ModelRuntime {
    pub(crate) name: String,
    pub(crate) settings: ModelSettings,
    pub(crate) source: SharedSource,
    pub(crate) fetcher: ResourceFetcher,
    pub(crate) puppet: Box<dyn Puppet>,
    pub(crate) expressions: Vec<(String, SharedMotion)>,
    pub(crate) motions: HashMap<(String, usize), SharedMotion>,
    pub(crate) motion_groups: BTreeMap<String, usize>,
    pub(crate) motion_queue: Box<dyn MotionQueue>,
    pub(crate) expression_queue: Box<dyn MotionQueue>,
    pub(crate) eye_blink: Option<Box<dyn ParameterEffect>>,
    pub(crate) breath: Box<dyn ParameterEffect>,
    pub(crate) physics: Option<Box<dyn ParameterEffect>>,
    pub(crate) pose: Option<Box<dyn ParameterEffect>>,
    pub(crate) user_data: Option<UserData>,
    pub(crate) lip_sync_ids: Vec<String>,
    pub(crate) textures: Vec<Option<TextureEntry>>,
    pub(crate) premultiplied: bool,
    pub(crate) model_matrix: ModelMatrix,
    pub(crate) gaze: Orientation,
    pub(crate) body: Orientation,
    pub(crate) gaze_speed: f32,
    pub(crate) body_speed: f32,
    pub(crate) lip_sync: LipSync,
    pub(crate) pending_sound: Option<PendingSound>,
    pub(crate) scale: f32,
    pub(crate) pan: Vec2,
    pub(crate) show_hit_areas: bool,
    pub(crate) snapshot: Option<FrameSnapshot>,
    pub(crate) pending_events: Vec<MotionEvent>,
    pub(crate) active_motion: Option<(String, usize)>,
    pub(crate) disposed: bool,
}

impl ModelRuntime {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn textures(&self) -> &[Option<TextureEntry>] {
        &self.textures
    }

    pub fn list_expressions(&self) -> Vec<String> {
        self.expressions.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Starts the named expression; unknown names are logged and ignored.
    pub fn set_expression(&mut self, name: &str) -> bool {
        if self.disposed {
            return false;
        }
        let Some((_, expression)) = self.expressions.iter().find(|(n, _)| n == name) else {
            warn!(model = %self.name, expression = name, "unknown expression");
            return false;
        };
        debug!(model = %self.name, expression = name, "expression started");
        self.expression_queue
            .start(expression.clone(), MotionPriority::Normal)
    }

    pub fn list_motion_groups(&self) -> BTreeMap<String, usize> {
        self.motion_groups.clone()
    }

    /// Starts a motion. Returns false for unknown motions and when the queue
    /// rejects the priority.
    pub fn start_motion(&mut self, group: &str, index: usize, priority: MotionPriority) -> bool {
        if self.disposed {
            return false;
        }
        let key = (group.to_string(), index);
        let Some(motion) = self.motions.get(&key).cloned() else {
            warn!(model = %self.name, group, index, "unknown motion");
            return false;
        };
        if !self.motion_queue.start(motion, priority) {
            debug!(model = %self.name, group, index, ?priority, "motion rejected by priority");
            return false;
        }
        if let Some((group, index)) = self.active_motion.take() {
            self.pending_events
                .push(MotionEvent::Finished { group, index });
        }
        self.pending_events.push(MotionEvent::Started {
            group: key.0.clone(),
            index,
        });
        self.active_motion = Some(key);
        true
    }

    /// Starts a motion and, if the manifest bundles a sound with it, fetches
    /// that sound in the background. Lip sync follows the sound from the
    /// first frame after it decoded; a sound that fails to load only logs.
    pub fn start_motion_with_sound(
        &mut self,
        group: &str,
        index: usize,
        priority: MotionPriority,
    ) -> bool {
        if !self.start_motion(group, index, priority) {
            return false;
        }
        let Some(sound) = self.settings.motion_sound(group, index).map(str::to_string) else {
            return true;
        };
        let result = self
            .source
            .resolve_uri(&sound)
            .map_err(LipSyncError::from)
            .and_then(|uri| self.fetch_sound(uri));
        if let Err(error) = result {
            warn!(model = %self.name, %sound, %error, "motion sound could not be played");
        }
        true
    }

    /// Replaces any sound still being fetched.
    fn fetch_sound(&mut self, uri: String) -> Result<(), LipSyncError> {
        debug!(model = %self.name, %uri, "fetching lip sync audio");
        self.pending_sound = Some(PendingSound::spawn(self.fetcher.clone(), uri)?);
        Ok(())
    }

    /// Starts playback once the background fetch delivered a clip.
    pub(crate) fn attach_pending_sound(&mut self) {
        let Some(pending) = self.pending_sound.as_ref() else {
            return;
        };
        let result = match pending.poll() {
            SoundPoll::Waiting => return,
            SoundPoll::Ready(result) => result,
            SoundPoll::Lost => {
                warn!(
                    model = %self.name,
                    uri = pending.uri(),
                    "audio fetch worker exited without a result"
                );
                self.pending_sound = None;
                return;
            }
        };
        let Some(pending) = self.pending_sound.take() else {
            return;
        };
        match result.and_then(|clip| self.lip_sync.start_clip(clip)) {
            Ok(()) => debug!(model = %self.name, uri = pending.uri(), "lip sync audio attached"),
            Err(error) => warn!(
                model = %self.name,
                uri = pending.uri(),
                %error,
                "lip sync audio could not be played"
            ),
        }
    }

    /// True while a sound is being fetched or decoded in the background.
    pub fn is_loading_sound(&self) -> bool {
        self.pending_sound.is_some()
    }

    pub fn set_gaze_target(&mut self, target: Target, speed: f32) {
        if !self.disposed {
            self.gaze.set_target(target, speed);
        }
    }

    pub fn set_body_target(&mut self, target: Target, speed: f32) {
        if !self.disposed {
            self.body.set_target(target, speed);
        }
    }

    pub fn gaze(&self) -> &Orientation {
        &self.gaze
    }

    pub fn body(&self) -> &Orientation {
        &self.body
    }

    /// Points gaze and body at a page position using the configured speeds.
    pub fn look_at(&mut self, x: f32, y: f32) {
        let target = Target::Absolute { x, y };
        self.set_gaze_target(target, self.gaze_speed);
        self.set_body_target(target, self.body_speed);
    }

    pub fn set_lip_value(&mut self, value: f32, speed: f32) {
        if !self.disposed {
            self.lip_sync.set_manual(value, speed);
        }
    }

    /// Queues a background fetch; the error covers only a worker that could
    /// not be started. Fetch and decode failures are logged when polled.
    pub fn start_lip_sync_from_url(&mut self, url: &str) -> Result<(), LipSyncError> {
        if self.disposed {
            return Ok(());
        }
        self.fetch_sound(url.to_string())
    }

    pub fn start_lip_sync_from_buffer(&mut self, bytes: Vec<u8>) -> Result<(), LipSyncError> {
        if self.disposed {
            return Ok(());
        }
        self.lip_sync.start_from_bytes(bytes)?;
        self.pending_sound = None;
        Ok(())
    }

    pub fn start_lip_sync_clip(&mut self, clip: AudioClip) -> Result<(), LipSyncError> {
        if self.disposed {
            return Ok(());
        }
        self.lip_sync.start_clip(clip)?;
        self.pending_sound = None;
        Ok(())
    }

    /// Stops audio and drops any sound still being fetched.
    pub fn stop_lip_sync(&mut self) {
        self.pending_sound = None;
        self.lip_sync.stop();
    }

    pub fn is_speaking(&self) -> bool {
        self.lip_sync.is_speaking()
    }

    pub fn set_scale(&mut self, scale: f32) {
        if !self.disposed {
            self.scale = scale;
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Pan in normalised device units; (1, 0) moves by half the canvas width.
    pub fn set_position(&mut self, x: f32, y: f32) {
        if !self.disposed {
            self.pan = Vec2::new(x, y);
        }
    }

    pub fn position(&self) -> Vec2 {
        self.pan
    }

    pub fn set_show_hit_areas(&mut self, show: bool) {
        self.show_hit_areas = show;
    }

    pub fn list_hit_area_names(&self) -> Vec<String> {
        self.settings
            .hit_areas()
            .iter()
            .map(|area| area.name.clone())
            .collect()
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    pub fn last_snapshot(&self) -> Option<&FrameSnapshot> {
        self.snapshot.as_ref()
    }

    pub(crate) fn take_events(&mut self) -> Vec<MotionEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Stops audio and motions and releases the source's materialised URIs.
    /// Textures stay in the canvas cache. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.pending_sound = None;
        self.lip_sync.dispose();
        self.motion_queue.stop_all();
        self.expression_queue.stop_all();
        self.source.dispose();
        self.snapshot = None;
        self.active_motion = None;
        debug!(model = %self.name, "model disposed");
    }
}
