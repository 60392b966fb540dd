use crate::device::{GraphicsDevice, MeshDraw};
use crate::events::MotionEvent;
use crate::math::{Matrix44, Vec2, ViewMatrix};
use crate::orientation::OrientationFrame;

use super::hit::FrameSnapshot;
use super::{params, ModelRuntime};

const HIT_AREA_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const LIP_SYNC_WEIGHT: f32 = 0.8;

/// Canvas state handed to every model for one frame.
#[derive(Debug, Clone, Copy)]
pub struct CanvasFrame<'a> {
    pub view: &'a ViewMatrix,
    pub device_to_canvas: &'a Matrix44,
    pub width: u32,
    pub height: u32,
    /// Page position of the canvas' top-left corner.
    pub offset: Vec2,
}

impl ModelRuntime {
    /// Computes this frame's parameters, draws the model and records the
    /// transform snapshot used by hit-testing.
    pub fn render(&mut self, dt: f32, frame: &CanvasFrame<'_>, device: &mut dyn GraphicsDevice) {
        if self.disposed {
            return;
        }
        self.attach_pending_sound();
        self.update_parameters(dt, frame);
        self.puppet.update();

        let mvp = self.projection(frame);
        self.draw(&mvp, device);

        self.snapshot = Some(FrameSnapshot {
            view: *frame.view,
            device_to_canvas: *frame.device_to_canvas,
            width: frame.width as f32,
            height: frame.height as f32,
            offset: frame.offset,
            model_matrix: self.model_matrix,
            scale: self.scale,
            pan: self.pan,
        });
    }

    fn update_parameters(&mut self, dt: f32, frame: &CanvasFrame<'_>) {
        let puppet = self.puppet.as_mut();

        puppet.load_parameters();
        let mut motion_updated = false;
        if !self.motion_queue.is_finished() {
            motion_updated = self.motion_queue.update(puppet, dt);
        }
        puppet.save_parameters();
        if self.motion_queue.is_finished() {
            if let Some((group, index)) = self.active_motion.take() {
                self.pending_events
                    .push(MotionEvent::Finished { group, index });
            }
        }

        if !motion_updated {
            if let Some(eye_blink) = self.eye_blink.as_mut() {
                eye_blink.apply(puppet, dt);
            }
        }

        self.expression_queue.update(puppet, dt);

        let orientation_frame = OrientationFrame {
            view: frame.view,
            device_to_canvas: frame.device_to_canvas,
            width: frame.width as f32,
            height: frame.height as f32,
            offset: frame.offset,
            pan: self.pan,
        };
        let body = self.body.update(&orientation_frame, dt);
        puppet.add_parameter(params::ANGLE_X, body.x * 30.0, 1.0);
        puppet.add_parameter(params::ANGLE_Y, body.y * 30.0, 1.0);
        puppet.add_parameter(params::ANGLE_Z, body.x * body.y * -30.0, 1.0);
        puppet.add_parameter(params::BODY_ANGLE_X, body.x * 10.0, 1.0);

        let gaze = self.gaze.update(&orientation_frame, dt);
        puppet.add_parameter(params::EYE_BALL_X, gaze.x, 1.0);
        puppet.add_parameter(params::EYE_BALL_Y, gaze.y, 1.0);

        self.breath.apply(puppet, dt);

        if let Some(physics) = self.physics.as_mut() {
            physics.apply(puppet, dt);
        }

        let lip = self.lip_sync.update(dt);
        for id in &self.lip_sync_ids {
            puppet.set_parameter(id, lip, LIP_SYNC_WEIGHT);
        }

        if let Some(pose) = self.pose.as_mut() {
            pose.apply(puppet, dt);
        }
    }

    /// Aspect correction, canvas view, user zoom, model placement, then pan
    /// in device units.
    fn projection(&mut self, frame: &CanvasFrame<'_>) -> Matrix44 {
        let width = frame.width as f32;
        let height = frame.height as f32;
        let (canvas_width, _) = self.puppet.canvas_size();

        let mut projection = Matrix44::identity();
        if canvas_width > 1.0 && width < height {
            self.model_matrix.set_width(2.0);
            projection.scale(1.0, width / height);
        } else {
            projection.scale(height / width, 1.0);
        }
        projection.multiply_by_matrix(frame.view.matrix());

        let mut zoom = Matrix44::identity();
        zoom.scale(self.scale, self.scale);
        projection.multiply_by_matrix(&zoom);
        projection.multiply_by_matrix(self.model_matrix.matrix());

        let mut pan = Matrix44::identity();
        pan.translate(self.pan.x, self.pan.y);
        projection.premultiply_by_matrix(&pan);
        projection
    }

    fn draw(&self, mvp: &Matrix44, device: &mut dyn GraphicsDevice) {
        let mvp = *mvp.array();
        let mut drawables = self.puppet.drawables();
        drawables.sort_by_key(|drawable| drawable.render_order);
        for drawable in drawables {
            if !drawable.visible || drawable.opacity <= 0.0 {
                continue;
            }
            let texture = self
                .textures
                .get(drawable.texture_index)
                .and_then(Option::as_ref)
                .map(|entry| entry.handle);
            device.draw_mesh(&MeshDraw {
                mvp,
                texture,
                positions: drawable.positions,
                uvs: drawable.uvs,
                indices: drawable.indices,
                opacity: drawable.opacity,
                blend: drawable.blend,
                premultiplied: self.premultiplied,
            });
        }

        if self.show_hit_areas {
            for area in self.settings.hit_areas() {
                if let Some(rect) = self.puppet.drawable_bounds(&area.id) {
                    device.draw_outline(&mvp, rect, HIT_AREA_COLOR);
                }
            }
        }
    }
}
