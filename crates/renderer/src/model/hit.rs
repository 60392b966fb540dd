use crate::math::{Matrix44, ModelMatrix, Vec2, ViewMatrix};

use super::ModelRuntime;

/// Transforms of the last rendered frame. Hit-testing always answers for the
/// frame the user saw, never a recomputed one.
#[derive(Debug, Clone, Copy)]
pub struct FrameSnapshot {
    pub view: ViewMatrix,
    pub device_to_canvas: Matrix44,
    pub width: f32,
    pub height: f32,
    pub offset: Vec2,
    pub model_matrix: ModelMatrix,
    pub scale: f32,
    pub pan: Vec2,
}

impl FrameSnapshot {
    /// Logical (view) coordinates of a page position with pan and zoom undone.
    pub fn page_to_logical(&self, page_x: f32, page_y: f32) -> Vec2 {
        let mut local = Vec2::new(page_x - self.offset.x, page_y - self.offset.y);
        // Screen y grows downward, the logical axis upward.
        local.x -= self.pan.x * self.width / 2.0;
        local.y += self.pan.y * self.height / 2.0;
        let logical = self
            .view
            .invert_transform(self.device_to_canvas.transform(local));
        Vec2::new(logical.x / self.scale, logical.y / self.scale)
    }

    pub fn page_to_model(&self, page_x: f32, page_y: f32) -> Vec2 {
        let logical = self.page_to_logical(page_x, page_y);
        self.model_matrix.matrix().invert_transform(logical)
    }
}

impl ModelRuntime {
    /// Names of the hit areas under a page position, in manifest order.
    /// Empty before the first rendered frame.
    pub fn hit_test(&self, page_x: f32, page_y: f32) -> Vec<String> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Vec::new();
        };
        let point = snapshot.page_to_model(page_x, page_y);
        self.settings
            .hit_areas()
            .iter()
            .filter(|area| self.puppet.hit_drawable(&area.id, point.x, point.y))
            .map(|area| area.name.clone())
            .collect()
    }
}
