use lipsync::approach;

use crate::math::{Matrix44, Vec2, ViewMatrix};

/// Where a model should look or lean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// Page coordinates in pixels.
    Absolute { x: f32, y: f32 },
    /// Normalised offsets in `[-1, 1]`, +y up.
    Relative { x: f32, y: f32 },
}

impl Default for Target {
    fn default() -> Self {
        Target::Relative { x: 0.0, y: 0.0 }
    }
}

/// Canvas geometry an orientation step needs from the current frame.
#[derive(Debug, Clone, Copy)]
pub struct OrientationFrame<'a> {
    pub view: &'a ViewMatrix,
    pub device_to_canvas: &'a Matrix44,
    pub width: f32,
    pub height: f32,
    pub offset: Vec2,
    /// User pan in logical units.
    pub pan: Vec2,
}

/// Interpolated look-at state. `current` lives in canvas pixels so that
/// absolute and relative targets share one space. It starts at the canvas
/// centre on the first update.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orientation {
    target: Target,
    speed: f32,
    current: Option<Vec2>,
}

impl Orientation {
    pub fn set_target(&mut self, target: Target, speed: f32) {
        self.target = target;
        self.speed = speed.max(0.0);
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Canvas-pixel position, before reprojection. `None` until the first
    /// update.
    pub fn current(&self) -> Option<Vec2> {
        self.current
    }

    fn relative_goal(frame: &OrientationFrame<'_>, x: f32, y: f32) -> Vec2 {
        let device = frame.view.transform(Vec2::new(x, y));
        frame.device_to_canvas.invert_transform(device)
    }

    fn goal(&self, frame: &OrientationFrame<'_>) -> Vec2 {
        match self.target {
            Target::Relative { x, y } => Self::relative_goal(frame, x, y),
            Target::Absolute { x, y } => Vec2::new(
                x - frame.offset.x - frame.pan.x * frame.width / 2.0,
                y - frame.offset.y + frame.pan.y * frame.height / 2.0,
            ),
        }
    }

    /// Advances one frame and returns the value in logical model space.
    pub fn update(&mut self, frame: &OrientationFrame<'_>, dt: f32) -> Vec2 {
        let goal = self.goal(frame);
        let start = self
            .current
            .unwrap_or_else(|| Self::relative_goal(frame, 0.0, 0.0));
        let current = Vec2::new(
            approach(start.x, goal.x, self.speed, dt),
            approach(start.y, goal.y, self.speed, dt),
        );
        self.current = Some(current);
        frame
            .view
            .invert_transform(frame.device_to_canvas.transform(current))
    }
}
