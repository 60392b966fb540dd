//! 2D transforms shared by the canvas, the model runtime and hit-testing.
//!
//! `Matrix44` stores a column-major 4x4 matrix. Only the scale and translation
//! terms are ever non-trivial, so the `transform_*` helpers read those
//! directly instead of doing a full multiply.

/// Point or offset in any of the coordinate spaces.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in model space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Bounding box of a point cloud; `None` when empty.
    pub fn from_points(points: &[[f32; 2]]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first[0], first[1], first[0], first[1]);
        for point in &points[1..] {
            min_x = min_x.min(point[0]);
            min_y = min_y.min(point[1]);
            max_x = max_x.max(point[0]);
            max_y = max_y.max(point[1]);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix44 {
    tr: [f32; 16],
}

impl Default for Matrix44 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix44 {
    pub const fn identity() -> Self {
        Self {
            tr: [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    pub fn load_identity(&mut self) {
        *self = Self::identity();
    }

    pub fn array(&self) -> &[f32; 16] {
        &self.tr
    }

    /// Returns `b * a` in column-major terms, i.e. `a` is applied first.
    pub fn multiply(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
        let mut dst = [0.0f32; 16];
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    dst[j + i * 4] += a[k + i * 4] * b[j + k * 4];
                }
            }
        }
        dst
    }

    /// `self = self * m`: `m` is applied to points before `self`.
    pub fn multiply_by_matrix(&mut self, m: &Matrix44) {
        self.tr = Self::multiply(&m.tr, &self.tr);
    }

    /// `self = m * self`: `m` is applied to points after `self`.
    pub fn premultiply_by_matrix(&mut self, m: &Matrix44) {
        self.tr = Self::multiply(&self.tr, &m.tr);
    }

    pub fn scale_x(&self) -> f32 {
        self.tr[0]
    }

    pub fn scale_y(&self) -> f32 {
        self.tr[5]
    }

    pub fn translate_x_value(&self) -> f32 {
        self.tr[12]
    }

    pub fn translate_y_value(&self) -> f32 {
        self.tr[13]
    }

    pub fn transform_x(&self, src: f32) -> f32 {
        self.tr[0] * src + self.tr[12]
    }

    pub fn transform_y(&self, src: f32) -> f32 {
        self.tr[5] * src + self.tr[13]
    }

    pub fn invert_transform_x(&self, src: f32) -> f32 {
        (src - self.tr[12]) / self.tr[0]
    }

    pub fn invert_transform_y(&self, src: f32) -> f32 {
        (src - self.tr[13]) / self.tr[5]
    }

    pub fn transform(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.transform_x(p.x), self.transform_y(p.y))
    }

    pub fn invert_transform(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.invert_transform_x(p.x), self.invert_transform_y(p.y))
    }

    pub fn translate_relative(&mut self, x: f32, y: f32) {
        let mut m = Self::identity();
        m.tr[12] = x;
        m.tr[13] = y;
        self.multiply_by_matrix(&m);
    }

    pub fn scale_relative(&mut self, x: f32, y: f32) {
        let mut m = Self::identity();
        m.tr[0] = x;
        m.tr[5] = y;
        self.multiply_by_matrix(&m);
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        self.tr[12] = x;
        self.tr[13] = y;
    }

    pub fn translate_x(&mut self, x: f32) {
        self.tr[12] = x;
    }

    pub fn translate_y(&mut self, y: f32) {
        self.tr[13] = y;
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.tr[0] = x;
        self.tr[5] = y;
    }
}

/// Maps the logical screen rectangle onto device space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMatrix {
    matrix: Matrix44,
    screen: [f32; 4],
    max_screen: [f32; 4],
    min_scale: f32,
    max_scale: f32,
}

impl Default for ViewMatrix {
    fn default() -> Self {
        Self {
            matrix: Matrix44::identity(),
            screen: [-1.0, 1.0, -1.0, 1.0],
            max_screen: [-2.0, 2.0, -2.0, 2.0],
            min_scale: 0.8,
            max_scale: 2.0,
        }
    }
}

impl ViewMatrix {
    /// Logical rectangle covered by the viewport (left, right, bottom, top).
    pub fn set_screen_rect(&mut self, left: f32, right: f32, bottom: f32, top: f32) {
        self.screen = [left, right, bottom, top];
    }

    pub fn set_max_screen_rect(&mut self, left: f32, right: f32, bottom: f32, top: f32) {
        self.max_screen = [left, right, bottom, top];
    }

    pub fn set_scale_limits(&mut self, min: f32, max: f32) {
        self.min_scale = min;
        self.max_scale = max;
    }

    pub fn screen_rect(&self) -> [f32; 4] {
        self.screen
    }

    pub fn max_screen_rect(&self) -> [f32; 4] {
        self.max_screen
    }

    pub fn is_max_scale(&self) -> bool {
        self.matrix.scale_x() >= self.max_scale
    }

    pub fn is_min_scale(&self) -> bool {
        self.matrix.scale_x() <= self.min_scale
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.matrix.scale(x, y);
    }

    pub fn matrix(&self) -> &Matrix44 {
        &self.matrix
    }

    pub fn transform(&self, p: Vec2) -> Vec2 {
        self.matrix.transform(p)
    }

    pub fn invert_transform(&self, p: Vec2) -> Vec2 {
        self.matrix.invert_transform(p)
    }
}

/// Places a model's canvas (in model units) into logical space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelMatrix {
    matrix: Matrix44,
    width: f32,
    height: f32,
}

impl ModelMatrix {
    /// Starts two logical units tall, the full viewport height.
    pub fn new(width: f32, height: f32) -> Self {
        let mut model = Self {
            matrix: Matrix44::identity(),
            width,
            height,
        };
        model.set_height(2.0);
        model
    }

    pub fn matrix(&self) -> &Matrix44 {
        &self.matrix
    }

    pub fn set_width(&mut self, w: f32) {
        let scale = w / self.width;
        self.matrix.scale(scale, scale);
    }

    pub fn set_height(&mut self, h: f32) {
        let scale = h / self.height;
        self.matrix.scale(scale, scale);
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.matrix.translate(x, y);
    }

    pub fn set_center_position(&mut self, x: f32, y: f32) {
        self.center_x(x);
        self.center_y(y);
    }

    pub fn top(&mut self, y: f32) {
        self.matrix.translate_y(y);
    }

    pub fn bottom(&mut self, y: f32) {
        let h = self.height * self.matrix.scale_y();
        self.matrix.translate_y(y - h);
    }

    pub fn left(&mut self, x: f32) {
        self.matrix.translate_x(x);
    }

    pub fn right(&mut self, x: f32) {
        let w = self.width * self.matrix.scale_x();
        self.matrix.translate_x(x - w);
    }

    pub fn center_x(&mut self, x: f32) {
        let w = self.width * self.matrix.scale_x();
        self.matrix.translate_x(x - w / 2.0);
    }

    pub fn center_y(&mut self, y: f32) {
        let h = self.height * self.matrix.scale_y();
        self.matrix.translate_y(y - h / 2.0);
    }

    /// Applies manifest layout hints. Size keys go first so position keys
    /// see the final scale. Keys match case-insensitively, with or without
    /// underscores (`CenterX` and `center_x` are the same key).
    pub fn setup_from_layout<'a>(
        &mut self,
        layout: impl IntoIterator<Item = (&'a str, f32)> + Clone,
    ) {
        for (key, value) in layout.clone() {
            match normalize_layout_key(key).as_str() {
                "width" => self.set_width(value),
                "height" => self.set_height(value),
                _ => {}
            }
        }
        for (key, value) in layout {
            match normalize_layout_key(key).as_str() {
                "x" => self.matrix.translate_x(value),
                "y" => self.matrix.translate_y(value),
                "centerx" => self.center_x(value),
                "centery" => self.center_y(value),
                "top" => self.top(value),
                "bottom" => self.bottom(value),
                "left" => self.left(value),
                "right" => self.right(value),
                _ => {}
            }
        }
    }
}

fn normalize_layout_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
