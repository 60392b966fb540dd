use bytemuck::{Pod, Zeroable};

/// Per-draw uniform block, mirrored by `MeshUniforms` in the WGSL source.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct MeshUniforms {
    pub mvp: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// x: opacity, y: 1.0 when the bound texture is premultiplied.
    pub flags: [f32; 4],
}

impl MeshUniforms {
    pub fn mesh(mvp: &[f32; 16], opacity: f32, premultiplied: bool) -> Self {
        Self {
            mvp: columns(mvp),
            color: [1.0; 4],
            flags: [opacity, if premultiplied { 1.0 } else { 0.0 }, 0.0, 0.0],
        }
    }

    pub fn outline(mvp: &[f32; 16], color: [f32; 4]) -> Self {
        Self {
            mvp: columns(mvp),
            color,
            flags: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

fn columns(m: &[f32; 16]) -> [[f32; 4]; 4] {
    [
        [m[0], m[1], m[2], m[3]],
        [m[4], m[5], m[6], m[7]],
        [m[8], m[9], m[10], m[11]],
        [m[12], m[13], m[14], m[15]],
    ]
}
