//! Graphics-device boundary used by the canvas and the texture cache.
//!
//! [`crate::gpu::WgpuDevice`] is the real implementation; tests drive the
//! runtime through a recording device instead.

use crate::math::Rect;
use crate::puppet::BlendMode;

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to initialise GPU: {0:#}")]
    Init(#[from] anyhow::Error),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("texture {width}x{height} exceeds the device limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("texture upload has no mip levels")]
    EmptyTexture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// One level of a CPU-built mip chain, tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TextureUpload {
    pub label: String,
    /// Level 0 first.
    pub levels: Vec<MipLevel>,
}

/// A single textured mesh draw, already projected by `mvp`.
#[derive(Debug, Clone, Copy)]
pub struct MeshDraw<'a> {
    pub mvp: [f32; 16],
    pub texture: Option<TextureHandle>,
    pub positions: &'a [[f32; 2]],
    pub uvs: &'a [[f32; 2]],
    pub indices: &'a [u16],
    pub opacity: f32,
    pub blend: BlendMode,
    pub premultiplied: bool,
}

pub trait GraphicsDevice {
    fn upload_texture(&mut self, upload: &TextureUpload) -> Result<TextureHandle, GpuError>;

    /// Unknown handles are ignored.
    fn release_texture(&mut self, handle: TextureHandle);

    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<(), GpuError>;

    fn draw_mesh(&mut self, draw: &MeshDraw<'_>);

    /// Axis-aligned outline of `rect` (model space) projected by `mvp`.
    fn draw_outline(&mut self, mvp: &[f32; 16], rect: Rect, color: [f32; 4]);

    fn end_frame(&mut self) -> Result<(), GpuError>;

    fn resize(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);
}
