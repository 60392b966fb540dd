//! wgpu backend for [`crate::GraphicsDevice`].
//!
//! - `context` owns the wgpu instance, device and surface and reconfigures
//!   the swapchain on resize.
//! - `pipeline` builds one textured-mesh pipeline per blend mode and alpha
//!   convention plus a line pipeline for hit-area outlines.
//! - `uniforms` mirrors the per-draw WGSL uniform block.
//! - `device` records draws during a frame and submits them in one pass.
//!
//! Clipping masks are not rendered; masked drawables draw unclipped.

mod context;
mod device;
mod pipeline;
mod uniforms;

pub use device::WgpuDevice;
