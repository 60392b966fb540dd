use std::collections::HashMap;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};
use wgpu::util::{BufferInitDescriptor, DeviceExt, TextureDataOrder};

use crate::device::{GpuError, GraphicsDevice, MeshDraw, TextureHandle, TextureUpload};
use crate::math::Rect;

use super::context::GpuContext;
use super::pipeline::{PipelineKey, Pipelines};
use super::uniforms::MeshUniforms;

const OUTLINE_INDICES: [u16; 8] = [0, 1, 1, 2, 2, 3, 3, 0];

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

enum RecordedDraw {
    Mesh {
        key: PipelineKey,
        bind_group: wgpu::BindGroup,
        positions: wgpu::Buffer,
        uvs: wgpu::Buffer,
        indices: wgpu::Buffer,
        count: u32,
    },
    Outline {
        bind_group: wgpu::BindGroup,
        positions: wgpu::Buffer,
        indices: wgpu::Buffer,
    },
}

struct Frame {
    surface: wgpu::SurfaceTexture,
    clear: wgpu::Color,
    draws: Vec<RecordedDraw>,
}

/// [`GraphicsDevice`] on a wgpu surface.
///
/// Draws are recorded while models render and submitted in a single pass by
/// `end_frame`.
pub struct WgpuDevice {
    context: GpuContext,
    pipelines: Pipelines,
    sampler: wgpu::Sampler,
    placeholder: GpuTexture,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_handle: u64,
    frame: Option<Frame>,
}

impl WgpuDevice {
    pub fn new<W>(window: W, width: u32, height: u32) -> Result<Self, GpuError>
    where
        W: wgpu::WindowHandle + 'static,
    {
        let context = GpuContext::new(window, width, height)?;
        Ok(Self::with_context(context))
    }

    /// # Safety
    ///
    /// The window and display behind `target` must outlive the device.
    pub unsafe fn from_raw<T>(target: &T, width: u32, height: u32) -> Result<Self, GpuError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = unsafe { GpuContext::from_raw(target, width, height)? };
        Ok(Self::with_context(context))
    }

    fn with_context(context: GpuContext) -> Self {
        let pipelines = Pipelines::new(&context.device, context.surface_format);
        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("puppet texture sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let placeholder = create_texture(
            &context,
            "placeholder texture",
            1,
            1,
            1,
            &[255, 255, 255, 255],
        );
        Self {
            context,
            pipelines,
            sampler,
            placeholder,
            textures: HashMap::new(),
            next_handle: 1,
            frame: None,
        }
    }

    fn uniform_bind_group(
        &self,
        uniforms: &MeshUniforms,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        let device = &self.context.device;
        let buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("mesh uniforms"),
            contents: bytemuck::bytes_of(uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh bind group"),
            layout: &self.pipelines.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn vertex_buffer(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        self.context.device.create_buffer_init(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }
}

fn create_texture(
    context: &GpuContext,
    label: &str,
    width: u32,
    height: u32,
    mip_level_count: u32,
    data: &[u8],
) -> GpuTexture {
    let texture = context.device.create_texture_with_data(
        &context.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        _texture: texture,
        view,
    }
}

impl GraphicsDevice for WgpuDevice {
    fn upload_texture(&mut self, upload: &TextureUpload) -> Result<TextureHandle, GpuError> {
        let base = upload.levels.first().ok_or(GpuError::EmptyTexture)?;
        let max = self.context.max_texture_dimension;
        if base.width > max || base.height > max {
            return Err(GpuError::TextureTooLarge {
                width: base.width,
                height: base.height,
                max,
            });
        }
        let data: Vec<u8> = upload
            .levels
            .iter()
            .flat_map(|level| level.rgba.iter().copied())
            .collect();
        let texture = create_texture(
            &self.context,
            &upload.label,
            base.width,
            base.height,
            upload.levels.len() as u32,
            &data,
        );
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle).is_none() {
            debug!(?handle, "release of unknown texture ignored");
        }
    }

    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<(), GpuError> {
        let surface = match self.context.surface.get_current_texture() {
            Ok(surface) => surface,
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                warn!(error = %err, "surface lost; reconfiguring");
                self.context.reconfigure();
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        let [r, g, b, a] = clear.map(f64::from);
        self.frame = Some(Frame {
            surface,
            clear: wgpu::Color { r, g, b, a },
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw_mesh(&mut self, draw: &MeshDraw<'_>) {
        if self.frame.is_none() || draw.indices.is_empty() || draw.positions.is_empty() {
            return;
        }
        let view = draw
            .texture
            .and_then(|handle| self.textures.get(&handle))
            .unwrap_or(&self.placeholder)
            .view
            .clone();
        let uniforms = MeshUniforms::mesh(&draw.mvp, draw.opacity, draw.premultiplied);
        let bind_group = self.uniform_bind_group(&uniforms, &view);
        let positions = self.vertex_buffer(
            "mesh positions",
            bytemuck::cast_slice(draw.positions),
            wgpu::BufferUsages::VERTEX,
        );
        let uvs = self.vertex_buffer(
            "mesh uvs",
            bytemuck::cast_slice(draw.uvs),
            wgpu::BufferUsages::VERTEX,
        );
        let indices = self.vertex_buffer(
            "mesh indices",
            bytemuck::cast_slice(draw.indices),
            wgpu::BufferUsages::INDEX,
        );
        let recorded = RecordedDraw::Mesh {
            key: PipelineKey {
                blend: draw.blend,
                premultiplied: draw.premultiplied,
            },
            bind_group,
            positions,
            uvs,
            indices,
            count: draw.indices.len() as u32,
        };
        if let Some(frame) = self.frame.as_mut() {
            frame.draws.push(recorded);
        }
    }

    fn draw_outline(&mut self, mvp: &[f32; 16], rect: Rect, color: [f32; 4]) {
        if self.frame.is_none() {
            return;
        }
        let corners: [[f32; 2]; 4] = [
            [rect.x, rect.y],
            [rect.x + rect.width, rect.y],
            [rect.x + rect.width, rect.y + rect.height],
            [rect.x, rect.y + rect.height],
        ];
        let uniforms = MeshUniforms::outline(mvp, color);
        let bind_group = self.uniform_bind_group(&uniforms, &self.placeholder.view);
        let positions = self.vertex_buffer(
            "outline positions",
            bytemuck::cast_slice(&corners),
            wgpu::BufferUsages::VERTEX,
        );
        let indices = self.vertex_buffer(
            "outline indices",
            bytemuck::cast_slice(&OUTLINE_INDICES),
            wgpu::BufferUsages::INDEX,
        );
        if let Some(frame) = self.frame.as_mut() {
            frame.draws.push(RecordedDraw::Outline {
                bind_group,
                positions,
                indices,
            });
        }
    }

    fn end_frame(&mut self) -> Result<(), GpuError> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        let view = frame
            .surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("puppet frame encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("puppet render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            for draw in &frame.draws {
                match draw {
                    RecordedDraw::Mesh {
                        key,
                        bind_group,
                        positions,
                        uvs,
                        indices,
                        count,
                    } => {
                        let Some(pipeline) = self.pipelines.mesh(*key) else {
                            continue;
                        };
                        render_pass.set_pipeline(pipeline);
                        render_pass.set_bind_group(0, bind_group, &[]);
                        render_pass.set_vertex_buffer(0, positions.slice(..));
                        render_pass.set_vertex_buffer(1, uvs.slice(..));
                        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                        render_pass.draw_indexed(0..*count, 0, 0..1);
                    }
                    RecordedDraw::Outline {
                        bind_group,
                        positions,
                        indices,
                    } => {
                        render_pass.set_pipeline(&self.pipelines.outline);
                        render_pass.set_bind_group(0, bind_group, &[]);
                        render_pass.set_vertex_buffer(0, positions.slice(..));
                        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                        render_pass.draw_indexed(0..OUTLINE_INDICES.len() as u32, 0, 0..1);
                    }
                }
            }
        }
        self.context.queue.submit(Some(encoder.finish()));
        frame.surface.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }

    fn size(&self) -> (u32, u32) {
        (self.context.config.width, self.context.config.height)
    }
}
