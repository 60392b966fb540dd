use std::collections::HashMap;

use crate::puppet::BlendMode;

const MESH_SHADER: &str = r#"
struct MeshUniforms {
    mvp: mat4x4<f32>,
    color: vec4<f32>,
    flags: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: MeshUniforms;
@group(0) @binding(1) var t_diffuse: texture_2d<f32>;
@group(0) @binding(2) var s_diffuse: sampler;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_mesh(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = u.mvp * vec4<f32>(position, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@fragment
fn fs_mesh(in: VertexOut) -> @location(0) vec4<f32> {
    let texel = textureSample(t_diffuse, s_diffuse, in.uv) * u.color;
    let opacity = u.flags.x;
    if (u.flags.y > 0.5) {
        return texel * opacity;
    }
    return vec4<f32>(texel.rgb, texel.a * opacity);
}

@vertex
fn vs_line(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return u.mvp * vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_line() -> @location(0) vec4<f32> {
    return u.color;
}
"#;

const POSITION_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 8,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 0,
        shader_location: 0,
    }],
};

const UV_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 8,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 0,
        shader_location: 1,
    }],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub blend: BlendMode,
    pub premultiplied: bool,
}

/// Every mesh pipeline variant plus the hit-area outline pipeline, built once
/// per device.
pub(crate) struct Pipelines {
    pub bind_group_layout: wgpu::BindGroupLayout,
    meshes: HashMap<PipelineKey, wgpu::RenderPipeline>,
    pub outline: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh shader"),
            source: wgpu::ShaderSource::Wgsl(MESH_SHADER.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let mut meshes = HashMap::new();
        for blend in [BlendMode::Normal, BlendMode::Additive, BlendMode::Multiplicative] {
            for premultiplied in [true, false] {
                let key = PipelineKey {
                    blend,
                    premultiplied,
                };
                let pipeline = create_pipeline(
                    device,
                    &layout,
                    &module,
                    surface_format,
                    PipelineShape::Mesh(blend_state(key)),
                );
                meshes.insert(key, pipeline);
            }
        }
        let outline = create_pipeline(
            device,
            &layout,
            &module,
            surface_format,
            PipelineShape::Outline,
        );

        Self {
            bind_group_layout,
            meshes,
            outline,
        }
    }

    pub fn mesh(&self, key: PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.meshes.get(&key)
    }
}

enum PipelineShape {
    Mesh(wgpu::BlendState),
    Outline,
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    surface_format: wgpu::TextureFormat,
    shape: PipelineShape,
) -> wgpu::RenderPipeline {
    let (label, vs, fs, buffers, topology, blend): (_, _, _, &[wgpu::VertexBufferLayout], _, _) =
        match shape {
            PipelineShape::Mesh(blend) => (
                "mesh pipeline",
                "vs_mesh",
                "fs_mesh",
                &[POSITION_LAYOUT, UV_LAYOUT],
                wgpu::PrimitiveTopology::TriangleList,
                blend,
            ),
            PipelineShape::Outline => (
                "hit area outline pipeline",
                "vs_line",
                "fs_line",
                &[POSITION_LAYOUT],
                wgpu::PrimitiveTopology::LineList,
                wgpu::BlendState::ALPHA_BLENDING,
            ),
        };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(vs),
            buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fs),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

fn component(
    src_factor: wgpu::BlendFactor,
    dst_factor: wgpu::BlendFactor,
) -> wgpu::BlendComponent {
    wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    }
}

pub(crate) fn blend_state(key: PipelineKey) -> wgpu::BlendState {
    use wgpu::BlendFactor::*;

    match (key.blend, key.premultiplied) {
        (BlendMode::Normal, true) => wgpu::BlendState {
            color: component(One, OneMinusSrcAlpha),
            alpha: component(One, OneMinusSrcAlpha),
        },
        (BlendMode::Normal, false) => wgpu::BlendState {
            color: component(SrcAlpha, OneMinusSrcAlpha),
            alpha: component(One, OneMinusSrcAlpha),
        },
        (BlendMode::Additive, premultiplied) => wgpu::BlendState {
            color: component(if premultiplied { One } else { SrcAlpha }, One),
            alpha: component(Zero, One),
        },
        (BlendMode::Multiplicative, _) => wgpu::BlendState {
            color: component(Dst, OneMinusSrcAlpha),
            alpha: component(Zero, One),
        },
    }
}
