//! wgpu implementation of [`ShaderBackend`]: offscreen draw plus readback.

use anyhow::Result;
use std::borrow::Cow;
use std::num::NonZeroU64;

use super::frame::{FrameTarget, TEXTURE_FORMAT};
use super::gpu::GpuContext;
use crate::shader::compile::{CompiledModule, ShaderError};
use crate::shader::pipeline::ShaderBackend;
use crate::shader::uniforms::FrameUniforms;

pub struct GpuBackend {
    gpu: GpuContext,
    target: FrameTarget,
    vertex_module: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GpuBackend {
    pub fn new(gpu: GpuContext, width: u32, height: u32) -> Self {
        let device = &gpu.device;

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen_vertex"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/fullscreen.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("visual_uniforms_layout"),
            entries: &[
                // @binding(0): VisualUniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<FrameUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("visual_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("visual_uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("visual_uniforms_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let target = FrameTarget::new(&gpu, width, height);

        Self {
            gpu,
            target,
            vertex_module,
            pipeline_layout,
            uniform_buffer,
            bind_group,
        }
    }

    /// Pixels of the most recent draw, RGBA8, top row first.
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        self.target.readback(&self.gpu)
    }
}

impl ShaderBackend for GpuBackend {
    type Program = wgpu::RenderPipeline;

    fn create_program(&mut self, compiled: &CompiledModule) -> Result<Self::Program, ShaderError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("visual_fragment"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(compiled.module.clone())),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("visual_pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Checked once per build, never per frame.
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(ShaderError::Gpu(err.to_string())),
            None => Ok(pipeline),
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if self.target.size() != (width.max(1), height.max(1)) {
            self.target = FrameTarget::new(&self.gpu, width, height);
        }
    }

    fn draw(&mut self, program: &Self::Program, uniforms: &FrameUniforms) -> Result<()> {
        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("visual_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(program);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.draw(0..3, 0..1); // fullscreen triangle
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
