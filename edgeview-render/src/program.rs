use std::borrow::Cow;

use thiserror::Error;
use tracing::{debug, warn};

use crate::quad::QuadRenderer;

pub const SHADER_SOURCE: &str = include_str!("quad.wgsl");

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("shader failed to compile:\n{log}")]
    Compile { log: String },
    #[error("render pipeline failed to link:\n{log}")]
    Link { log: String },
}

/// The pass-through textured quad program: compiled shader, bind group layout and render pipeline.
pub struct QuadProgram {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
}

impl QuadProgram {
    pub fn new(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, ProgramError> {
        Self::with_source(device, target_format, SHADER_SOURCE)
    }

    /// Builds the program from custom WGSL. It must provide `vs_main` and `fs_main` with the same interface as [`SHADER_SOURCE`].
    pub fn with_source(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        source: &str,
    ) -> Result<Self, ProgramError> {
        // all of these resolve immediately on native
        pollster::block_on(Self::build(device, target_format, source))
    }

    async fn build(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        source: &str,
    ) -> Result<Self, ProgramError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("QuadProgram Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let compile_error = device.pop_error_scope().await;

        let info = shader_module.get_compilation_info().await;
        for message in &info.messages {
            if message.message_type != wgpu::CompilationMessageType::Error {
                warn!("Shader compilation: {}", message.message);
            }
        }
        if let Some(error) = compile_error {
            let log = compilation_log(&info).unwrap_or_else(|| error.to_string());
            return Err(ProgramError::Compile { log });
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("QuadProgram Bind Group Layout"),
            entries: &[
                // frame texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // frame sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("QuadProgram Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("QuadProgram Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &QuadRenderer::vertex_buffer_layouts(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
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

        if let Some(error) = device.pop_error_scope().await {
            return Err(ProgramError::Link {
                log: error.to_string(),
            });
        }

        debug!("Built quad program for {:?}", target_format);

        Ok(Self {
            bind_group_layout,
            pipeline,
        })
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }
}

fn compilation_log(info: &wgpu::CompilationInfo) -> Option<String> {
    let errors = info
        .messages
        .iter()
        .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
        .map(|m| match m.location {
            Some(location) => format!(
                "{}:{}: {}",
                location.line_number, location.line_position, m.message
            ),
            None => m.message.clone(),
        })
        .collect::<Vec<_>>();

    if errors.is_empty() {
        None
    } else {
        Some(errors.join("\n"))
    }
}
