use dpi::PhysicalSize;
use glam::{Vec2, vec2};
use wgpu::util::DeviceExt;

use crate::{program::QuadProgram, texture::TextureStreamer};

// triangle strip order: top-left, bottom-left, top-right, bottom-right
const POSITIONS: [Vec2; 4] = [
    vec2(-1.0, 1.0),
    vec2(-1.0, -1.0),
    vec2(1.0, 1.0),
    vec2(1.0, -1.0),
];
// texture rows go top to bottom, so v is flipped relative to clip space y
const TEX_COORDS: [Vec2; 4] = [
    vec2(0.0, 0.0),
    vec2(0.0, 1.0),
    vec2(1.0, 0.0),
    vec2(1.0, 1.0),
];

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const TEX_COORD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

/// Draws the streamed frame texture over the whole viewport.
pub struct QuadRenderer {
    positions: wgpu::Buffer,
    tex_coords: wgpu::Buffer,
}

impl QuadRenderer {
    pub fn new(device: &wgpu::Device) -> Self {
        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("QuadRenderer Positions"),
            contents: bytemuck::cast_slice(&POSITIONS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let tex_coords = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("QuadRenderer TexCoords"),
            contents: bytemuck::cast_slice(&TEX_COORDS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            positions,
            tex_coords,
        }
    }

    /// Positions and texture coordinates come from two separate vertex streams.
    pub fn vertex_buffer_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
        [
            wgpu::VertexBufferLayout {
                array_stride: size_of::<Vec2>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION_ATTRIBUTES,
            },
            wgpu::VertexBufferLayout {
                array_stride: size_of::<Vec2>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &TEX_COORD_ATTRIBUTES,
            },
        ]
    }

    /// Clears `target` to black and draws the texture over `viewport`.
    ///
    /// `viewport` must not exceed the size of `target`.
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        viewport: PhysicalSize<u32>,
        program: &QuadProgram,
        texture: &TextureStreamer,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("QuadRenderer Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
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

        pass.set_viewport(
            0.0,
            0.0,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_pipeline(program.pipeline());
        pass.set_bind_group(0, texture.bind_group(), &[]);
        pass.set_vertex_buffer(0, self.positions.slice(..));
        pass.set_vertex_buffer(1, self.tex_coords.slice(..));
        pass.draw(0..POSITIONS.len() as u32, 0..1);
    }
}
