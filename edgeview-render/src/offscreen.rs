use anyhow::{Context, bail};
use dpi::PhysicalSize;
use edgeview_frame::PixelBuffer;

use crate::{init::fits_texture_limits, texture::FRAME_TEXTURE_FORMAT};

/// A render target that isn't a window, with CPU read-back of the result.
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: PhysicalSize<u32>,
}

impl OffscreenTarget {
    pub const FORMAT: wgpu::TextureFormat = FRAME_TEXTURE_FORMAT;

    pub fn new(device: &wgpu::Device, size: PhysicalSize<u32>) -> anyhow::Result<Self> {
        if size.width == 0 || size.height == 0 || !fits_texture_limits(size, &device.limits()) {
            bail!(
                "Cannot render offscreen at {}x{}, the device supports 1 to {} pixels per side",
                size.width,
                size.height,
                device.limits().max_texture_dimension_2d
            );
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("OffscreenTarget"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            size,
        })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Copies the current contents back to the CPU, blocking until the GPU is done.
    pub fn read_pixels(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> anyhow::Result<PixelBuffer> {
        let PhysicalSize { width, height } = self.size;
        let row_bytes = width * 4;
        // buffer copies need rows aligned to 256 bytes
        let padded_row_bytes = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("OffscreenTarget Readback"),
            size: padded_row_bytes as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("OffscreenTarget Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .context("Readback callback was dropped")?
            .context("Mapping the readback buffer")?;

        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded_row_bytes as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        buffer.unmap();

        Ok(PixelBuffer::from_vec(self.size, pixels)?)
    }
}
