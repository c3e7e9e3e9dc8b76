use dpi::PhysicalSize;
use edgeview_frame::PixelBuffer;
use tracing::{debug, warn};

use crate::init::fits_texture_limits;

pub const FRAME_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// The one texture the preview samples from.
///
/// Every upload replaces the whole image. wgpu textures can't change size, so when the frame
/// dimensions change the backing texture (and the bind group referencing it) is recreated,
/// while the streamer itself and its sampler stay the same.
pub struct TextureStreamer {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: PhysicalSize<u32>,
    reallocations: u32,
}

impl TextureStreamer {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("TextureStreamer Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // 1x1 placeholder until the first frame arrives, zero-initialized by wgpu
        let size = PhysicalSize::new(1, 1);
        let texture = create_texture(device, size);
        let bind_group = create_bind_group(device, layout, &texture, &sampler);

        Self {
            layout: layout.clone(),
            sampler,
            texture,
            bind_group,
            size,
            reallocations: 0,
        }
    }

    /// Replaces the texture contents with `frame`.
    ///
    /// Returns `false` when the frame was dropped: empty frames and frames past the device
    /// texture limit leave the previous image in place.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &PixelBuffer) -> bool {
        let size = frame.size();
        if size.width == 0 || size.height == 0 {
            warn!("Ignoring upload of an empty frame");
            return false;
        }
        if !fits_texture_limits(size, &device.limits()) {
            warn!(
                "Ignoring a {}x{} frame, the device only supports textures up to {}",
                size.width,
                size.height,
                device.limits().max_texture_dimension_2d
            );
            return false;
        }

        if size != self.size {
            debug!(
                "Frame size changed from {}x{} to {}x{}, recreating the texture",
                self.size.width, self.size.height, size.width, size.height
            );
            self.texture = create_texture(device, size);
            self.bind_group = create_bind_group(device, &self.layout, &self.texture, &self.sampler);
            self.size = size;
            self.reallocations += 1;
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        true
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// How many times the backing texture was replaced because the frame size changed.
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }
}

fn create_texture(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("TextureStreamer Frame"),
        size: wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FRAME_TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("TextureStreamer Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
