use anyhow::Context;
use dpi::PhysicalSize;
use tracing::{debug, info};
use wgpu::{InstanceFlags, SurfaceTarget};

/// Largest texture width or height the device is created with. Frames and surfaces must fit in it.
pub const MAX_TEXTURE_DIMENSION: u32 = 4096;

/// Whether a texture of `size` can be created on a device with `limits`.
pub fn fits_texture_limits(size: PhysicalSize<u32>, limits: &wgpu::Limits) -> bool {
    let max = limits.max_texture_dimension_2d;
    size.width <= max && size.height <= max
}

/// Everything needed to talk to the GPU, independent of where the results are presented.
#[derive(Debug)]
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Creates a context without a surface, for offscreen rendering.
    pub async fn new_headless() -> anyhow::Result<Self> {
        info!("Initializing headless wgpu...");

        let instance = create_instance();
        let adapter = wgpu::util::initialize_adapter_from_env_or_default(&instance, None)
            .await
            .context("Failed to find appropriate wgpu adapter")?;
        let (device, queue) = request_device(&adapter).await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

fn create_instance() -> wgpu::Instance {
    let backends = wgpu::Backends::from_env().unwrap_or(wgpu::Backends::all());
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends,
        flags: InstanceFlags::debugging(),
        ..Default::default()
    })
}

async fn request_device(adapter: &wgpu::Adapter) -> anyhow::Result<(wgpu::Device, wgpu::Queue)> {
    info!("Selected an adapter {:?}", adapter.get_info());
    debug!("Adapter limits: {:?}", adapter.limits());

    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("edgeview device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    // camera frames routinely exceed the 2048 webgl2 default
                    max_texture_dimension_2d: MAX_TEXTURE_DIMENSION,
                    ..wgpu::Limits::downlevel_webgl2_defaults()
                },
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        )
        .await
        .map_err(|e| anyhow::Error::msg(format!("Failed to create wgpu device: {:?}", e)))
        .context("Failed to create wgpu device")
}

fn clamp_to_limits(size: PhysicalSize<u32>, limits: &wgpu::Limits) -> PhysicalSize<u32> {
    let max = limits.max_texture_dimension_2d;
    PhysicalSize::new(size.width.min(max), size.height.min(max))
}

pub struct SurfaceTextureWithView {
    pub texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

/// A window surface that follows the window size.
#[derive(Debug)]
pub struct WindowSurface<'window> {
    device: wgpu::Device,
    surface: wgpu::Surface<'window>,
    config: wgpu::SurfaceConfiguration,
}

impl WindowSurface<'_> {
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    /// Zero sizes (minimized windows) are ignored, the surface keeps its last valid size.
    /// Sizes past the device texture limit are clamped to it.
    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        let size = clamp_to_limits(size, &self.device.limits());
        if size.width == 0 || size.height == 0 || size == self.size() {
            return;
        }
        debug!("Resizing surface to {}x{}", size.width, size.height);
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }

    pub fn get_current_texture(&mut self) -> Result<SurfaceTextureWithView, wgpu::SurfaceError> {
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                debug!("Surface error, reconfiguring surface");
                self.surface.configure(&self.device, &self.config);
                self.surface.get_current_texture()?
            }
            Err(e) => return Err(e),
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        Ok(SurfaceTextureWithView { texture, view })
    }
}

pub async fn init_wgpu<'window>(
    surface_target: impl Into<SurfaceTarget<'window>>,
    size: PhysicalSize<u32>,
) -> anyhow::Result<(GpuContext, WindowSurface<'window>)> {
    info!("Initializing wgpu...");

    let instance = create_instance();
    let surface = instance
        .create_surface(surface_target)
        .context("Creating surface")?;

    for adapter in instance.enumerate_adapters(wgpu::Backends::all()) {
        debug!("Found adapter: {:?}", adapter.get_info());
    }

    let adapter = wgpu::util::initialize_adapter_from_env_or_default(&instance, Some(&surface))
        .await
        .context("Failed to find appropriate wgpu adapter")?;
    let (device, queue) = request_device(&adapter).await?;

    // frames are uploaded as plain Rgba8Unorm, an sRGB surface would apply the transfer function twice
    let format = *surface
        .get_capabilities(&adapter)
        .formats
        .iter()
        .find(|f| !f.is_srgb())
        .context("Surface has no non-sRGB format")?;
    debug!("Picked {:?} as the surface texture format", format);

    let size = clamp_to_limits(size, &device.limits());
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        desired_maximum_frame_latency: 2,
        alpha_mode: wgpu::CompositeAlphaMode::Auto,
        view_formats: vec![],
    };
    surface.configure(&device, &config);

    let surface = WindowSurface {
        device: device.clone(),
        surface,
        config,
    };

    Ok((
        GpuContext {
            instance,
            adapter,
            device,
            queue,
        },
        surface,
    ))
}

/// GPU tests run on whatever adapter the machine has and are skipped when there is none.
#[cfg(test)]
pub(crate) fn test_gpu() -> Option<GpuContext> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();

    match pollster::block_on(GpuContext::new_headless()) {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            info!("Skipping GPU test: {:#}", err);
            None
        }
    }
}
