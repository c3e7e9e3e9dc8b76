use std::sync::Arc;

use anyhow::{Context, Result};
use edgeview_frame::{
    capture::{CaptureEvent, CaptureWorker},
    view_mode::{ViewMode, ViewModeSelector},
};
use edgeview_render::{GpuContext, PreviewRenderer, WindowSurface, init_wgpu};
use tracing::{debug, error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::PreviewParams;

// fields drop in declaration order: the capture thread is joined before the GPU objects go away
struct Running {
    worker: Option<CaptureWorker>,
    preview: PreviewRenderer,
    surface: WindowSurface<'static>,
    gpu: GpuContext,
    window: Arc<Window>,
    view_mode: ViewModeSelector,
    fps: Option<u32>,
}

impl Running {
    fn start(
        event_loop: &ActiveEventLoop,
        proxy: EventLoopProxy<CaptureEvent>,
        params: PreviewParams,
    ) -> Result<Self> {
        let attributes = Window::default_attributes()
            .with_title("edgeview")
            .with_inner_size(params.frame_size);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Creating the window")?,
        );
        info!("Created a window with size: {:?}", window.inner_size());

        let (gpu, surface) = pollster::block_on(init_wgpu(window.clone(), window.inner_size()))?;

        let mut preview =
            PreviewRenderer::on_surface_created(&gpu.device, surface.format(), params.receiver)
                .context("Creating the preview renderer")?;
        preview.on_surface_changed(surface.size());

        let worker = CaptureWorker::spawn(params.source, params.pipeline, move |event| {
            if proxy.send_event(event).is_err() {
                trace!("Event loop is gone, dropping {:?}", event);
            }
        })?;

        let running = Self {
            worker: Some(worker),
            preview,
            surface,
            gpu,
            window,
            view_mode: params.view_mode,
            fps: None,
        };
        running.update_title();

        Ok(running)
    }

    fn update_title(&self) {
        let mode = self.view_mode.get();
        let title = match self.fps {
            Some(fps) => format!("edgeview | {} | {} fps", mode, fps),
            None => format!("edgeview | {}", mode),
        };
        self.window.set_title(&title);
    }

    fn toggle_view(&mut self) {
        let mode: ViewMode = self.view_mode.toggle();
        info!("Switched to the {} view", mode);
        self.update_title();
        self.window.request_redraw();
    }

    fn stop_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop().map(|_| ())
    }

    fn redraw(&mut self) -> Result<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Timed out waiting for the surface texture, skipping this redraw");
                return Ok(());
            }
            Err(e) => return Err(e).context("Acquiring the surface texture"),
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("preview"),
            });
        let report =
            self.preview
                .on_draw_frame(&self.gpu.device, &self.gpu.queue, &mut encoder, &frame.view);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        self.window.pre_present_notify();
        frame.texture.present();

        if let Some(fps) = report.fps {
            debug!("Rendering at {} fps", fps);
            self.fps = Some(fps);
            self.update_title();
        }

        Ok(())
    }
}

#[derive(Default)]
enum AppState {
    WaitingForResume(PreviewParams),
    Running(Box<Running>),
    #[default]
    Poison,
}

struct App {
    proxy: EventLoopProxy<CaptureEvent>,
    state: AppState,
    failure: Option<anyhow::Error>,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure.get_or_insert(err);
        event_loop.exit();
    }
}

impl ApplicationHandler<CaptureEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        match std::mem::take(&mut self.state) {
            AppState::WaitingForResume(params) => {
                match Running::start(event_loop, self.proxy.clone(), params) {
                    Ok(running) => self.state = AppState::Running(Box::new(running)),
                    Err(err) => self.fail(event_loop, err.context("Starting the preview")),
                }
            }
            state @ AppState::Running(_) => {
                debug!("Resumed while already running");
                self.state = state;
            }
            AppState::Poison => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: CaptureEvent) {
        let AppState::Running(running) = &mut self.state else {
            warn!("Received {:?} before the preview was running", event);
            return;
        };

        match event {
            CaptureEvent::FrameReady => running.window.request_redraw(),
            CaptureEvent::Finished => match running.stop_worker() {
                // keep showing the last frame
                Ok(()) => info!("Capture source finished"),
                Err(err) => self.fail(event_loop, err),
            },
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Running(running) = &mut self.state else {
            return;
        };
        if window_id != running.window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                running.surface.resize(size);
                running.preview.on_surface_changed(running.surface.size());
                running.window.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match logical_key {
                Key::Named(NamedKey::Space | NamedKey::Tab) => running.toggle_view(),
                Key::Named(NamedKey::Escape) => event_loop.exit(),
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                if let Err(err) = running.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let AppState::Running(running) = &mut self.state {
            if let Err(err) = running.stop_worker() {
                error!("Capture failed: {:#}", err);
                self.failure.get_or_insert(err);
            }
        }
        self.state = AppState::Poison;
        info!("Preview shut down");
    }
}

pub fn run(params: PreviewParams) -> Result<()> {
    let event_loop = EventLoop::<CaptureEvent>::with_user_event()
        .build()
        .context("Creating the event loop")?;
    // redraws are driven by new frames, resizes and input only
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App {
        proxy: event_loop.create_proxy(),
        state: AppState::WaitingForResume(params),
        failure: None,
    };
    event_loop
        .run_app(&mut app)
        .context("Running the event loop")?;

    match app.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
