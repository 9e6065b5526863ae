//! trigon: opens a window and draws a triangle every frame.
//!
//! Configuration comes from [`RendererConfig::from_env`]; logging from `RUST_LOG`.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::window::WindowId;

use trigon_core::{RendererConfig, Timer};
use trigon_platform::{
    ActiveEventLoop, ControlFlow, EventLoop, KeyCode, KeyEvent, PhysicalKey, Window, WindowEvent,
};
use trigon_renderer::{ErrorKind, RenderError, Renderer};

/// Run of recoverable frame errors with no successful frame in between.
#[derive(Debug, Default)]
struct FailureStreak {
    started: Option<Instant>,
    count: u32,
}

impl FailureStreak {
    /// Count a failed frame at `now` and return how long the streak has lasted.
    fn record(&mut self, now: Instant) -> Duration {
        self.count += 1;
        let started = *self.started.get_or_insert(now);
        now.saturating_duration_since(started)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

struct App {
    config: RendererConfig,
    /// Declared before `window` so it is dropped first
    renderer: Option<Renderer>,
    window: Option<Window>,
    /// First fatal error; returned from `main` once the loop exits
    fatal: Option<anyhow::Error>,
    recoverable: FailureStreak,
    stats_timer: Timer,
    frames_since_stats: u64,
    frames_total: u64,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fatal: None,
            recoverable: FailureStreak::default(),
            stats_timer: Timer::new(),
            frames_since_stats: 0,
            frames_total: 0,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let renderer =
            Renderer::new(&window, &self.config).context("Failed to create renderer")?;

        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.stats_timer.reset();
        Ok(())
    }

    /// Stop rendering, drain the GPU, and release the renderer before the window.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown() {
                error!("Failed to shut down renderer cleanly: {}", e);
                self.fail(anyhow::Error::new(e).context("Renderer shutdown failed"));
            }
            info!("Rendered {} frames", renderer.frames_submitted());
        }
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, error: anyhow::Error) {
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        // A minimised window has no presentable area; wait for it to come back.
        if let Some(window) = &self.window {
            let (width, height) = window.framebuffer_size();
            if width == 0 || height == 0 {
                self.recoverable.clear();
                return;
            }
        }

        match renderer.render_frame() {
            Ok(report) => {
                self.recoverable.clear();
                self.frames_since_stats += 1;
                self.frames_total += 1;
                if report.suboptimal {
                    debug!("Frame {} presented to a suboptimal swapchain", report.frame);
                }
            }
            Err(e) => self.handle_frame_error(event_loop, e),
        }

        if self.stats_timer.elapsed() >= self.config.stats_interval {
            let elapsed = self.stats_timer.lap().as_secs_f64();
            debug!(
                "{} frames total, {:.1} frames/s",
                self.frames_total,
                self.frames_since_stats as f64 / elapsed
            );
            self.frames_since_stats = 0;
        }
    }

    fn handle_frame_error(&mut self, event_loop: &ActiveEventLoop, e: RenderError) {
        match e.kind() {
            ErrorKind::Recoverable => {
                let lasted = self.recoverable.record(Instant::now());
                warn!("Skipping frame: {}", e);
                if lasted > self.config.recoverable_grace {
                    error!(
                        "{} recoverable frame errors over {:?} without a good frame, giving up",
                        self.recoverable.count, lasted
                    );
                    self.fail(anyhow::Error::new(e).context(format!(
                        "Every frame failed for more than {:?}",
                        self.config.recoverable_grace
                    )));
                    self.shutdown(event_loop);
                }
            }
            ErrorKind::Fatal | ErrorKind::Unresponsive => {
                error!("Render error: {}", e);
                self.fail(anyhow::Error::new(e).context("Rendering failed"));
                self.shutdown(event_loop);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.fatal.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            error!("{:#}", e);
            self.fail(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state,
                        ..
                    },
                ..
            } if state.is_pressed() => {
                info!("Escape pressed, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    trigon_core::init_logging();
    info!("Starting trigon");

    let config = RendererConfig::from_env().context("Invalid configuration")?;
    debug!("{:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
