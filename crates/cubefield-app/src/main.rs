// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use cubefield_core::{init_tracing, FpsCounter};
use cubefield_math::{glam::Vec3, Camera, InputState};
use cubefield_platform::route_window_event;
use cubefield_render::{
    FrameOutcome, RenderSettings, Renderer, SceneData, SurfaceSignal, TextureData,
};
use cubefield_render_vk::VkRenderer;
use serde::Deserialize;
use tracing::{error, info, warn};

use cubefield_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[arg(long, default_value = "cubefield.toml")]
    config: PathBuf,
    /// Force validation layers on
    #[arg(long)]
    validation: bool,
    /// Prefer MAILBOX and redraw continuously
    #[arg(long)]
    no_vsync: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum VsyncMode {
    Fifo,
    #[default]
    Mailbox,
}

impl From<VsyncMode> for cubefield_render::VsyncMode {
    fn from(m: VsyncMode) -> Self {
        match m {
            VsyncMode::Fifo => Self::Fifo,
            VsyncMode::Mailbox => Self::Mailbox,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct RenderCfg {
    clear_color: [f32; 4],
    vsync: bool,
    vsync_mode: VsyncMode,
    validation: bool,
    abort_on_validation_error: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let d = RenderSettings::default();
        Self {
            clear_color: d.clear_color,
            vsync: true,
            vsync_mode: VsyncMode::Mailbox,
            validation: d.validation,
            abort_on_validation_error: d.abort_on_validation_error,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct WindowCfg {
    title: String,
    width: u32,
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "cubefield".into(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct CameraCfg {
    position: [f32; 3],
    fov: f32,
}

impl Default for CameraCfg {
    fn default() -> Self {
        let c = Camera::default();
        Self {
            position: c.position.to_array(),
            fov: c.fov,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
struct AppCfg {
    window: WindowCfg,
    render: RenderCfg,
    camera: CameraCfg,
    /// PNG or JPEG; the checkerboard is used when unset or unreadable.
    texture: Option<PathBuf>,
}

impl AppCfg {
    fn settings(&self) -> RenderSettings {
        RenderSettings {
            clear_color: self.render.clear_color,
            vsync_mode: self.vsync_mode(),
            validation: self.render.validation,
            abort_on_validation_error: self.render.abort_on_validation_error,
        }
    }

    fn vsync_mode(&self) -> cubefield_render::VsyncMode {
        if self.render.vsync {
            self.render.vsync_mode.into()
        } else {
            cubefield_render::VsyncMode::Mailbox
        }
    }

    fn camera(&self) -> Camera {
        Camera {
            position: Vec3::from_array(self.camera.position),
            fov: self.camera.fov,
            ..Camera::default()
        }
    }
}

fn parse_cfg(text: &str) -> Result<AppCfg> {
    Ok(toml::from_str(text)?)
}

fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("config {}: {e:#}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(e) => {
            info!("config {} not read ({e}); using defaults", path.display());
            AppCfg::default()
        }
    }
}

fn load_texture(path: &Path) -> Result<TextureData> {
    let img = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    Ok(TextureData {
        width: img.width(),
        height: img.height(),
        pixels: img.into_raw(),
    })
}

fn scene_texture(cfg: &AppCfg) -> TextureData {
    match &cfg.texture {
        Some(path) => load_texture(path).unwrap_or_else(|e| {
            warn!("texture: {e:#}; falling back to checkerboard");
            TextureData::checkerboard(256, 32)
        }),
        None => TextureData::checkerboard(256, 32),
    }
}

// Field order is drop order: the renderer must go before the window it draws into.
struct App {
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    cfg: AppCfg,
    camera: Camera,
    input: InputState,
    surface: SurfaceSignal,
    vsync_mode: cubefield_render::VsyncMode,

    exiting: bool,
    paused: bool,
    fps: FpsCounter,
    result: Result<()>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        let camera = cfg.camera();
        let vsync_mode = cfg.vsync_mode();
        Self {
            renderer: None,
            window: None,
            camera,
            input: InputState::default(),
            surface: SurfaceSignal::default(),
            vsync_mode,
            cfg,
            exiting: false,
            paused: false,
            fps: FpsCounter::new(Duration::from_secs(1)),
            result: Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(LogicalSize::new(self.cfg.window.width, self.cfg.window.height));
        let window = event_loop.create_window(attrs).context("create_window")?;

        let size = window.inner_size();
        self.surface = SurfaceSignal::new(cubefield_platform::render_size(size));
        self.input = InputState::new((size.width as f32 / 2.0, size.height as f32 / 2.0));

        let scene = SceneData::cubes(scene_texture(&self.cfg));
        let renderer = VkRenderer::new(
            &window,
            &window,
            self.surface.size,
            &self.cfg.settings(),
            &scene,
        )
        .context("vk init")?;

        info!(
            "window {}x{}, vsync={} mode={:?}",
            size.width, size.height, self.cfg.render.vsync, self.vsync_mode
        );
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn toggle_vsync_mode(&mut self) {
        use cubefield_render::VsyncMode as Mode;
        self.vsync_mode = match self.vsync_mode {
            Mode::Fifo => Mode::Mailbox,
            Mode::Mailbox => Mode::Fifo,
        };
        info!("vsync mode -> {:?}", self.vsync_mode);
        if let Some(r) = &mut self.renderer {
            r.set_vsync_mode(self.vsync_mode);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        match renderer.render(&self.camera, &mut self.surface) {
            Ok(FrameOutcome::Presented { .. }) => {
                self.paused = false;
                self.fps.frame();
            }
            Ok(FrameOutcome::Deferred) => {
                // minimized; wait for the next resize
                self.paused = true;
            }
            Ok(FrameOutcome::Recreated | FrameOutcome::Skipped) => {}
            Err(e) => {
                error!("render error: {e:#}");
                self.result = Err(e);
                self.shutdown(event_loop);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("{e:#}");
                self.result = Err(e);
                self.shutdown(event_loop);
                return;
            }
        }
        self.paused = self.surface.size.is_empty();
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        if route_window_event(&event, &mut self.camera, &mut self.input, &mut self.surface) {
            if let WindowEvent::Resized(size) = event {
                self.paused = size.width == 0 || size.height == 0;
                info!("resized -> {}x{} (paused={})", size.width, size.height, self.paused);
            }
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                match event.logical_key.as_ref() {
                    Key::Named(NamedKey::Escape) => self.shutdown(event_loop),
                    Key::Character(c) if c.eq_ignore_ascii_case("v") => self.toggle_vsync_mode(),
                    _ => {}
                }
            }
            WindowEvent::Occluded(occluded) => {
                self.paused = occluded || self.surface.size.is_empty();
            }
            WindowEvent::RedrawRequested => {
                if !self.exiting {
                    self.redraw(event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        let now = Instant::now();
        if self.paused {
            // Resized/Occluded events wake the loop again.
            event_loop.set_control_flow(ControlFlow::Wait);
            self.fps.reset(now);
            return;
        }

        // Present blocks on the swapchain, so a vsynced loop still paces itself.
        event_loop.set_control_flow(if self.cfg.render.vsync {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        });
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        if let Some(frames) = self.fps.poll(now) {
            info!("fps ~ {frames}");
        }
    }
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    if args.validation {
        cfg.render.validation = true;
    }
    if args.no_vsync {
        cfg.render.vsync = false;
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;
    app.result
}
