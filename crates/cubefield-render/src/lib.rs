// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use cubefield_math::Camera;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub mod scene;

pub use scene::{InstanceData, SceneData, TextureData, UniformBlock, Vertex};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Minimized windows report a zero-area framebuffer.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What the window side tells the renderer each tick.
///
/// `resized` is a one-shot flag: the window handler sets it, the renderer clears it once a
/// swapchain rebuild has consumed it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceSignal {
    pub size: RenderSize,
    pub resized: bool,
}

impl SurfaceSignal {
    pub fn new(size: RenderSize) -> Self {
        Self {
            size,
            resized: false,
        }
    }

    pub fn resize(&mut self, size: RenderSize) {
        self.size = size;
        self.resized = true;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VsyncMode {
    /// Strict vsync, always available.
    Fifo,
    /// Low-latency vsync where supported.
    #[default]
    Mailbox,
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncMode,
    /// Enable validation layers and route their messages to the log.
    pub validation: bool,
    /// Abort the process on error-severity validation messages.
    pub abort_on_validation_error: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.02, 0.02, 0.04, 1.0],
            vsync_mode: VsyncMode::Mailbox,
            validation: cfg!(debug_assertions),
            abort_on_validation_error: false,
        }
    }
}

/// Result of one renderer tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and handed to the presentation engine.
    Presented { image_index: u32, slot: usize },
    /// The swapchain was rebuilt and nothing was presented this tick.
    Recreated,
    /// The surface has no area; nothing was done and the rebuild is still pending.
    Deferred,
    /// Image acquisition timed out; try again next tick.
    Skipped,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &SceneData,
    ) -> Result<Self>
    where
        Self: Sized;

    fn render(&mut self, camera: &Camera, surface: &mut SurfaceSignal) -> Result<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync_mode(&mut self, _mode: VsyncMode) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_sizes_are_empty() {
        assert!(RenderSize::new(0, 0).is_empty());
        assert!(RenderSize::new(0, 720).is_empty());
        assert!(RenderSize::new(1280, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }

    #[test]
    fn resize_sets_one_shot_flag() {
        let mut s = SurfaceSignal::new(RenderSize::new(800, 600));
        assert!(!s.resized);
        s.resize(RenderSize::new(1024, 768));
        assert!(s.resized);
        assert_eq!(s.size, RenderSize::new(1024, 768));
    }
}
