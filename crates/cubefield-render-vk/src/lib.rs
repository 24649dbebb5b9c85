// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: instanced textured cubes with two frames in flight.
use std::rc::Rc;

use anyhow::{Context, Result};
use cubefield_math::Camera;
use cubefield_render::{
    FrameOutcome, RenderSettings, RenderSize, Renderer, SceneData, SurfaceSignal, VsyncMode,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

pub mod ash_gpu;
pub mod bootstrap;
pub mod error;
pub mod frame_loop;
pub mod gpu;
pub mod pipeline;
pub mod recorder;
pub mod resources;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
mod mock;

pub use ash_gpu::AshGpu;
pub use error::RenderError;
pub use frame_loop::{FrameLoop, FrameLoopDesc, Invalidation, ACQUIRE_TIMEOUT_NS};
pub use gpu::Gpu;
pub use sync::MAX_FRAMES_IN_FLIGHT;

use pipeline::PipelineObjects;
use resources::{pick_depth_format, DEPTH_FORMAT_CANDIDATES};

// Field order is drop order: frame loop (waits idle, then swapchain, slots, scene), then
// pipeline objects, then the device itself once the last Rc goes.
pub struct VkRenderer {
    frame_loop: FrameLoop<AshGpu>,
    _pipeline: PipelineObjects,
    _gpu: Rc<AshGpu>,
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &SceneData,
    ) -> Result<Self> {
        let gpu = Rc::new(AshGpu::new(window, display, settings)?);

        let depth_format = pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |f| gpu.format_properties(f))?;
        let surface_format = swapchain::choose_surface_format(&gpu.surface_formats()?)?;
        let pipeline = PipelineObjects::new(gpu.clone(), surface_format.format, depth_format)
            .context("pipeline objects")?;

        let desc = FrameLoopDesc {
            render_pass: pipeline.render_pass,
            pipeline: pipeline.pipeline,
            pipeline_layout: pipeline.layout,
            surface_format,
            descriptor_sets: pipeline.allocate_sets()?,
            clear_color: settings.clear_color,
            vsync_mode: settings.vsync_mode,
            acquire_timeout_ns: ACQUIRE_TIMEOUT_NS,
        };
        let frame_loop = FrameLoop::new(gpu.clone(), desc, scene, &SurfaceSignal::new(size))?;
        pipeline.write_sets(&frame_loop);

        let sc = frame_loop.swapchain();
        info!(
            "vk: renderer ready ({}x{}, {} images, {} frames in flight)",
            sc.extent().width,
            sc.extent().height,
            sc.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            frame_loop,
            _pipeline: pipeline,
            _gpu: gpu,
        })
    }

    fn render(&mut self, camera: &Camera, surface: &mut SurfaceSignal) -> Result<FrameOutcome> {
        self.frame_loop.tick(camera, surface)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.frame_loop.set_clear_color(rgba);
    }

    fn set_vsync_mode(&mut self, mode: VsyncMode) {
        self.frame_loop.set_vsync_mode(mode);
    }
}
