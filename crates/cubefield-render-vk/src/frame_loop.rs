// SPDX-License-Identifier: CEPL-1.0
//! The per-tick driver: wait, acquire, update, record, submit, present, and rebuild the
//! swapchain whenever any of the invalidation signals fired.
use std::rc::Rc;

use anyhow::{Context, Result};
use ash::vk;
use bitflags::bitflags;
use cubefield_math::{glam::Mat4, Camera};
use cubefield_render::{
    FrameOutcome, InstanceData, SceneData, SurfaceSignal, UniformBlock, VsyncMode,
};
use tracing::{debug, info, warn};

use crate::gpu::{AcquireResult, Gpu, PresentResult};
use crate::recorder::{CommandRecorder, DrawState};
use crate::resources::{GpuBuffer, ResourceStore, Texture};
use crate::swapchain::{Recreate, SwapchainManager};
use crate::sync::{FrameSlot, FrameSync, MAX_FRAMES_IN_FLIGHT};

/// Acquire attempts per tick; the second one runs against a freshly rebuilt swapchain.
const MAX_ACQUIRE_ATTEMPTS: u32 = 2;

/// Default acquire timeout (1s).
pub const ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;

bitflags! {
    /// Why the swapchain has to be rebuilt before the next frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Invalidation: u8 {
        const RESIZED = 1 << 0;
        const OUT_OF_DATE = 1 << 1;
        const SUBOPTIMAL = 1 << 2;
        const SETTINGS = 1 << 3;
    }
}

/// Device objects the frame loop draws with but does not own.
#[derive(Clone, Copy, Debug)]
pub struct FrameLoopDesc {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub surface_format: vk::SurfaceFormatKHR,
    pub descriptor_sets: [vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT],
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncMode,
    pub acquire_timeout_ns: u64,
}

// Field order is drop order: per-frame objects and the swapchain go before the shared
// geometry, and the store (with its upload pools) goes last.
pub struct FrameLoop<G: Gpu> {
    sync: FrameSync<G>,
    swapchain: SwapchainManager<G>,
    texture: Texture<G>,
    vertices: GpuBuffer<G>,
    indices: GpuBuffer<G>,
    store: ResourceStore<G>,
    recorder: CommandRecorder,
    instances: Vec<InstanceData>,
    index_count: u32,
    pending: Invalidation,
    acquire_timeout_ns: u64,
    gpu: Rc<G>,
}

impl<G: Gpu> FrameLoop<G> {
    /// Uploads the scene, builds the first swapchain and both frame slots.
    ///
    /// A window with no area yet leaves the swapchain unbuilt; the first tick with a real
    /// size builds it.
    pub fn new(
        gpu: Rc<G>,
        desc: FrameLoopDesc,
        scene: &SceneData,
        surface: &SurfaceSignal,
    ) -> Result<Self> {
        let store = ResourceStore::new(gpu.clone())?;

        let vertices = store
            .create_static_buffer(
                bytemuck::cast_slice(&scene.vertices),
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )
            .context("vertex buffer")?;
        let indices = store
            .create_static_buffer(
                bytemuck::cast_slice(&scene.indices),
                vk::BufferUsageFlags::INDEX_BUFFER,
            )
            .context("index buffer")?;
        let texture = store.create_texture(&scene.texture).context("texture")?;

        let swapchain = SwapchainManager::create(
            gpu.clone(),
            &store,
            desc.render_pass,
            desc.surface_format,
            desc.vsync_mode,
            surface.size,
        )?;
        let pending = if swapchain.is_ready() {
            Invalidation::empty()
        } else {
            Invalidation::RESIZED
        };
        let sync = FrameSync::new(
            gpu.clone(),
            &store,
            desc.descriptor_sets,
            scene.instances.len(),
        )?;

        info!(
            vertices = scene.vertices.len(),
            indices = scene.indices.len(),
            instances = scene.instances.len(),
            "vk: scene uploaded"
        );

        Ok(Self {
            sync,
            swapchain,
            texture,
            vertices,
            indices,
            store,
            recorder: CommandRecorder {
                render_pass: desc.render_pass,
                pipeline: desc.pipeline,
                pipeline_layout: desc.pipeline_layout,
                clear_color: desc.clear_color,
            },
            instances: scene.instances.clone(),
            index_count: scene.indices.len() as u32,
            pending,
            acquire_timeout_ns: desc.acquire_timeout_ns,
            gpu,
        })
    }

    pub fn swapchain(&self) -> &SwapchainManager<G> {
        &self.swapchain
    }

    pub fn slots(&self) -> &[FrameSlot<G>] {
        self.sync.slots()
    }

    pub fn texture(&self) -> &Texture<G> {
        &self.texture
    }

    pub fn pending(&self) -> Invalidation {
        self.pending
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.recorder.clear_color = rgba;
    }

    pub fn set_vsync_mode(&mut self, mode: VsyncMode) {
        self.swapchain.set_vsync_mode(mode);
        self.pending |= Invalidation::SETTINGS;
    }

    /// Runs one frame.
    ///
    /// The slot's fence is waited on first and only reset once an image is in hand, so an
    /// acquire that bails out never leaves an unsignaled fence behind. Out-of-date at
    /// acquire rebuilds the swapchain and retries once on the new one.
    pub fn tick(&mut self, camera: &Camera, surface: &mut SurfaceSignal) -> Result<FrameOutcome> {
        if surface.resized {
            self.pending |= Invalidation::RESIZED;
        }
        if !self.pending.is_empty() && !self.rebuild(surface)? {
            return Ok(FrameOutcome::Deferred);
        }

        self.sync.wait_current()?;

        let mut attempts = 0;
        let image_index = loop {
            let signal = self.sync.current().image_available;
            match self
                .swapchain
                .acquire_next_image(self.acquire_timeout_ns, signal)?
            {
                AcquireResult::Acquired { index, suboptimal } => {
                    if suboptimal {
                        self.pending |= Invalidation::SUBOPTIMAL;
                    }
                    break index;
                }
                AcquireResult::Timeout => {
                    warn!(
                        "vk: acquire timed out after {}ms, skipping frame",
                        self.acquire_timeout_ns / 1_000_000
                    );
                    return Ok(FrameOutcome::Skipped);
                }
                AcquireResult::OutOfDate => {
                    debug!("vk: acquire reported out-of-date");
                    self.pending |= Invalidation::OUT_OF_DATE;
                    attempts += 1;
                    if !self.rebuild(surface)? {
                        return Ok(FrameOutcome::Deferred);
                    }
                    if attempts >= MAX_ACQUIRE_ATTEMPTS {
                        return Ok(FrameOutcome::Recreated);
                    }
                }
            }
        };

        self.sync.reset_current()?;
        self.write_frame_data(camera)?;

        let target = self.swapchain.render_target(image_index)?;
        let draw = self.draw_state();
        let slot = self.sync.current();
        self.recorder.record(&*self.gpu, target, slot, &draw)?;
        self.sync.submit_current()?;

        match self.swapchain.present(image_index, slot.render_finished)? {
            PresentResult::Presented => {}
            PresentResult::Suboptimal => self.pending |= Invalidation::SUBOPTIMAL,
            PresentResult::OutOfDate => self.pending |= Invalidation::OUT_OF_DATE,
        }

        let slot_index = self.sync.current_index();
        self.sync.advance();

        if surface.resized {
            self.pending |= Invalidation::RESIZED;
        }
        if !self.pending.is_empty() {
            self.rebuild(surface)?;
        }

        Ok(FrameOutcome::Presented {
            image_index,
            slot: slot_index,
        })
    }

    /// `Ok(false)` when the surface has no area and the rebuild stays pending.
    fn rebuild(&mut self, surface: &mut SurfaceSignal) -> Result<bool> {
        let reasons = self.pending;
        match self.swapchain.recreate(&self.store, surface.size)? {
            Recreate::Deferred => Ok(false),
            Recreate::Rebuilt => {
                debug!(?reasons, "vk: swapchain rebuilt");
                self.pending = Invalidation::empty();
                surface.resized = false;
                Ok(true)
            }
        }
    }

    fn write_frame_data(&mut self, camera: &Camera) -> Result<()> {
        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let ubo = UniformBlock::new(
            Mat4::IDENTITY,
            camera.view_matrix(),
            camera.projection_matrix(aspect),
        );

        let slot = self.sync.current_mut();
        slot.uniforms.write(std::slice::from_ref(&ubo))?;
        slot.instances.write(&self.instances)?;
        Ok(())
    }

    fn draw_state(&self) -> DrawState {
        DrawState {
            vertex_buffer: self.vertices.handle(),
            index_buffer: self.indices.handle(),
            index_count: self.index_count,
            instance_count: self.instances.len() as u32,
        }
    }
}

impl<G: Gpu> Drop for FrameLoop<G> {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            warn!("vk: wait_idle before teardown failed: {e:?}");
        }
    }
}
