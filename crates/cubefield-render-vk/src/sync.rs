// SPDX-License-Identifier: CEPL-1.0
//! Frame-in-flight slots and the fences/semaphores that pace them.
use std::rc::Rc;

use anyhow::{bail, Result};
use ash::vk;
use cubefield_render::{InstanceData, UniformBlock};
use tracing::warn;

use crate::gpu::{Gpu, QueueRole, Submission};
use crate::resources::{MappedBuffer, ResourceStore};

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// How long a single fence wait may block before we log and wait again.
pub const FENCE_WAIT_SLICE_NS: u64 = 1_000_000_000;

/// Everything one frame in flight owns. Nothing here is shared with the other slot.
pub struct FrameSlot<G: Gpu> {
    gpu: Rc<G>,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
    pub descriptor_set: vk::DescriptorSet,
    pub uniforms: MappedBuffer<G>,
    pub instances: MappedBuffer<G>,
}

impl<G: Gpu> Drop for FrameSlot<G> {
    fn drop(&mut self) {
        self.gpu.destroy_fence(self.in_flight);
        self.gpu.destroy_semaphore(self.render_finished);
        self.gpu.destroy_semaphore(self.image_available);
    }
}

pub struct FrameSync<G: Gpu> {
    gpu: Rc<G>,
    pool: vk::CommandPool,
    slots: Vec<FrameSlot<G>>,
    current: usize,
}

impl<G: Gpu> FrameSync<G> {
    /// Creates both slots. Fences start signaled so the first wait on each returns at once.
    pub fn new(
        gpu: Rc<G>,
        store: &ResourceStore<G>,
        descriptor_sets: [vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT],
        instance_capacity: usize,
    ) -> Result<Self> {
        let mut sync = Self {
            pool: gpu.create_command_pool(QueueRole::Graphics, false)?,
            gpu,
            slots: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            current: 0,
        };

        let command_buffers = sync
            .gpu
            .allocate_command_buffers(sync.pool, MAX_FRAMES_IN_FLIGHT as u32)?;
        if command_buffers.len() != MAX_FRAMES_IN_FLIGHT {
            bail!("expected {MAX_FRAMES_IN_FLIGHT} command buffers, got {}", command_buffers.len());
        }
        let uniforms = store.create_per_frame_buffers(
            std::mem::size_of::<UniformBlock>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        let instances = store.create_per_frame_buffers(
            (std::mem::size_of::<InstanceData>() * instance_capacity.max(1)) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        let parts = command_buffers
            .into_iter()
            .zip(descriptor_sets)
            .zip(uniforms.into_iter().zip(instances));
        for ((command_buffer, descriptor_set), (uniforms, instances)) in parts {
            let mut slot = FrameSlot {
                gpu: sync.gpu.clone(),
                image_available: vk::Semaphore::null(),
                render_finished: vk::Semaphore::null(),
                in_flight: vk::Fence::null(),
                command_buffer,
                descriptor_set,
                uniforms,
                instances,
            };
            slot.image_available = sync.gpu.create_semaphore()?;
            slot.render_finished = sync.gpu.create_semaphore()?;
            slot.in_flight = sync.gpu.create_fence(true)?;
            sync.slots.push(slot);
        }
        Ok(sync)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &FrameSlot<G> {
        &self.slots[self.current]
    }

    pub fn current_mut(&mut self) -> &mut FrameSlot<G> {
        &mut self.slots[self.current]
    }

    pub fn slots(&self) -> &[FrameSlot<G>] {
        &self.slots
    }

    /// Blocks until the current slot's previous submission has retired.
    pub fn wait_current(&self) -> Result<()> {
        let slot = self.current();
        while !self.gpu.wait_for_fence(slot.in_flight, FENCE_WAIT_SLICE_NS)? {
            warn!(
                slot = self.current,
                "vk: in-flight fence still busy after {}ms, waiting again",
                FENCE_WAIT_SLICE_NS / 1_000_000
            );
        }
        Ok(())
    }

    /// Only call once an image has been acquired; resetting earlier can deadlock the next wait.
    pub fn reset_current(&self) -> Result<()> {
        self.gpu.reset_fence(self.current().in_flight)
    }

    /// Submits the current slot's command buffer: waits on image-available at color output,
    /// signals render-finished and the in-flight fence.
    pub fn submit_current(&self) -> Result<()> {
        let slot = self.current();
        self.gpu.submit(
            QueueRole::Graphics,
            &Submission {
                command_buffer: slot.command_buffer,
                wait: Some((
                    slot.image_available,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                )),
                signal: Some(slot.render_finished),
                fence: slot.in_flight,
            },
        )
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

impl<G: Gpu> Drop for FrameSync<G> {
    fn drop(&mut self) {
        // Frees the command buffers too.
        self.gpu.destroy_command_pool(self.pool);
    }
}
