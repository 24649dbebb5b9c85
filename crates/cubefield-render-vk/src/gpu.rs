// SPDX-License-Identifier: CEPL-1.0
//! The device seam used by the frame logic.
//!
//! Everything the swapchain manager, resource store, frame sync and command recorder do
//! to the GPU goes through [`Gpu`]. `AshGpu` forwards to Vulkan; tests use an in-memory
//! mock that records calls and completes submissions in order.
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Graphics,
    Present,
    Transfer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired { index: u32, suboptimal: bool },
    OutOfDate,
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// One command buffer submission with optional semaphore wait/signal and fence.
#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal: Option<vk::Semaphore>,
    /// `vk::Fence::null()` for none.
    pub fence: vk::Fence,
}

pub trait Gpu {
    // --- Capabilities -------------------------------------------------------
    fn queue_family(&self, role: QueueRole) -> u32;
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;
    /// `Some(max)` when sampler anisotropy was enabled on the device.
    fn max_sampler_anisotropy(&self) -> Option<f32>;
    fn surface(&self) -> vk::SurfaceKHR;
    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>>;
    fn present_modes(&self) -> Result<Vec<vk::PresentModeKHR>>;
    fn wait_idle(&self) -> Result<()>;

    // --- Swapchain ----------------------------------------------------------
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> Result<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> Result<AcquireResult>;
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentResult>;

    // --- Memory, buffers, images -------------------------------------------
    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> Result<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> Result<()>;
    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> Result<()>;
    fn allocate_memory(&self, size: vk::DeviceSize, type_index: u32) -> Result<vk::DeviceMemory>;
    fn free_memory(&self, memory: vk::DeviceMemory);
    fn map_memory(&self, memory: vk::DeviceMemory, size: vk::DeviceSize) -> Result<NonNull<u8>>;
    fn unmap_memory(&self, memory: vk::DeviceMemory);
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> Result<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // --- Synchronization ----------------------------------------------------
    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// `Ok(false)` when the timeout elapsed first.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<bool>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    // --- Commands -----------------------------------------------------------
    fn create_command_pool(&self, role: QueueRole, transient: bool) -> Result<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    /// Resets the buffer and begins recording.
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, one_time: bool) -> Result<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;
    fn submit(&self, role: QueueRole, submission: &Submission) -> Result<()>;
    fn queue_wait_idle(&self, role: QueueRole) -> Result<()>;

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, first: u32, buffers: &[vk::Buffer]);
    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    );
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32);
    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    );
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        extent: vk::Extent3D,
    );
    fn cmd_image_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier<'_>,
    );
}
