// SPDX-License-Identifier: CEPL-1.0
//! [`Gpu`] on top of a real Vulkan device.
use std::ptr::NonNull;

use anyhow::{anyhow, Context, Result};
use ash::{ext::debug_utils, khr::surface, khr::swapchain, vk, Entry, Instance};
use cubefield_render::RenderSettings;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::bootstrap::{self, ResolvedFamilies};
use crate::gpu::{AcquireResult, Gpu, PresentResult, QueueRole, Submission};

// STRICT TEARDOWN ORDER (see Drop):
// - device_wait_idle()
// - Destroy device (every device object is gone by then; they hold an Rc to us)
// - Destroy surface AFTER device
// - Debug messenger, then instance last.
pub struct AshGpu {
    _entry: Entry,
    instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    device: ash::Device,
    swapchain_loader: swapchain::Device,
    families: ResolvedFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_queue: vk::Queue,
    memory: vk::PhysicalDeviceMemoryProperties,
    max_anisotropy: Option<f32>,
}

impl AshGpu {
    /// STRICT ORDER:
    /// 1) Instance (WSI extensions, validation layer when asked for)
    /// 2) Surface from this instance
    /// 3) Physical device + queue families checked against this surface
    /// 4) Logical device and its queues
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> Result<Self> {
        unsafe {
            let entry = Entry::load().context("loading the Vulkan library")?;
            let dh = bootstrap::display_handle(display)?;
            let instance = bootstrap::create_instance(&entry, dh, settings.validation)
                .context("create_instance")?;

            let debug = if settings.validation {
                match bootstrap::create_debug_messenger(
                    &entry,
                    &instance,
                    settings.abort_on_validation_error,
                ) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let mut partial = Partial {
                instance: &instance,
                debug: debug.as_ref(),
                surface_loader: &surface_loader,
                surface: vk::SurfaceKHR::null(),
                armed: true,
            };
            partial.surface = bootstrap::create_surface(&entry, &instance, window, display)?;
            let surface = partial.surface;

            let (phys, families) =
                bootstrap::pick_physical_device(&instance, &surface_loader, surface)?;
            let (device, anisotropy) = bootstrap::create_device(&instance, phys, families)?;
            partial.armed = false;
            drop(partial);

            let graphics_queue = device.get_device_queue(families.graphics, 0);
            let present_queue = device.get_device_queue(families.present, 0);
            let transfer_queue = device.get_device_queue(families.transfer, 0);
            let swapchain_loader = swapchain::Device::new(&instance, &device);
            let memory = instance.get_physical_device_memory_properties(phys);
            let max_anisotropy = anisotropy
                .then(|| instance.get_physical_device_properties(phys).limits.max_sampler_anisotropy);

            info!(
                "vk: device ready (validation={}, anisotropy={:?})",
                settings.validation, max_anisotropy
            );

            Ok(Self {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys,
                device,
                swapchain_loader,
                families,
                graphics_queue,
                present_queue,
                transfer_queue,
                memory,
                max_anisotropy,
            })
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    fn queue(&self, role: QueueRole) -> vk::Queue {
        match role {
            QueueRole::Graphics => self.graphics_queue,
            QueueRole::Present => self.present_queue,
            QueueRole::Transfer => self.transfer_queue,
        }
    }
}

/// Tears down instance-level objects if device setup fails halfway.
struct Partial<'a> {
    instance: &'a Instance,
    debug: Option<&'a (debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: &'a surface::Instance,
    surface: vk::SurfaceKHR,
    armed: bool,
}

impl Drop for Partial<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((loader, messenger)) = self.debug {
                loader.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl Drop for AshGpu {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl Gpu for AshGpu {
    fn queue_family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Graphics => self.families.graphics,
            QueueRole::Present => self.families.present,
            QueueRole::Transfer => self.families.transfer,
        }
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.phys, format)
        }
    }

    fn max_sampler_anisotropy(&self) -> Option<f32> {
        self.max_anisotropy
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
                .context("get_physical_device_surface_capabilities")
        }
    }

    fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)
                .context("get_physical_device_surface_formats")
        }
    }

    fn present_modes(&self) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
                .context("get_physical_device_surface_present_modes")
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle().context("device_wait_idle") }
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> Result<vk::SwapchainKHR> {
        unsafe { Ok(self.swapchain_loader.create_swapchain(info, None)?) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        unsafe { Ok(self.swapchain_loader.get_swapchain_images(swapchain)?) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> Result<AcquireResult> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquireResult::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(AcquireResult::Timeout),
            Err(e) => Err(anyhow!("acquire_next_image: {e:?}")),
        }
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentResult> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        match unsafe { self.swapchain_loader.queue_present(self.present_queue, &present) } {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) => Ok(PresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> Result<vk::Buffer> {
        unsafe { Ok(self.device.create_buffer(info, None)?) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> Result<()> {
        unsafe { Ok(self.device.bind_buffer_memory(buffer, memory, 0)?) }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image> {
        unsafe { Ok(self.device.create_image(info, None)?) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory) -> Result<()> {
        unsafe { Ok(self.device.bind_image_memory(image, memory, 0)?) }
    }

    fn allocate_memory(&self, size: vk::DeviceSize, type_index: u32) -> Result<vk::DeviceMemory> {
        let info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: size,
            memory_type_index: type_index,
            ..Default::default()
        };
        unsafe { Ok(self.device.allocate_memory(&info, None)?) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn map_memory(&self, memory: vk::DeviceMemory, size: vk::DeviceSize) -> Result<NonNull<u8>> {
        let ptr = unsafe {
            self.device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())?
        };
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| anyhow!("map_memory returned null"))
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView> {
        unsafe { Ok(self.device.create_image_view(info, None)?) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> Result<vk::Sampler> {
        unsafe { Ok(self.device.create_sampler(info, None)?) }
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> Result<vk::Framebuffer> {
        unsafe { Ok(self.device.create_framebuffer(info, None)?) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { Ok(self.device.create_semaphore(&info, None)?) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { Ok(self.device.create_fence(&info, None)?) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<bool> {
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(anyhow!("wait_for_fences: {e:?}")),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.reset_fences(&[fence]).context("reset_fences") }
    }

    fn create_command_pool(&self, role: QueueRole, transient: bool) -> Result<vk::CommandPool> {
        let mut flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        if transient {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags,
            queue_family_index: self.queue_family(role),
            ..Default::default()
        };
        unsafe { Ok(self.device.create_command_pool(&info, None)?) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { Ok(self.device.allocate_command_buffers(&info)?) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, one_time: bool) -> Result<()> {
        let info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: if one_time {
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
            } else {
                vk::CommandBufferUsageFlags::empty()
            },
            ..Default::default()
        };
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            Ok(self.device.begin_command_buffer(cmd, &info)?)
        }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { Ok(self.device.end_command_buffer(cmd)?) }
    }

    fn submit(&self, role: QueueRole, submission: &Submission) -> Result<()> {
        let (wait_sems, wait_stages): (Vec<_>, Vec<_>) = submission.wait.into_iter().unzip();
        let signal_sems: Vec<_> = submission.signal.into_iter().collect();
        let info = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait_sems.len() as u32,
            p_wait_semaphores: wait_sems.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &submission.command_buffer,
            signal_semaphore_count: signal_sems.len() as u32,
            p_signal_semaphores: signal_sems.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.queue(role), std::slice::from_ref(&info), submission.fence)
                .context("queue_submit")
        }
    }

    fn queue_wait_idle(&self, role: QueueRole) -> Result<()> {
        unsafe {
            self.device
                .queue_wait_idle(self.queue(role))
                .context("queue_wait_idle")
        }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, &[scissor]) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, first: u32, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(cmd, first, buffers, &offsets)
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, 0, index_type) }
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        }
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(cmd, index_count, instance_count, 0, 0, 0)
        }
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, &[region]) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        extent: vk::Extent3D,
    ) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: extent,
        };
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                cmd,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        }
    }

    fn cmd_image_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier<'_>,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            )
        }
    }
}
