// SPDX-License-Identifier: CEPL-1.0
//! In-memory [`Gpu`] for tests.
//!
//! Handles are sequential integers. Host memory is backed by plain byte vectors so
//! mapped writes can be read back. Submissions complete lazily and strictly in
//! submission order whenever something waits on them.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ptr::NonNull;

use anyhow::{bail, Result};
use ash::vk::{self, Handle};

use crate::gpu::{AcquireResult, Gpu, PresentResult, QueueRole, Submission};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    WaitIdle,
    CreateSwapchain {
        handle: u64,
        old: u64,
        extent: vk::Extent2D,
        min_images: u32,
        format: vk::Format,
        present_mode: vk::PresentModeKHR,
    },
    DestroySwapchain(u64),
    Acquire {
        swapchain: u64,
        result: AcquireResult,
    },
    Present {
        swapchain: u64,
        index: u32,
    },
    Submit {
        role: QueueRole,
        index: usize,
        command_buffer: u64,
        fence: u64,
    },
    /// `completed` is the submission that signaled the fence during this wait, if any.
    WaitFence {
        fence: u64,
        completed: Option<usize>,
    },
    /// A fence wait that ran out its timeout with the fence still unsignaled.
    FenceTimeout(u64),
    ResetFence(u64),
    BeginCommandBuffer(u64),
    EndCommandBuffer(u64),
    BeginRenderPass {
        framebuffer: u64,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    },
    EndRenderPass,
    SetViewport {
        width: f32,
        height: f32,
    },
    SetScissor(vk::Extent2D),
    BindPipeline(u64),
    BindVertexBuffers {
        first: u32,
        buffers: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: u64,
        index_type: vk::IndexType,
    },
    BindDescriptorSet(u64),
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    CopyBuffer {
        src: u64,
        dst: u64,
        size: vk::DeviceSize,
    },
    CopyBufferToImage {
        src: u64,
        dst: u64,
    },
    ImageBarrier {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
}

pub struct MockState {
    next_handle: u64,
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    /// Formats reported as usable depth attachments.
    pub depth_formats: Vec<vk::Format>,
    pub families: HashMap<QueueRole, u32>,
    pub calls: Vec<Call>,
    live: HashMap<&'static str, HashSet<u64>>,
    pub bad_destroys: Vec<(&'static str, u64)>,
    host_memory: HashMap<u64, Vec<u8>>,
    buffer_memory: HashMap<u64, u64>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
    images: HashMap<u64, Vec<vk::Image>>,
    image_cursor: HashMap<u64, u32>,
    signaled: HashSet<u64>,
    pending: VecDeque<(usize, u64)>,
    submissions: usize,
    acquires: usize,
    presents: usize,
    /// Unsignaled fence waits still to time out before the GPU catches up.
    fence_stalls: usize,
    pub acquire_overrides: HashMap<usize, AcquireResult>,
    pub present_overrides: HashMap<usize, PresentResult>,
}

pub struct MockGpu {
    pub state: RefCell<MockState>,
}

impl Default for MockGpu {
    fn default() -> Self {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 1,
            ..Default::default()
        };
        memory.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            ..Default::default()
        };

        let families = HashMap::from([
            (QueueRole::Graphics, 0),
            (QueueRole::Present, 0),
            (QueueRole::Transfer, 1),
        ]);

        Self {
            state: RefCell::new(MockState {
                next_handle: 0x100,
                caps,
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                memory,
                depth_formats: vec![vk::Format::D32_SFLOAT],
                families,
                calls: Vec::new(),
                live: HashMap::new(),
                bad_destroys: Vec::new(),
                host_memory: HashMap::new(),
                buffer_memory: HashMap::new(),
                buffer_sizes: HashMap::new(),
                images: HashMap::new(),
                image_cursor: HashMap::new(),
                signaled: HashSet::new(),
                pending: VecDeque::new(),
                submissions: 0,
                acquires: 0,
                presents: 0,
                fence_stalls: 0,
                acquire_overrides: HashMap::new(),
                present_overrides: HashMap::new(),
            }),
        }
    }
}

impl MockState {
    fn create(&mut self, kind: &'static str) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.entry(kind).or_default().insert(handle);
        handle
    }

    fn destroy(&mut self, kind: &'static str, handle: u64) {
        if handle == 0 {
            return;
        }
        let removed = self.live.get_mut(kind).is_some_and(|set| set.remove(&handle));
        if !removed {
            self.bad_destroys.push((kind, handle));
        }
    }

    /// Retires pending submissions up to and including the one that signals `fence`.
    fn complete_until(&mut self, fence: u64) -> Option<usize> {
        while let Some((index, signals)) = self.pending.pop_front() {
            self.signaled.insert(signals);
            if signals == fence {
                return Some(index);
            }
        }
        None
    }

    fn complete_all(&mut self) {
        while let Some((_, fence)) = self.pending.pop_front() {
            self.signaled.insert(fence);
        }
    }
}

impl MockGpu {
    pub fn live(&self, kind: &str) -> usize {
        self.state.borrow().live.get(kind).map_or(0, HashSet::len)
    }

    pub fn live_total(&self) -> usize {
        self.state.borrow().live.values().map(HashSet::len).sum()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Current bytes behind a buffer bound to host-visible memory.
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        let state = self.state.borrow();
        state
            .buffer_memory
            .get(&buffer.as_raw())
            .and_then(|memory| state.host_memory.get(memory))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_window_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().caps.current_extent = vk::Extent2D { width, height };
    }

    /// Overrides the result of the `n`th acquire call (0-based).
    pub fn fail_acquire(&self, n: usize, result: AcquireResult) {
        self.state.borrow_mut().acquire_overrides.insert(n, result);
    }

    /// The next `n` waits on an unsignaled fence time out instead of completing.
    pub fn stall_fence(&self, n: usize) {
        self.state.borrow_mut().fence_stalls = n;
    }

    /// Overrides the result of the `n`th present call (0-based).
    pub fn fail_present(&self, n: usize, result: PresentResult) {
        self.state.borrow_mut().present_overrides.insert(n, result);
    }
}

impl Gpu for MockGpu {
    fn queue_family(&self, role: QueueRole) -> u32 {
        self.state.borrow().families[&role]
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.state.borrow().memory
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let mut props = vk::FormatProperties::default();
        if self.state.borrow().depth_formats.contains(&format) {
            props.optimal_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        props
    }

    fn max_sampler_anisotropy(&self) -> Option<f32> {
        None
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(1)
    }

    fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state.borrow().caps)
    }

    fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state.borrow().formats.clone())
    }

    fn present_modes(&self) -> Result<Vec<vk::PresentModeKHR>> {
        Ok(self.state.borrow().present_modes.clone())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.complete_all();
        state.calls.push(Call::WaitIdle);
        Ok(())
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR<'_>) -> Result<vk::SwapchainKHR> {
        let mut state = self.state.borrow_mut();
        let handle = state.create("swapchain");
        let images = (0..info.min_image_count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::Image::from_raw(raw)
            })
            .collect();
        state.images.insert(handle, images);
        state.calls.push(Call::CreateSwapchain {
            handle,
            old: info.old_swapchain.as_raw(),
            extent: info.image_extent,
            min_images: info.min_image_count,
            format: info.image_format,
            present_mode: info.present_mode,
        });
        Ok(vk::SwapchainKHR::from_raw(handle))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        match self.state.borrow().images.get(&swapchain.as_raw()) {
            Some(images) => Ok(images.clone()),
            None => bail!("unknown swapchain {swapchain:?}"),
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.borrow_mut();
        state.destroy("swapchain", swapchain.as_raw());
        state.images.remove(&swapchain.as_raw());
        if swapchain != vk::SwapchainKHR::null() {
            state.calls.push(Call::DestroySwapchain(swapchain.as_raw()));
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        _signal: vk::Semaphore,
    ) -> Result<AcquireResult> {
        let mut state = self.state.borrow_mut();
        let n = state.acquires;
        state.acquires += 1;
        let raw = swapchain.as_raw();
        let result = match state.acquire_overrides.remove(&n) {
            Some(result) => result,
            None => {
                let count = state.images.get(&raw).map_or(1, Vec::len) as u32;
                let cursor = state.image_cursor.entry(raw).or_insert(0);
                let index = *cursor % count;
                *cursor += 1;
                AcquireResult::Acquired {
                    index,
                    suboptimal: false,
                }
            }
        };
        state.calls.push(Call::Acquire {
            swapchain: raw,
            result,
        });
        Ok(result)
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> Result<PresentResult> {
        let mut state = self.state.borrow_mut();
        let n = state.presents;
        state.presents += 1;
        state.calls.push(Call::Present {
            swapchain: swapchain.as_raw(),
            index: image_index,
        });
        Ok(state
            .present_overrides
            .remove(&n)
            .unwrap_or(PresentResult::Presented))
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> Result<vk::Buffer> {
        if info.size == 0 {
            bail!("zero-sized buffer");
        }
        let mut state = self.state.borrow_mut();
        let handle = state.create("buffer");
        state.buffer_sizes.insert(handle, info.size);
        Ok(vk::Buffer::from_raw(handle))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.borrow_mut();
        state.destroy("buffer", buffer.as_raw());
        state.buffer_memory.remove(&buffer.as_raw());
        state.buffer_sizes.remove(&buffer.as_raw());
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.state.borrow().buffer_sizes.get(&buffer.as_raw()).copied();
        vk::MemoryRequirements {
            size: size.unwrap_or(0),
            alignment: 16,
            memory_type_bits: 0b11,
        }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> Result<()> {
        self.state
            .borrow_mut()
            .buffer_memory
            .insert(buffer.as_raw(), memory.as_raw());
        Ok(())
    }

    fn create_image(&self, _info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image> {
        Ok(vk::Image::from_raw(self.state.borrow_mut().create("image")))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state.borrow_mut().destroy("image", image.as_raw());
    }

    fn image_memory_requirements(&self, _image: vk::Image) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 0,
            alignment: 256,
            memory_type_bits: 0b01,
        }
    }

    fn bind_image_memory(&self, _image: vk::Image, _memory: vk::DeviceMemory) -> Result<()> {
        Ok(())
    }

    fn allocate_memory(&self, size: vk::DeviceSize, _type_index: u32) -> Result<vk::DeviceMemory> {
        let mut state = self.state.borrow_mut();
        let handle = state.create("memory");
        state.host_memory.insert(handle, vec![0; size as usize]);
        Ok(vk::DeviceMemory::from_raw(handle))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.borrow_mut();
        state.destroy("memory", memory.as_raw());
        state.host_memory.remove(&memory.as_raw());
    }

    fn map_memory(&self, memory: vk::DeviceMemory, size: vk::DeviceSize) -> Result<NonNull<u8>> {
        let mut state = self.state.borrow_mut();
        let Some(bytes) = state.host_memory.get_mut(&memory.as_raw()) else {
            bail!("mapping unknown memory {memory:?}");
        };
        if (bytes.len() as vk::DeviceSize) < size {
            bail!("mapping {size} bytes of a {} byte allocation", bytes.len());
        }
        NonNull::new(bytes.as_mut_ptr()).ok_or_else(|| anyhow::anyhow!("null mapping"))
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {}

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView> {
        Ok(vk::ImageView::from_raw(
            self.state.borrow_mut().create("image_view"),
        ))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().destroy("image_view", view.as_raw());
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo<'_>) -> Result<vk::Sampler> {
        Ok(vk::Sampler::from_raw(self.state.borrow_mut().create("sampler")))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state.borrow_mut().destroy("sampler", sampler.as_raw());
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo<'_>) -> Result<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(
            self.state.borrow_mut().create("framebuffer"),
        ))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state
            .borrow_mut()
            .destroy("framebuffer", framebuffer.as_raw());
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(
            self.state.borrow_mut().create("semaphore"),
        ))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state
            .borrow_mut()
            .destroy("semaphore", semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let handle = state.create("fence");
        if signaled {
            state.signaled.insert(handle);
        }
        Ok(vk::Fence::from_raw(handle))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        state.destroy("fence", fence.as_raw());
        state.signaled.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        let raw = fence.as_raw();
        if !state.signaled.contains(&raw) && state.fence_stalls > 0 {
            state.fence_stalls -= 1;
            state.calls.push(Call::FenceTimeout(raw));
            return Ok(false);
        }
        let completed = if state.signaled.contains(&raw) {
            None
        } else {
            let completed = state.complete_until(raw);
            assert!(
                completed.is_some(),
                "waiting on fence {raw:#x} that no submission will signal"
            );
            completed
        };
        state.calls.push(Call::WaitFence {
            fence: raw,
            completed,
        });
        Ok(true)
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.signaled.remove(&fence.as_raw());
        state.calls.push(Call::ResetFence(fence.as_raw()));
        Ok(())
    }

    fn create_command_pool(&self, _role: QueueRole, _transient: bool) -> Result<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(
            self.state.borrow_mut().create("command_pool"),
        ))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state
            .borrow_mut()
            .destroy("command_pool", pool.as_raw());
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        Ok((0..count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, _buffers: &[vk::CommandBuffer]) {}

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, _one_time: bool) -> Result<()> {
        self.state
            .borrow_mut()
            .calls
            .push(Call::BeginCommandBuffer(cmd.as_raw()));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.state
            .borrow_mut()
            .calls
            .push(Call::EndCommandBuffer(cmd.as_raw()));
        Ok(())
    }

    fn submit(&self, role: QueueRole, submission: &Submission) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = state.submissions;
        state.submissions += 1;
        let fence = submission.fence.as_raw();
        if fence != 0 {
            assert!(
                !state.signaled.contains(&fence),
                "submitted with fence {fence:#x} still signaled"
            );
            state.pending.push_back((index, fence));
        }
        state.calls.push(Call::Submit {
            role,
            index,
            command_buffer: submission.command_buffer.as_raw(),
            fence,
        });
        Ok(())
    }

    fn queue_wait_idle(&self, _role: QueueRole) -> Result<()> {
        self.state.borrow_mut().complete_all();
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        // SAFETY: the recorder always passes at least one clear value, the color one first.
        let clear = unsafe { (*info.p_clear_values).color.float32 };
        self.state.borrow_mut().calls.push(Call::BeginRenderPass {
            framebuffer: info.framebuffer.as_raw(),
            extent: info.render_area.extent,
            clear_color: clear,
        });
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.state.borrow_mut().calls.push(Call::EndRenderPass);
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.borrow_mut().calls.push(Call::SetViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state
            .borrow_mut()
            .calls
            .push(Call::SetScissor(scissor.extent));
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state
            .borrow_mut()
            .calls
            .push(Call::BindPipeline(pipeline.as_raw()));
    }

    fn cmd_bind_vertex_buffers(&self, _cmd: vk::CommandBuffer, first: u32, buffers: &[vk::Buffer]) {
        self.state.borrow_mut().calls.push(Call::BindVertexBuffers {
            first,
            buffers: buffers.iter().map(|b| b.as_raw()).collect(),
        });
    }

    fn cmd_bind_index_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        self.state.borrow_mut().calls.push(Call::BindIndexBuffer {
            buffer: buffer.as_raw(),
            index_type,
        });
    }

    fn cmd_bind_descriptor_set(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.state
            .borrow_mut()
            .calls
            .push(Call::BindDescriptorSet(set.as_raw()));
    }

    fn cmd_draw_indexed(&self, _cmd: vk::CommandBuffer, index_count: u32, instance_count: u32) {
        self.state.borrow_mut().calls.push(Call::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn cmd_copy_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        self.state.borrow_mut().calls.push(Call::CopyBuffer {
            src: src.as_raw(),
            dst: dst.as_raw(),
            size,
        });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        _extent: vk::Extent3D,
    ) {
        self.state.borrow_mut().calls.push(Call::CopyBufferToImage {
            src: src.as_raw(),
            dst: dst.as_raw(),
        });
    }

    fn cmd_image_barrier(
        &self,
        _cmd: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier<'_>,
    ) {
        self.state.borrow_mut().calls.push(Call::ImageBarrier {
            old: barrier.old_layout,
            new: barrier.new_layout,
        });
    }
}
