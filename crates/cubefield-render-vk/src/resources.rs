// SPDX-License-Identifier: CEPL-1.0
//! GPU buffers, images and the one-shot uploads that fill them.
//!
//! Every resource here owns an `Rc` to the device and releases itself on drop, so a
//! failure halfway through creating something never leaks the parts already made.
use std::ptr::NonNull;
use std::rc::Rc;

use anyhow::{bail, ensure, Context, Result};
use ash::vk;
use bytemuck::Pod;
use cubefield_render::TextureData;
use tracing::debug;

use crate::error::RenderError;
use crate::gpu::{Gpu, QueueRole, Submission};
use crate::sync::MAX_FRAMES_IN_FLIGHT;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Index of the first memory type allowed by `type_bits` that has all of `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, RenderError> {
    (0..props.memory_type_count)
        .find(|&i| {
            let allowed = type_bits & (1 << i) != 0;
            allowed
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RenderError::NoSuitableMemoryType {
            type_bits,
            required,
        })
}

/// First candidate whose optimal tiling supports depth attachments.
pub fn pick_depth_format(
    candidates: &[vk::Format],
    props: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format, RenderError> {
    candidates
        .iter()
        .copied()
        .find(|&f| {
            props(f)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| RenderError::NoDepthFormat(candidates.to_vec()))
}

fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

// ---------------------------------------------------------------------------
// Owned resources
// ---------------------------------------------------------------------------

pub struct GpuBuffer<G: Gpu> {
    gpu: Rc<G>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl<G: Gpu> GpuBuffer<G> {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

impl<G: Gpu> Drop for GpuBuffer<G> {
    fn drop(&mut self) {
        self.gpu.destroy_buffer(self.buffer);
        if self.memory != vk::DeviceMemory::null() {
            self.gpu.free_memory(self.memory);
        }
    }
}

/// Host-visible buffer that stays mapped for its whole life.
pub struct MappedBuffer<G: Gpu> {
    ptr: NonNull<u8>,
    inner: GpuBuffer<G>,
}

impl<G: Gpu> MappedBuffer<G> {
    fn new(inner: GpuBuffer<G>) -> Result<Self> {
        let ptr = inner.gpu.map_memory(inner.memory, inner.size)?;
        Ok(Self { ptr, inner })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.inner.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.inner.size
    }

    /// Copies `data` to the start of the mapping. Memory is host-coherent, no flush needed.
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<(), RenderError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.inner.size {
            return Err(RenderError::MappedOverflow {
                len: bytes.len(),
                size: self.inner.size,
            });
        }
        // SAFETY: the mapping covers `size` bytes and nothing else aliases it.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr(), bytes.len());
        }
        Ok(())
    }
}

impl<G: Gpu> Drop for MappedBuffer<G> {
    fn drop(&mut self) {
        self.inner.gpu.unmap_memory(self.inner.memory);
    }
}

pub struct GpuImage<G: Gpu> {
    gpu: Rc<G>,
    image: vk::Image,
    memory: vk::DeviceMemory,
}

impl<G: Gpu> GpuImage<G> {
    pub fn handle(&self) -> vk::Image {
        self.image
    }
}

impl<G: Gpu> Drop for GpuImage<G> {
    fn drop(&mut self) {
        self.gpu.destroy_image(self.image);
        if self.memory != vk::DeviceMemory::null() {
            self.gpu.free_memory(self.memory);
        }
    }
}

pub struct ImageView<G: Gpu> {
    gpu: Rc<G>,
    view: vk::ImageView,
}

impl<G: Gpu> ImageView<G> {
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl<G: Gpu> Drop for ImageView<G> {
    fn drop(&mut self) {
        self.gpu.destroy_image_view(self.view);
    }
}

pub struct Sampler<G: Gpu> {
    gpu: Rc<G>,
    sampler: vk::Sampler,
}

impl<G: Gpu> Sampler<G> {
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl<G: Gpu> Drop for Sampler<G> {
    fn drop(&mut self) {
        self.gpu.destroy_sampler(self.sampler);
    }
}

/// Depth image sized to the swapchain. Views drop before their image.
pub struct DepthTarget<G: Gpu> {
    view: ImageView<G>,
    _image: GpuImage<G>,
    format: vk::Format,
}

impl<G: Gpu> DepthTarget<G> {
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

pub struct Texture<G: Gpu> {
    sampler: Sampler<G>,
    view: ImageView<G>,
    _image: GpuImage<G>,
}

impl<G: Gpu> Texture<G> {
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct ResourceStore<G: Gpu> {
    gpu: Rc<G>,
    memory: vk::PhysicalDeviceMemoryProperties,
    graphics_pool: vk::CommandPool,
    transfer_pool: vk::CommandPool,
}

impl<G: Gpu> ResourceStore<G> {
    pub fn new(gpu: Rc<G>) -> Result<Self> {
        let memory = gpu.memory_properties();
        let mut store = Self {
            gpu,
            memory,
            graphics_pool: vk::CommandPool::null(),
            transfer_pool: vk::CommandPool::null(),
        };
        store.graphics_pool = store.gpu.create_command_pool(QueueRole::Graphics, true)?;
        store.transfer_pool = store.gpu.create_command_pool(QueueRole::Transfer, true)?;
        Ok(store)
    }

    pub fn depth_format(&self) -> Result<vk::Format, RenderError> {
        pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |f| self.gpu.format_properties(f))
    }

    /// Allocates and binds a buffer. Buffers touched by the transfer queue are shared
    /// concurrently when it is a separate family from graphics.
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<GpuBuffer<G>> {
        ensure!(size > 0, "refusing to create an empty buffer");

        let families = [
            self.gpu.queue_family(QueueRole::Graphics),
            self.gpu.queue_family(QueueRole::Transfer),
        ];
        let transfer_usage = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
        let concurrent = usage.intersects(transfer_usage) && families[0] != families[1];

        let info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: if concurrent {
                vk::SharingMode::CONCURRENT
            } else {
                vk::SharingMode::EXCLUSIVE
            },
            queue_family_index_count: if concurrent { 2 } else { 0 },
            p_queue_family_indices: if concurrent {
                families.as_ptr()
            } else {
                std::ptr::null()
            },
            ..Default::default()
        };
        let mut buffer = GpuBuffer {
            gpu: self.gpu.clone(),
            buffer: self.gpu.create_buffer(&info)?,
            memory: vk::DeviceMemory::null(),
            size,
        };

        let req = self.gpu.buffer_memory_requirements(buffer.buffer);
        let type_index = find_memory_type(&self.memory, req.memory_type_bits, props)?;
        buffer.memory = self.gpu.allocate_memory(req.size, type_index)?;
        self.gpu.bind_buffer_memory(buffer.buffer, buffer.memory)?;
        Ok(buffer)
    }

    /// Device-local buffer filled through a staging copy on the transfer queue.
    pub fn create_static_buffer(
        &self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<GpuBuffer<G>> {
        let size = data.len() as vk::DeviceSize;
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let mut staging = MappedBuffer::new(self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            host,
        )?)?;
        staging.write(data)?;

        let dst = self.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.one_shot(QueueRole::Transfer, |gpu, cmd| {
            gpu.cmd_copy_buffer(cmd, staging.handle(), dst.handle(), size);
        })
        .context("uploading static buffer")?;

        debug!(bytes = size, ?usage, "static buffer uploaded");
        Ok(dst)
    }

    /// One persistently-mapped host-visible buffer per frame slot.
    pub fn create_per_frame_buffers(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<[MappedBuffer<G>; MAX_FRAMES_IN_FLIGHT]> {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let mut buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            buffers.push(MappedBuffer::new(self.create_buffer(size, usage, host)?)?);
        }
        match buffers.try_into() {
            Ok(array) => Ok(array),
            Err(_) => bail!("expected {MAX_FRAMES_IN_FLIGHT} per-frame buffers"),
        }
    }

    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<GpuImage<G>> {
        let info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let mut image = GpuImage {
            gpu: self.gpu.clone(),
            image: self.gpu.create_image(&info)?,
            memory: vk::DeviceMemory::null(),
        };

        let req = self.gpu.image_memory_requirements(image.image);
        let type_index = find_memory_type(
            &self.memory,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        image.memory = self.gpu.allocate_memory(req.size, type_index)?;
        self.gpu.bind_image_memory(image.image, image.memory)?;
        Ok(image)
    }

    pub fn create_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<ImageView<G>> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        Ok(ImageView {
            gpu: self.gpu.clone(),
            view: self.gpu.create_image_view(&info)?,
        })
    }

    pub fn create_depth_target(&self, extent: vk::Extent2D) -> Result<DepthTarget<G>> {
        let format = self.depth_format()?;
        let image = self.create_image(
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;
        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil(format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        let view = self.create_view(image.handle(), format, aspect)?;
        Ok(DepthTarget {
            view,
            _image: image,
            format,
        })
    }

    /// Uploads RGBA8 pixels and leaves the image in SHADER_READ_ONLY_OPTIMAL.
    pub fn create_texture(&self, texture: &TextureData) -> Result<Texture<G>> {
        let expected = texture.width as usize * texture.height as usize * 4;
        ensure!(
            texture.width > 0 && texture.height > 0 && texture.pixels.len() == expected,
            "texture {}x{} needs {expected} bytes, got {}",
            texture.width,
            texture.height,
            texture.pixels.len()
        );

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let mut staging = MappedBuffer::new(self.create_buffer(
            expected as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            host,
        )?)?;
        staging.write(&texture.pixels)?;

        let extent = vk::Extent2D {
            width: texture.width,
            height: texture.height,
        };
        let image = self.create_image(
            extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        let color_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let to_transfer = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::TRANSFER_WRITE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: image.handle(),
            subresource_range: color_range,
            ..Default::default()
        };
        let to_shader = vk::ImageMemoryBarrier {
            src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ..to_transfer
        };

        self.one_shot(QueueRole::Graphics, |gpu, cmd| {
            gpu.cmd_image_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &to_transfer,
            );
            gpu.cmd_copy_buffer_to_image(
                cmd,
                staging.handle(),
                image.handle(),
                vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            );
            gpu.cmd_image_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &to_shader,
            );
        })
        .context("uploading texture")?;

        let view = self.create_view(image.handle(), TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR)?;

        let anisotropy = self.gpu.max_sampler_anisotropy();
        let sampler_info = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            anisotropy_enable: anisotropy.is_some() as vk::Bool32,
            max_anisotropy: anisotropy.unwrap_or(1.0),
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            compare_op: vk::CompareOp::ALWAYS,
            ..Default::default()
        };
        let sampler = Sampler {
            gpu: self.gpu.clone(),
            sampler: self.gpu.create_sampler(&sampler_info)?,
        };

        debug!(width = texture.width, height = texture.height, "texture uploaded");
        Ok(Texture {
            sampler,
            view,
            _image: image,
        })
    }

    /// Records `record` into a throwaway command buffer, submits it and waits for the queue.
    fn one_shot(&self, role: QueueRole, record: impl FnOnce(&G, vk::CommandBuffer)) -> Result<()> {
        let pool = match role {
            QueueRole::Transfer => self.transfer_pool,
            _ => self.graphics_pool,
        };
        let cmd = self
            .gpu
            .allocate_command_buffers(pool, 1)?
            .pop()
            .context("driver returned no command buffer")?;

        let gpu = &*self.gpu;
        let result = (|| -> Result<()> {
            gpu.begin_command_buffer(cmd, true)?;
            record(gpu, cmd);
            gpu.end_command_buffer(cmd)?;
            gpu.submit(
                role,
                &Submission {
                    command_buffer: cmd,
                    wait: None,
                    signal: None,
                    fence: vk::Fence::null(),
                },
            )?;
            gpu.queue_wait_idle(role)
        })();

        gpu.free_command_buffers(pool, &[cmd]);
        result
    }
}

impl<G: Gpu> Drop for ResourceStore<G> {
    fn drop(&mut self) {
        self.gpu.destroy_command_pool(self.transfer_pool);
        self.gpu.destroy_command_pool(self.graphics_pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockGpu};

    fn store() -> (Rc<MockGpu>, ResourceStore<MockGpu>) {
        let gpu = Rc::new(MockGpu::default());
        let store = ResourceStore::new(gpu.clone()).expect("store");
        (gpu, store)
    }

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = *f;
        }
        props
    }

    #[test]
    fn memory_type_respects_type_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = props(&[host, vk::MemoryPropertyFlags::DEVICE_LOCAL, host]);
        assert_eq!(find_memory_type(&p, 0b111, host).unwrap(), 0);
        assert_eq!(find_memory_type(&p, 0b110, host).unwrap(), 2);
    }

    #[test]
    fn missing_memory_type_is_fatal() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, RenderError::NoSuitableMemoryType { type_bits: 1, .. }));
    }

    #[test]
    fn depth_format_falls_through_candidates() {
        let supported = |f: vk::Format| {
            let mut p = vk::FormatProperties::default();
            if f == vk::Format::D24_UNORM_S8_UINT {
                p.optimal_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
            }
            p
        };
        assert_eq!(
            pick_depth_format(&DEPTH_FORMAT_CANDIDATES, supported).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
    }

    #[test]
    fn no_depth_format_is_fatal() {
        let (gpu, store) = store();
        gpu.state.borrow_mut().depth_formats.clear();
        let err = store
            .create_depth_target(vk::Extent2D {
                width: 8,
                height: 8,
            })
            .err()
            .expect("depth target without a depth format");
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::NoDepthFormat(_))
        ));
        assert_eq!(gpu.live("image"), 0);
    }

    #[test]
    fn static_buffer_goes_through_staging_copy() {
        let (gpu, store) = store();
        let data = [7u8; 64];
        let buffer = store
            .create_static_buffer(&data, vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap();

        let copies: Vec<_> = gpu
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CopyBuffer { .. }))
            .collect();
        assert_eq!(copies.len(), 1);
        assert!(matches!(copies[0], Call::CopyBuffer { dst, size: 64, .. } if dst == vk::Handle::as_raw(buffer.handle())));

        // Staging is gone once the upload finished.
        assert_eq!(gpu.live("buffer"), 1);
        drop(buffer);
        assert_eq!(gpu.live("buffer"), 0);
        assert_eq!(gpu.live("memory"), 0);
    }

    #[test]
    fn mapped_write_is_visible_and_bounded() {
        let (gpu, store) = store();
        let [mut a, _b] = store
            .create_per_frame_buffers(16, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .unwrap();
        let values = [1.0f32, 2.0, 3.0, 4.0];
        a.write(&values).unwrap();
        let bytes = gpu.buffer_contents(a.handle());
        assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<f32, u8>(&values));

        let err = a.write(&[0u8; 17]).unwrap_err();
        assert!(matches!(err, RenderError::MappedOverflow { len: 17, size: 16 }));
    }

    #[test]
    fn texture_upload_transitions_layouts_in_order() {
        let (gpu, store) = store();
        let texture = store
            .create_texture(&TextureData::checkerboard(4, 2))
            .unwrap();
        let barriers: Vec<_> = gpu
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ImageBarrier { old, new } => Some((old, new)),
                _ => None,
            })
            .collect();
        assert_eq!(
            barriers,
            vec![
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                ),
            ]
        );
        assert_eq!(gpu.live("sampler"), 1);
        drop(texture);
        assert_eq!(gpu.live("image"), 0);
        assert_eq!(gpu.live("sampler"), 0);
        assert_eq!(gpu.live("image_view"), 0);
    }

    #[test]
    fn malformed_texture_is_rejected() {
        let (_gpu, store) = store();
        let bad = TextureData {
            width: 4,
            height: 4,
            pixels: vec![0; 10],
        };
        assert!(store.create_texture(&bad).is_err());
    }

    #[test]
    fn store_releases_everything() {
        let (gpu, store) = store();
        let depth = store
            .create_depth_target(vk::Extent2D {
                width: 32,
                height: 32,
            })
            .unwrap();
        assert_eq!(depth.format(), vk::Format::D32_SFLOAT);
        drop(depth);
        drop(store);
        assert_eq!(gpu.live_total(), 0);
        assert!(gpu.state.borrow().bad_destroys.is_empty());
    }
}
