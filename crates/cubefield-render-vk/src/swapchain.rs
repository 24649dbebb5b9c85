// SPDX-License-Identifier: CEPL-1.0
//! Swapchain lifetime: creation, the per-extent resources hanging off it, and rebuilds.
use std::rc::Rc;

use anyhow::{Context, Result};
use ash::vk;
use cubefield_render::{RenderSize, VsyncMode};
use tracing::{debug, info};

use crate::error::RenderError;
use crate::gpu::{AcquireResult, Gpu, PresentResult, QueueRole};
use crate::resources::{DepthTarget, ResourceStore};

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

// Info only
fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        _ => "OTHER",
    }
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// B8G8R8A8_SRGB with sRGB-nonlinear when offered, otherwise whatever the driver lists first.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, RenderError> {
    if formats.contains(&PREFERRED_FORMAT) {
        return Ok(PREFERRED_FORMAT);
    }
    formats.first().copied().ok_or(RenderError::NoSurfaceFormat)
}

/// MAILBOX when asked for and offered, FIFO otherwise (FIFO is always supported).
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], mode: VsyncMode) -> vk::PresentModeKHR {
    match mode {
        VsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// The surface's current extent, or the window size when the surface leaves it to us
/// (`u32::MAX` width). Either way the result is clamped to the surface limits.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    let (width, height) = if caps.current_extent.width != u32::MAX {
        (caps.current_extent.width, caps.current_extent.height)
    } else {
        (want.width, want.height)
    };
    let (min, max) = (caps.min_image_extent, caps.max_image_extent);
    vk::Extent2D {
        width: width.clamp(min.width, max.width.max(min.width)),
        height: height.clamp(min.height, max.height.max(min.height)),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recreate {
    Rebuilt,
    /// Zero-area surface; the old swapchain is untouched.
    Deferred,
}

/// Framebuffer and extent for one acquired image.
#[derive(Clone, Copy, Debug)]
pub struct RenderTarget {
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

pub struct SwapchainManager<G: Gpu> {
    gpu: Rc<G>,
    render_pass: vk::RenderPass,
    surface_format: vk::SurfaceFormatKHR,
    vsync_mode: VsyncMode,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    depth: Option<DepthTarget<G>>,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    generation: u64,
}

impl<G: Gpu> SwapchainManager<G> {
    /// Builds the first swapchain. `surface_format` is fixed for the manager's life since
    /// the render pass was created against it.
    ///
    /// A zero-area window or surface leaves the manager without a chain
    /// ([`Self::is_ready`] is false) until a later [`Self::recreate`] succeeds.
    pub fn create(
        gpu: Rc<G>,
        store: &ResourceStore<G>,
        render_pass: vk::RenderPass,
        surface_format: vk::SurfaceFormatKHR,
        vsync_mode: VsyncMode,
        window: RenderSize,
    ) -> Result<Self> {
        let mut manager = Self {
            gpu,
            render_pass,
            surface_format,
            vsync_mode,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            depth: None,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            generation: 0,
        };
        if manager.recreate(store, window)? == Recreate::Deferred {
            info!("vk: surface has no area yet, first swapchain deferred");
        }
        Ok(manager)
    }

    /// Whether a chain exists to acquire from.
    pub fn is_ready(&self) -> bool {
        self.swapchain != vk::SwapchainKHR::null()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Bumped on every successful rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Takes effect at the next rebuild.
    pub fn set_vsync_mode(&mut self, mode: VsyncMode) {
        self.vsync_mode = mode;
    }

    pub fn render_target(&self, image_index: u32) -> Result<RenderTarget> {
        let framebuffer = *self
            .framebuffers
            .get(image_index as usize)
            .with_context(|| format!("no framebuffer for image {image_index}"))?;
        Ok(RenderTarget {
            framebuffer,
            extent: self.extent,
        })
    }

    pub fn acquire_next_image(
        &self,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> Result<AcquireResult> {
        self.gpu
            .acquire_next_image(self.swapchain, timeout_ns, signal)
    }

    pub fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<PresentResult> {
        self.gpu.present(self.swapchain, image_index, wait)
    }

    /// Rebuilds the chain for `window`, passing the old one as `old_swapchain`.
    ///
    /// Returns [`Recreate::Deferred`] without touching anything when the surface has no
    /// area. Otherwise waits for the device, tears down views, depth and framebuffers,
    /// and builds all of them again.
    pub fn recreate(&mut self, store: &ResourceStore<G>, window: RenderSize) -> Result<Recreate> {
        if window.is_empty() {
            debug!("vk: window is 0x0, swapchain rebuild deferred");
            return Ok(Recreate::Deferred);
        }
        let caps = self.gpu.surface_capabilities()?;
        // Minimized windows report a 0x0 current extent on some platforms; clamping
        // must not turn that into a real size.
        if caps.current_extent.width == 0 || caps.current_extent.height == 0 {
            debug!("vk: surface extent is 0x0, swapchain rebuild deferred");
            return Ok(Recreate::Deferred);
        }
        let extent = choose_extent(&caps, window);
        if extent.width == 0 || extent.height == 0 {
            debug!("vk: surface extent is 0x0, swapchain rebuild deferred");
            return Ok(Recreate::Deferred);
        }

        let formats = self.gpu.surface_formats()?;
        if !formats.contains(&self.surface_format) {
            return Err(RenderError::SurfaceFormatLost(self.surface_format.format).into());
        }
        let modes = self.gpu.present_modes()?;
        let present_mode = choose_present_mode(&modes, self.vsync_mode);
        let image_count = choose_image_count(&caps);

        self.gpu.wait_idle()?;
        self.destroy_per_extent();

        let families = [
            self.gpu.queue_family(QueueRole::Graphics),
            self.gpu.queue_family(QueueRole::Present),
        ];
        let shared = families[0] != families[1];
        let old = self.swapchain;
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.gpu.surface(),
            min_image_count: image_count,
            image_format: self.surface_format.format,
            image_color_space: self.surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: if shared {
                vk::SharingMode::CONCURRENT
            } else {
                vk::SharingMode::EXCLUSIVE
            },
            queue_family_index_count: if shared { 2 } else { 0 },
            p_queue_family_indices: if shared {
                families.as_ptr()
            } else {
                std::ptr::null()
            },
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };
        let swapchain = self
            .gpu
            .create_swapchain(&info)
            .context("create_swapchain")?;
        self.gpu.destroy_swapchain(old);
        self.swapchain = swapchain;
        self.images = self.gpu.swapchain_images(swapchain)?;
        self.extent = extent;
        self.present_mode = present_mode;

        for &image in &self.images {
            let view = self.gpu.create_image_view(&vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.surface_format.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            })?;
            self.views.push(view);
        }

        let depth = store.create_depth_target(extent)?;
        let depth_view = depth.view();
        self.depth = Some(depth);

        for &view in &self.views {
            let attachments = [view, depth_view];
            let fb = self.gpu.create_framebuffer(&vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: self.render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            })?;
            self.framebuffers.push(fb);
        }

        self.generation += 1;
        info!(
            "vk: swapchain #{} format: {}, present_mode: {}, extent: {}x{}, images(min={} → picked={})",
            self.generation,
            fmt_name(self.surface_format.format),
            pm_name(present_mode),
            extent.width,
            extent.height,
            caps.min_image_count,
            self.images.len()
        );
        Ok(Recreate::Rebuilt)
    }

    // Framebuffers reference views and depth, so they go first.
    fn destroy_per_extent(&mut self) {
        for fb in self.framebuffers.drain(..) {
            self.gpu.destroy_framebuffer(fb);
        }
        self.depth = None;
        for view in self.views.drain(..) {
            self.gpu.destroy_image_view(view);
        }
        self.images.clear();
    }
}

impl<G: Gpu> Drop for SwapchainManager<G> {
    fn drop(&mut self) {
        self.destroy_per_extent();
        self.gpu.destroy_swapchain(self.swapchain);
    }
}
