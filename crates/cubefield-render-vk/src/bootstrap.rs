// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, debug messenger, physical device and logical device.
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context, Result};
use ash::{ext::debug_utils, khr::surface, khr::swapchain, vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, warn};

use crate::error::RenderError;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

static ABORT_ON_VALIDATION_ERROR: AtomicBool = AtomicBool::new(false);

/// Queue families for one physical device. Transfer is optional: without a dedicated
/// family, uploads go through the graphics queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilies {
    /// Prefers one family doing graphics and present; prefers a transfer family without
    /// graphics.
    pub fn find(props: &[vk::QueueFamilyProperties], supports_present: impl Fn(u32) -> bool) -> Self {
        let mut families = Self::default();
        for (i, p) in props.iter().enumerate() {
            let i = i as u32;
            if p.queue_count == 0 {
                continue;
            }
            let graphics = p.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = supports_present(i);
            if graphics && present && !(families.graphics.is_some() && families.graphics == families.present) {
                families.graphics = Some(i);
                families.present = Some(i);
            }
            if graphics && families.graphics.is_none() {
                families.graphics = Some(i);
            }
            if present && families.present.is_none() {
                families.present = Some(i);
            }
            if !graphics
                && p.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && families.transfer.is_none()
            {
                families.transfer = Some(i);
            }
        }
        families
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn unique(&self) -> Vec<u32> {
        let mut out: Vec<u32> = [self.graphics, self.present, self.transfer]
            .into_iter()
            .flatten()
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Resolved family indices; transfer falls back to graphics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?types, "{msg}");
        if ABORT_ON_VALIDATION_ERROR.load(Ordering::Relaxed) {
            std::process::abort();
        }
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", ?types, "{msg}");
    } else {
        tracing::trace!(target: "vulkan", ?types, "{msg}");
    }
    vk::FALSE
}

fn messenger_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

pub unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
    abort_on_error: bool,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    ABORT_ON_VALIDATION_ERROR.store(abort_on_error, Ordering::Relaxed);
    let loader = debug_utils::Instance::new(entry, instance);
    let messenger = loader
        .create_debug_utils_messenger(&messenger_info(), None)
        .context("create_debug_utils_messenger")?;
    Ok((loader, messenger))
}

pub unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app = c"cubefield";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let mut layers = Vec::new();
    if validation {
        let available = entry
            .enumerate_instance_layer_properties()
            .context("enumerate_instance_layer_properties")?;
        let found = available
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
        if !found {
            return Err(RenderError::MissingValidationLayer(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            )
            .into());
        }
        layers.push(VALIDATION_LAYER.as_ptr());
        extensions.push(debug_utils::NAME.as_ptr());
    }

    // Chained so instance creation and destruction are covered by the messenger too.
    let mut instance_messenger = messenger_info();
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next: if validation {
            (&mut instance_messenger) as *mut _ as *const c_void
        } else {
            std::ptr::null()
        },
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    Ok(entry.create_instance(&create_info, None)?)
}

pub unsafe fn create_surface(
    entry: &Entry,
    instance: &Instance,
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
) -> Result<vk::SurfaceKHR> {
    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    let wh = window
        .window_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    ash_window::create_surface(entry, instance, dh, wh, None).context("ash_window::create_surface")
}

pub fn display_handle(display: &dyn HasDisplayHandle) -> Result<RawDisplayHandle> {
    Ok(display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw())
}

unsafe fn has_swapchain_extension(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME)
}

/// First suitable device, discrete GPUs before everything else.
pub unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, ResolvedFamilies)> {
    let mut devices = instance.enumerate_physical_devices()?;
    devices.sort_by_key(|&d| {
        instance.get_physical_device_properties(d).device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    });

    for phys in devices {
        let props = instance.get_physical_device_properties(phys);
        let name = CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy();

        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let families = QueueFamilies::find(&qprops, |i| {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        });
        if !families.is_complete() {
            debug!("vk: skipping {name}: no graphics+present queues");
            continue;
        }
        if !has_swapchain_extension(instance, phys) {
            debug!("vk: skipping {name}: no VK_KHR_swapchain");
            continue;
        }
        let formats = surface_loader
            .get_physical_device_surface_formats(phys, surface)
            .unwrap_or_default();
        let modes = surface_loader
            .get_physical_device_surface_present_modes(phys, surface)
            .unwrap_or_default();
        if formats.is_empty() || modes.is_empty() {
            debug!("vk: skipping {name}: surface has no formats or present modes");
            continue;
        }

        let (Some(graphics), Some(present)) = (families.graphics, families.present) else {
            continue;
        };
        let resolved = ResolvedFamilies {
            graphics,
            present,
            transfer: families.transfer.unwrap_or(graphics),
        };
        info!(
            "vk: using {name} (graphics={}, present={}, transfer={})",
            resolved.graphics, resolved.present, resolved.transfer
        );
        return Ok((phys, resolved));
    }
    Err(RenderError::NoSuitableDevice("swapchain support and a usable surface".into()).into())
}

/// Creates the device with one queue per unique family. Returns whether sampler
/// anisotropy got enabled.
pub unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: ResolvedFamilies,
) -> Result<(ash::Device, bool)> {
    let priorities = [1.0_f32];
    let unique = QueueFamilies {
        graphics: Some(families.graphics),
        present: Some(families.present),
        transfer: Some(families.transfer),
    }
    .unique();
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique
        .iter()
        .map(|&family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let supported = instance.get_physical_device_features(phys);
    let anisotropy = supported.sampler_anisotropy == vk::TRUE;
    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: supported.sampler_anisotropy,
        ..Default::default()
    };

    let device_exts = [swapchain::NAME.as_ptr()];
    let info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    let device = instance
        .create_device(phys, &info, None)
        .context("create_device")?;
    Ok((device, anisotropy))
}
