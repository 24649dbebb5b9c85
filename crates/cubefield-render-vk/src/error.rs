// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Conditions the renderer cannot recover from.
///
/// These are raised through `anyhow` like everything else; callers that care can
/// `downcast_ref::<RenderError>()`.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no memory type matches type bits {type_bits:#b} with {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("none of the depth formats {0:?} support optimal-tiling depth attachments")]
    NoDepthFormat(Vec<vk::Format>),

    #[error("shader blob is {0} bytes, SPIR-V needs a multiple of 4")]
    ShaderSize(usize),

    #[error("validation layer {0} was requested but is not installed")]
    MissingValidationLayer(String),

    #[error("no physical device offers graphics + present queues, {0}")]
    NoSuitableDevice(String),

    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("surface no longer offers {0:?} after recreation")]
    SurfaceFormatLost(vk::Format),

    #[error("write of {len} bytes does not fit mapped buffer of {size} bytes")]
    MappedOverflow { len: usize, size: vk::DeviceSize },
}
