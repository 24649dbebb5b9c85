// SPDX-License-Identifier: CEPL-1.0
//! Render pass, descriptor layout and the single graphics pipeline that draws the cubes.
use std::ffi::CStr;
use std::io::Cursor;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use ash::util::read_spv;
use ash::vk;
use cubefield_render::{InstanceData, UniformBlock, Vertex};
use tracing::debug;

use crate::ash_gpu::AshGpu;
use crate::error::RenderError;
use crate::frame_loop::FrameLoop;
use crate::sync::MAX_FRAMES_IN_FLIGHT;

pub const VERTEX_SHADER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.vert.spv"));
pub const FRAGMENT_SHADER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.frag.spv"));

const ENTRY_POINT: &CStr = c"main";

/// SPIR-V words from a raw blob. Rejects lengths that are not a multiple of 4.
pub fn shader_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(RenderError::ShaderSize(bytes.len()).into());
    }
    read_spv(&mut Cursor::new(bytes)).context("read_spv")
}

pub fn vertex_bindings() -> [vk::VertexInputBindingDescription; 2] {
    [
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        vk::VertexInputBindingDescription {
            binding: 1,
            stride: std::mem::size_of::<InstanceData>() as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        },
    ]
}

/// Locations 0..2 are per-vertex; 3..6 are the four columns of the instance matrix.
pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 7] {
    let vec3 = std::mem::size_of::<[f32; 3]>() as u32;
    let column = |i: u32| vk::VertexInputAttributeDescription {
        location: 3 + i,
        binding: 1,
        format: vk::Format::R32G32B32A32_SFLOAT,
        offset: i * std::mem::size_of::<[f32; 4]>() as u32,
    };
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: vec3,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 2 * vec3,
        },
        column(0),
        column(1),
        column(2),
        column(3),
    ]
}

unsafe fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ];
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    // Image-available is waited at color output, so the layout transition has to wait too.
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages,
        dst_stage_mask: stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    };
    let info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    Ok(device.create_render_pass(&info, None)?)
}

unsafe fn create_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ];
    let info = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    Ok(device.create_descriptor_set_layout(&info, None)?)
}

unsafe fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
        },
    ];
    let info = vk::DescriptorPoolCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
        max_sets: MAX_FRAMES_IN_FLIGHT as u32,
        pool_size_count: sizes.len() as u32,
        p_pool_sizes: sizes.as_ptr(),
        ..Default::default()
    };
    Ok(device.create_descriptor_pool(&info, None)?)
}

unsafe fn create_shader_module(device: &ash::Device, bytes: &[u8]) -> Result<vk::ShaderModule> {
    let code = shader_words(bytes)?;
    let info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    Ok(device.create_shader_module(&info, None)?)
}

unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline> {
    let vs = create_shader_module(device, VERTEX_SHADER).context("vertex shader")?;
    let fs = match create_shader_module(device, FRAGMENT_SHADER).context("fragment shader") {
        Ok(fs) => fs,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            return Err(e);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: ENTRY_POINT.as_ptr(),
            ..Default::default()
        },
    ];

    let bindings = vertex_bindings();
    let attributes = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: bindings.len() as u32,
        p_vertex_binding_descriptions: bindings.as_ptr(),
        vertex_attribute_description_count: attributes.len() as u32,
        p_vertex_attribute_descriptions: attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    // Cube faces are not wound consistently, so nothing is culled.
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let result = device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&info),
        None,
    );
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);

    match result {
        Ok(pipelines) => pipelines
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("create_graphics_pipelines returned nothing")),
        Err((_, err)) => Err(anyhow!("create_graphics_pipelines failed: {err:?}")),
    }
}

/// Device objects that live as long as the renderer and never change with the swapchain.
pub struct PipelineObjects {
    gpu: Rc<AshGpu>,
    pub render_pass: vk::RenderPass,
    pub set_layout: vk::DescriptorSetLayout,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub descriptor_pool: vk::DescriptorPool,
}

impl PipelineObjects {
    pub fn new(gpu: Rc<AshGpu>, color_format: vk::Format, depth_format: vk::Format) -> Result<Self> {
        let mut objects = Self {
            gpu,
            render_pass: vk::RenderPass::null(),
            set_layout: vk::DescriptorSetLayout::null(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            descriptor_pool: vk::DescriptorPool::null(),
        };
        let device = objects.gpu.device();
        unsafe {
            objects.render_pass = create_render_pass(device, color_format, depth_format)
                .context("create_render_pass")?;
            objects.set_layout = create_set_layout(device).context("create_set_layout")?;
            objects.layout = device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo {
                    s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
                    set_layout_count: 1,
                    p_set_layouts: &objects.set_layout,
                    ..Default::default()
                },
                None,
            )?;
            objects.pipeline = create_pipeline(device, objects.render_pass, objects.layout)?;
            objects.descriptor_pool = create_descriptor_pool(device)?;
        }
        debug!(?color_format, ?depth_format, "vk: pipeline ready");
        Ok(objects)
    }

    pub fn allocate_sets(&self) -> Result<[vk::DescriptorSet; MAX_FRAMES_IN_FLIGHT]> {
        let layouts = [self.set_layout; MAX_FRAMES_IN_FLIGHT];
        let info = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: self.descriptor_pool,
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let sets = unsafe { self.gpu.device().allocate_descriptor_sets(&info)? };
        sets.try_into()
            .map_err(|_| anyhow!("expected {MAX_FRAMES_IN_FLIGHT} descriptor sets"))
    }

    /// Points each slot's set at its own uniform buffer and the shared texture.
    pub fn write_sets(&self, frame_loop: &FrameLoop<AshGpu>) {
        let texture = frame_loop.texture();
        let image_info = vk::DescriptorImageInfo {
            sampler: texture.sampler(),
            image_view: texture.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        for slot in frame_loop.slots() {
            let buffer_info = vk::DescriptorBufferInfo {
                buffer: slot.uniforms.handle(),
                offset: 0,
                range: std::mem::size_of::<UniformBlock>() as vk::DeviceSize,
            };
            let writes = [
                vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: slot.descriptor_set,
                    dst_binding: 0,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    p_buffer_info: &buffer_info,
                    ..Default::default()
                },
                vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: slot.descriptor_set,
                    dst_binding: 1,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    p_image_info: &image_info,
                    ..Default::default()
                },
            ];
            unsafe { self.gpu.device().update_descriptor_sets(&writes, &[]) };
        }
    }
}

impl Drop for PipelineObjects {
    fn drop(&mut self) {
        let device = self.gpu.device();
        unsafe {
            // Destroying the pool frees its sets.
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_blob_must_be_word_aligned() {
        let err = shader_words(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::ShaderSize(10))
        ));
    }

    #[test]
    fn compiled_shaders_are_valid_spirv() {
        for blob in [VERTEX_SHADER, FRAGMENT_SHADER] {
            let words = shader_words(blob).unwrap();
            assert_eq!(words[0], 0x0723_0203);
        }
    }

    #[test]
    fn vertex_layout_matches_scene_types() {
        let bindings = vertex_bindings();
        assert_eq!(bindings[0].stride, 32);
        assert_eq!(bindings[1].stride, 64);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);

        let attrs = vertex_attributes();
        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        assert_eq!(locations, (0..7).collect::<Vec<_>>());
        let uv = &attrs[2];
        assert_eq!((uv.offset, uv.format), (24, vk::Format::R32G32_SFLOAT));
        let columns: Vec<u32> = attrs[3..].iter().map(|a| a.offset).collect();
        assert_eq!(columns, vec![0, 16, 32, 48]);
        assert!(attrs[3..].iter().all(|a| a.binding == 1));
    }
}
