// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;

use crate::gpu::Gpu;
use crate::swapchain::RenderTarget;
use crate::sync::FrameSlot;

/// Geometry handed to each draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawState {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub instance_count: u32,
}

/// Records the single render pass that draws every cube instance.
#[derive(Clone, Copy, Debug)]
pub struct CommandRecorder {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub clear_color: [f32; 4],
}

impl CommandRecorder {
    /// Re-records `slot.command_buffer` from scratch for `target`.
    ///
    /// Vertex data is bound at binding 0, per-instance transforms at binding 1.
    pub fn record<G: Gpu>(
        &self,
        gpu: &G,
        target: RenderTarget,
        slot: &FrameSlot<G>,
        draw: &DrawState,
    ) -> Result<()> {
        let cmd = slot.command_buffer;
        gpu.begin_command_buffer(cmd, true)?;

        let clear = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.render_pass,
            framebuffer: target.framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            },
            clear_value_count: clear.len() as u32,
            p_clear_values: clear.as_ptr(),
            ..Default::default()
        };
        gpu.cmd_begin_render_pass(cmd, &begin);

        gpu.cmd_set_viewport(
            cmd,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: target.extent.width as f32,
                height: target.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        gpu.cmd_set_scissor(
            cmd,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            },
        );

        gpu.cmd_bind_pipeline(cmd, self.pipeline);
        gpu.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer, slot.instances.handle()]);
        gpu.cmd_bind_index_buffer(cmd, draw.index_buffer, vk::IndexType::UINT16);
        gpu.cmd_bind_descriptor_set(cmd, self.pipeline_layout, slot.descriptor_set);
        gpu.cmd_draw_indexed(cmd, draw.index_count, draw.instance_count);

        gpu.cmd_end_render_pass(cmd);
        gpu.end_command_buffer(cmd)
    }
}
