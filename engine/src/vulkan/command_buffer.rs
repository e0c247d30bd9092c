use std::sync::Arc;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::device::VulkanDevice;
use crate::error::RenderError;

/// A command pool bound to one queue family.
#[derive(Debug)]
pub struct CommandPool {
    device: Arc<VulkanDevice>,
    pub pool: vk::CommandPool,
}

impl CommandPool {
    pub unsafe fn new(
        device: Arc<VulkanDevice>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family);

        let pool = device
            .vk_device
            .create_command_pool(&info, None)
            .map_err(RenderError::gpu("create_command_pool"))?;
        debug!("Created command pool for queue family {}.", queue_family);

        Ok(Self { device, pool })
    }

    pub unsafe fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        Ok(self
            .device
            .vk_device
            .allocate_command_buffers(&info)
            .map_err(RenderError::gpu("allocate_command_buffers"))?)
    }

    /// Records `record` into a throwaway command buffer, submits it to `queue`
    /// and blocks until the queue is idle.
    pub unsafe fn one_shot<F>(&self, queue: vk::Queue, record: F) -> Result<()>
    where
        F: FnOnce(&VulkanDevice, vk::CommandBuffer) -> Result<()>,
    {
        let command_buffer = self.allocate(1)?[0];
        let result = self.submit_one_shot(queue, command_buffer, record);
        self.device
            .vk_device
            .free_command_buffers(self.pool, &[command_buffer]);
        result
    }

    unsafe fn submit_one_shot<F>(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        record: F,
    ) -> Result<()>
    where
        F: FnOnce(&VulkanDevice, vk::CommandBuffer) -> Result<()>,
    {
        let vk_device = &self.device.vk_device;

        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        vk_device.begin_command_buffer(command_buffer, &info)?;
        record(&self.device, command_buffer)?;
        vk_device.end_command_buffer(command_buffer)?;

        let command_buffers = &[command_buffer];
        let info = vk::SubmitInfo::builder().command_buffers(command_buffers);
        vk_device
            .queue_submit(queue, &[info], vk::Fence::null())
            .map_err(RenderError::gpu("queue_submit"))?;
        vk_device
            .queue_wait_idle(queue)
            .map_err(RenderError::gpu("queue_wait_idle"))?;

        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.vk_device.destroy_command_pool(self.pool, None);
        }
        debug!("Destroyed command pool.");
    }
}

/// One step of a frame's command buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RenderCommand {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    },
    BindPipeline(vk::Pipeline),
    SetViewport(vk::Extent2D),
    SetScissor(vk::Extent2D),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    BindDescriptorSet {
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    EndRenderPass,
}

/// Everything a frame draws with.
#[derive(Copy, Clone, Debug)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub descriptor_set: vk::DescriptorSet,
}

/// The command list for one frame: a single pass with a single indexed draw
/// over the whole index buffer.
pub fn frame_commands(target: &DrawTarget) -> Vec<RenderCommand> {
    vec![
        RenderCommand::BeginRenderPass {
            render_pass: target.render_pass,
            framebuffer: target.framebuffer,
            extent: target.extent,
            clear_color: target.clear_color,
        },
        RenderCommand::BindPipeline(target.pipeline),
        RenderCommand::SetViewport(target.extent),
        RenderCommand::SetScissor(target.extent),
        RenderCommand::BindVertexBuffer(target.vertex_buffer),
        RenderCommand::BindIndexBuffer(target.index_buffer),
        RenderCommand::BindDescriptorSet {
            layout: target.pipeline_layout,
            set: target.descriptor_set,
        },
        RenderCommand::DrawIndexed {
            index_count: target.index_count,
            instance_count: 1,
        },
        RenderCommand::EndRenderPass,
    ]
}

/// Resets `command_buffer` and records `commands` into it.
pub unsafe fn record(
    device: &VulkanDevice,
    command_buffer: vk::CommandBuffer,
    commands: &[RenderCommand],
) -> Result<()> {
    let vk_device = &device.vk_device;

    vk_device
        .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        .map_err(RenderError::gpu("reset_command_buffer"))?;
    let info = vk::CommandBufferBeginInfo::builder();
    vk_device
        .begin_command_buffer(command_buffer, &info)
        .map_err(RenderError::gpu("begin_command_buffer"))?;

    for command in commands {
        execute(device, command_buffer, command);
    }

    vk_device
        .end_command_buffer(command_buffer)
        .map_err(RenderError::gpu("end_command_buffer"))?;
    Ok(())
}

unsafe fn execute(device: &VulkanDevice, command_buffer: vk::CommandBuffer, command: &RenderCommand) {
    let vk_device = &device.vk_device;

    match *command {
        RenderCommand::BeginRenderPass {
            render_pass,
            framebuffer,
            extent,
            clear_color,
        } => {
            let render_area = vk::Rect2D::builder()
                .offset(vk::Offset2D::default())
                .extent(extent);

            let color_clear_value = vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            };

            let clear_values = &[color_clear_value];
            let info = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass)
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(clear_values);

            vk_device.cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE);
        }
        RenderCommand::BindPipeline(pipeline) => {
            vk_device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        RenderCommand::SetViewport(extent) => {
            let viewport = vk::Viewport::builder()
                .x(0.0)
                .y(0.0)
                .width(extent.width as f32)
                .height(extent.height as f32)
                .min_depth(0.0)
                .max_depth(1.0);
            vk_device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        }
        RenderCommand::SetScissor(extent) => {
            let scissor = vk::Rect2D::builder()
                .offset(vk::Offset2D { x: 0, y: 0 })
                .extent(extent);
            vk_device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
        RenderCommand::BindVertexBuffer(buffer) => {
            vk_device.cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0]);
        }
        RenderCommand::BindIndexBuffer(buffer) => {
            vk_device.cmd_bind_index_buffer(command_buffer, buffer, 0, vk::IndexType::UINT16);
        }
        RenderCommand::BindDescriptorSet { layout, set } => {
            vk_device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
        RenderCommand::DrawIndexed {
            index_count,
            instance_count,
        } => {
            vk_device.cmd_draw_indexed(command_buffer, index_count, instance_count, 0, 0, 0);
        }
        RenderCommand::EndRenderPass => vk_device.cmd_end_render_pass(command_buffer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::vertex::{quad_vertices, QUAD_INDICES};
    use vulkanalia::vk::Handle;

    fn target(index_count: u32) -> DrawTarget {
        DrawTarget {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffer: vk::Framebuffer::from_raw(2),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pipeline: vk::Pipeline::from_raw(3),
            pipeline_layout: vk::PipelineLayout::from_raw(4),
            vertex_buffer: vk::Buffer::from_raw(5),
            index_buffer: vk::Buffer::from_raw(6),
            index_count,
            descriptor_set: vk::DescriptorSet::from_raw(7),
        }
    }

    #[test]
    fn quad_frame_issues_exactly_one_indexed_draw() {
        assert_eq!(quad_vertices().len(), 4);
        let commands = frame_commands(&target(QUAD_INDICES.len() as u32));

        let draws = commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawIndexed { .. }))
            .collect::<Vec<_>>();
        assert_eq!(
            draws,
            vec![&RenderCommand::DrawIndexed {
                index_count: 6,
                instance_count: 1
            }]
        );
    }

    #[test]
    fn draw_happens_inside_the_pass_after_all_bindings() {
        let commands = frame_commands(&target(6));

        assert!(matches!(
            commands.first(),
            Some(RenderCommand::BeginRenderPass { .. })
        ));
        assert_eq!(commands.last(), Some(&RenderCommand::EndRenderPass));

        let draw = commands
            .iter()
            .position(|c| matches!(c, RenderCommand::DrawIndexed { .. }))
            .unwrap();
        for binding in [
            RenderCommand::BindPipeline(vk::Pipeline::from_raw(3)),
            RenderCommand::BindVertexBuffer(vk::Buffer::from_raw(5)),
            RenderCommand::BindIndexBuffer(vk::Buffer::from_raw(6)),
        ] {
            let position = commands.iter().position(|c| *c == binding).unwrap();
            assert!(position < draw);
        }
    }

    #[test]
    fn dynamic_state_follows_the_current_extent() {
        let mut target = target(6);
        target.extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let commands = frame_commands(&target);

        assert!(commands.contains(&RenderCommand::SetViewport(target.extent)));
        assert!(commands.contains(&RenderCommand::SetScissor(target.extent)));
    }
}
