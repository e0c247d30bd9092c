use std::sync::Arc;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::device::VulkanDevice;
use crate::error::RenderError;

#[derive(Debug)]
pub struct VulkanRenderPass {
    device: Arc<VulkanDevice>,
    pub render_pass: vk::RenderPass,
    pub format: vk::Format,
}

impl VulkanRenderPass {
    pub unsafe fn new(device: Arc<VulkanDevice>, format: vk::Format) -> Result<Self> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments);

        // The clear must not start while presentation still reads the image.
        let dependency = subpass_dependency();

        let attachments = &[color_attachment];
        let subpasses = &[subpass];
        let dependencies = &[dependency];
        let info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        let render_pass = device
            .vk_device
            .create_render_pass(&info, None)
            .map_err(RenderError::pipeline("render pass"))?;
        debug!("Created render pass for {:?}.", format);

        Ok(Self {
            device,
            render_pass,
            format,
        })
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .vk_device
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass.");
    }
}

fn subpass_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build()
}
