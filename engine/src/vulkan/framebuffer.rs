use std::sync::Arc;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::device::VulkanDevice;
use super::render_pass::VulkanRenderPass;
use super::swapchain::VulkanSwapchain;
use crate::error::RenderError;

/// One framebuffer per swapchain image view. Released before the chain is
/// rebuilt and built again afterwards.
#[derive(Debug)]
pub struct VulkanFramebuffers {
    device: Arc<VulkanDevice>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl VulkanFramebuffers {
    pub unsafe fn new(
        device: Arc<VulkanDevice>,
        render_pass: &VulkanRenderPass,
        swapchain: &VulkanSwapchain,
    ) -> Result<Self> {
        let mut framebuffers = VulkanFramebuffers {
            device,
            framebuffers: Vec::new(),
        };
        framebuffers.rebuild(render_pass, swapchain)?;
        Ok(framebuffers)
    }

    pub unsafe fn rebuild(
        &mut self,
        render_pass: &VulkanRenderPass,
        swapchain: &VulkanSwapchain,
    ) -> Result<()> {
        self.release();

        for view in &swapchain.image_views {
            let attachments = &[*view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.render_pass)
                .attachments(attachments)
                .width(swapchain.extent.width)
                .height(swapchain.extent.height)
                .layers(1);

            let framebuffer = self
                .device
                .vk_device
                .create_framebuffer(&create_info, None)
                .map_err(RenderError::gpu("create_framebuffer"))?;
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    pub unsafe fn release(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.device
                .vk_device
                .destroy_framebuffer(framebuffer, None);
        }
    }
}

impl Drop for VulkanFramebuffers {
    fn drop(&mut self) {
        unsafe { self.release() };
        trace!("Destroyed framebuffers.");
    }
}
