use std::sync::Arc;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::device::VulkanDevice;
use crate::error::RenderError;

/// GPU-to-GPU signal between queue operations.
#[derive(Debug)]
pub struct Semaphore {
    device: Arc<VulkanDevice>,
    pub semaphore: vk::Semaphore,
}

impl Semaphore {
    pub unsafe fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo::builder();
        let semaphore = device
            .vk_device
            .create_semaphore(&info, None)
            .map_err(RenderError::gpu("create_semaphore"))?;
        Ok(Self { device, semaphore })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.vk_device.destroy_semaphore(self.semaphore, None);
        }
        trace!("Destroyed semaphore.");
    }
}

/// GPU-to-host signal. Frame slots create theirs signaled so the first wait
/// returns immediately.
#[derive(Debug)]
pub struct Fence {
    device: Arc<VulkanDevice>,
    pub fence: vk::Fence,
}

impl Fence {
    pub unsafe fn new(device: Arc<VulkanDevice>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = device
            .vk_device
            .create_fence(&info, None)
            .map_err(RenderError::gpu("create_fence"))?;
        Ok(Self { device, fence })
    }

    pub unsafe fn wait(&self) -> Result<()> {
        wait_for_fence(&self.device, self.fence)
    }

    pub unsafe fn reset(&self) -> Result<()> {
        self.device
            .vk_device
            .reset_fences(&[self.fence])
            .map_err(RenderError::gpu("reset_fences"))?;
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.vk_device.destroy_fence(self.fence, None);
        }
        trace!("Destroyed fence.");
    }
}

/// Blocks without timeout on a fence the caller does not own.
pub unsafe fn wait_for_fence(device: &VulkanDevice, fence: vk::Fence) -> Result<()> {
    device
        .vk_device
        .wait_for_fences(&[fence], true, u64::MAX)
        .map_err(RenderError::gpu("wait_for_fences"))?;
    Ok(())
}
