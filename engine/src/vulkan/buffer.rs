use std::ptr::copy_nonoverlapping as memcpy;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::device::VulkanDevice;
use crate::error::RenderError;

/// A buffer with its own dedicated allocation.
#[derive(Debug)]
pub struct VulkanBuffer {
    device: Arc<VulkanDevice>,
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    mapped: *mut u8,
}

impl VulkanBuffer {
    pub unsafe fn create(
        device: Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let mut buffer = VulkanBuffer {
            buffer: device
                .vk_device
                .create_buffer(&info, None)
                .map_err(RenderError::gpu("create_buffer"))?,
            memory: vk::DeviceMemory::null(),
            size,
            mapped: std::ptr::null_mut(),
            device,
        };

        let requirements = buffer
            .device
            .vk_device
            .get_buffer_memory_requirements(buffer.buffer);
        let memory_type = buffer
            .device
            .find_memory_type(requirements.memory_type_bits, properties)?;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        buffer.memory = buffer
            .device
            .vk_device
            .allocate_memory(&info, None)
            .map_err(RenderError::gpu("allocate_memory"))?;
        buffer
            .device
            .vk_device
            .bind_buffer_memory(buffer.buffer, buffer.memory, 0)?;

        trace!("Created {} byte buffer ({:?}).", size, usage);
        Ok(buffer)
    }

    /// Host-visible and coherent buffer holding a copy of `bytes`.
    pub unsafe fn staging(device: Arc<VulkanDevice>, bytes: &[u8]) -> Result<Self> {
        let buffer = Self::create(
            device,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let memory = buffer.device.vk_device.map_memory(
            buffer.memory,
            0,
            buffer.size,
            vk::MemoryMapFlags::empty(),
        )?;
        memcpy(bytes.as_ptr(), memory.cast(), bytes.len());
        buffer.device.vk_device.unmap_memory(buffer.memory);

        Ok(buffer)
    }

    /// Maps the whole buffer for the rest of its lifetime.
    pub unsafe fn map_persistent(&mut self) -> Result<()> {
        if self.mapped.is_null() {
            let memory = self.device.vk_device.map_memory(
                self.memory,
                0,
                self.size,
                vk::MemoryMapFlags::empty(),
            )?;
            self.mapped = memory.cast();
        }
        Ok(())
    }

    /// Copies `bytes` to the start of a persistently mapped buffer.
    pub unsafe fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.mapped.is_null() {
            return Err(anyhow!("Buffer is not mapped."));
        }
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(anyhow!(
                "Write of {} bytes overflows {} byte buffer.",
                bytes.len(),
                self.size
            ));
        }
        memcpy(bytes.as_ptr(), self.mapped, bytes.len());
        Ok(())
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.device.vk_device.unmap_memory(self.memory);
            }
            self.device.vk_device.destroy_buffer(self.buffer, None);
            self.device.vk_device.free_memory(self.memory, None);
        }
        trace!("Destroyed buffer.");
    }
}
