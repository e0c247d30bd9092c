use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::device::VulkanDevice;

/// A device-local 2D image with its memory and a color view.
#[derive(Debug)]
pub struct VulkanImage {
    device: Arc<VulkanDevice>,
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl VulkanImage {
    pub unsafe fn create(
        device: Arc<VulkanDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::_1);

        let mut image = VulkanImage {
            image: device.vk_device.create_image(&info, None)?,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            device,
        };

        let requirements = image
            .device
            .vk_device
            .get_image_memory_requirements(image.image);
        let memory_type = image
            .device
            .find_memory_type(requirements.memory_type_bits, properties)?;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        image.memory = image.device.vk_device.allocate_memory(&info, None)?;
        image
            .device
            .vk_device
            .bind_image_memory(image.image, image.memory, 0)?;
        image.view = create_image_view(&image.device, image.image, format)?;

        Ok(image)
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        unsafe {
            self.device.vk_device.destroy_image_view(self.view, None);
            self.device.vk_device.destroy_image(self.image, None);
            self.device.vk_device.free_memory(self.memory, None);
        }
        trace!("Destroyed image.");
    }
}

pub unsafe fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::_2D)
        .format(format)
        .subresource_range(color_subresource_range());

    Ok(device.vk_device.create_image_view(&info, None)?)
}

pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::builder()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
        .build()
}

/// Access and stage masks that bracket a layout transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Masks for the two transitions a texture upload goes through. Anything
    /// else is refused rather than guessed.
    pub fn between(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Result<Self> {
        match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(Self {
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                src_stage_mask: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage_mask: vk::PipelineStageFlags::TRANSFER,
            }),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
                Ok(Self {
                    src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                    dst_access_mask: vk::AccessFlags::SHADER_READ,
                    src_stage_mask: vk::PipelineStageFlags::TRANSFER,
                    dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                })
            }
            _ => Err(anyhow!(
                "Unsupported layout transition {:?} -> {:?}.",
                old_layout,
                new_layout
            )),
        }
    }

    /// Half of a queue family ownership transfer executed on the releasing
    /// queue: it flushes the source writes, the acquiring half makes them visible.
    pub fn release(self) -> Self {
        Self {
            dst_access_mask: vk::AccessFlags::empty(),
            dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            ..self
        }
    }

    pub fn acquire(self) -> Self {
        Self {
            src_access_mask: vk::AccessFlags::empty(),
            src_stage_mask: vk::PipelineStageFlags::TOP_OF_PIPE,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_masks() {
        let to_transfer = LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_transfer.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(to_transfer.dst_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage_mask, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_transfer.dst_stage_mask, vk::PipelineStageFlags::TRANSFER);

        let to_shader = LayoutTransition::between(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_shader.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_shader.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_shader.src_stage_mask, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_shader.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn unknown_transitions_are_refused() {
        assert!(LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .is_err());
        assert!(LayoutTransition::between(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .is_err());
    }

    #[test]
    fn ownership_halves_split_the_masks() {
        let full = LayoutTransition::between(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

        let release = full.release();
        assert_eq!(release.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(release.src_stage_mask, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(release.dst_access_mask, vk::AccessFlags::empty());
        assert_eq!(release.dst_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);

        let acquire = full.acquire();
        assert_eq!(acquire.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(acquire.src_stage_mask, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(acquire.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(acquire.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }
}
