use std::sync::Arc;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::buffer::VulkanBuffer;
use super::device::VulkanDevice;
use super::texture::Texture;
use crate::error::RenderError;

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

/// Uniform buffer for the vertex stage, combined image sampler for the
/// fragment stage.
pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(UNIFORM_BINDING)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .build();

    let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(SAMPLER_BINDING)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)
        .build();

    [ubo_binding, sampler_binding]
}

/// Enough descriptors of each kind for `sets` sets of [`layout_bindings`].
pub fn pool_sizes(sets: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize::builder()
            .type_(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(sets)
            .build(),
        vk::DescriptorPoolSize::builder()
            .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(sets)
            .build(),
    ]
}

#[derive(Debug)]
pub struct DescriptorSetLayout {
    device: Arc<VulkanDevice>,
    pub layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub unsafe fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let bindings = layout_bindings();
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = device
            .vk_device
            .create_descriptor_set_layout(&info, None)
            .map_err(RenderError::pipeline("descriptor set layout"))?;

        Ok(Self { device, layout })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .vk_device
                .destroy_descriptor_set_layout(self.layout, None);
        }
        trace!("Destroyed descriptor set layout.");
    }
}

/// Pool for the per-frame descriptor sets. Sets are freed with the pool.
#[derive(Debug)]
pub struct DescriptorPool {
    device: Arc<VulkanDevice>,
    pub pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub unsafe fn new(device: Arc<VulkanDevice>, sets: u32) -> Result<Self> {
        let pool_sizes = pool_sizes(sets);
        let info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(sets);

        let pool = device
            .vk_device
            .create_descriptor_pool(&info, None)
            .map_err(RenderError::gpu("create_descriptor_pool"))?;

        Ok(Self { device, pool })
    }

    pub unsafe fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> Result<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.layout; count];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        Ok(self
            .device
            .vk_device
            .allocate_descriptor_sets(&info)
            .map_err(RenderError::gpu("allocate_descriptor_sets"))?)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .vk_device
                .destroy_descriptor_pool(self.pool, None);
        }
        trace!("Destroyed descriptor pool.");
    }
}

/// Points `set` at a frame's uniform buffer and the shared texture. Written
/// once; neither resource is replaced afterwards.
pub unsafe fn write_frame_set(
    device: &VulkanDevice,
    set: vk::DescriptorSet,
    uniform: &VulkanBuffer,
    texture: &Texture,
) {
    let info = vk::DescriptorBufferInfo::builder()
        .buffer(uniform.buffer)
        .offset(0)
        .range(uniform.size);

    let buffer_info = &[info];
    let ubo_write = vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(UNIFORM_BINDING)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(buffer_info);

    let info = vk::DescriptorImageInfo::builder()
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .image_view(texture.image.view)
        .sampler(texture.sampler);

    let image_info = &[info];
    let sampler_write = vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(SAMPLER_BINDING)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(image_info);

    device.vk_device.update_descriptor_sets(
        &[ubo_write, sampler_write],
        &[] as &[vk::CopyDescriptorSet],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_is_vertex_only_and_sampler_is_fragment_only() {
        let [ubo, sampler] = layout_bindings();

        assert_eq!(ubo.binding, 0);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);

        assert_eq!(sampler.binding, 1);
        assert_eq!(
            sampler.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn pool_covers_every_frame_set() {
        let sizes = pool_sizes(3);
        for binding in layout_bindings() {
            let size = sizes
                .iter()
                .find(|s| s.type_ == binding.descriptor_type)
                .unwrap();
            assert_eq!(size.descriptor_count, 3 * binding.descriptor_count);
        }
    }
}
