//! Staged host-to-device uploads.
//!
//! Every upload copies the source bytes into a host-visible staging buffer,
//! records the copy into a one-shot command buffer on the transfer queue,
//! waits for that queue to go idle and then frees the staging buffer. When the
//! transfer family is not the graphics family, the destination is handed over
//! with a release barrier on the transfer queue and a matching acquire barrier
//! on the graphics queue.

use std::sync::Arc;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::buffer::VulkanBuffer;
use super::command_buffer::CommandPool;
use super::constants;
use super::device::{QueueFamilyIndices, VulkanDevice};
use super::image::{color_subresource_range, LayoutTransition, VulkanImage};
use super::texture::TextureData;

/// Queue families on either side of an ownership transfer, or `None` when
/// the upload stays on the graphics family.
pub fn ownership_transfer(indices: &QueueFamilyIndices) -> Option<(u32, u32)> {
    (indices.transfer != indices.graphics).then_some((indices.transfer, indices.graphics))
}

/// How the graphics queue first reads a buffer with the given usage.
pub fn buffer_consumer(usage: vk::BufferUsageFlags) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    let mut access = vk::AccessFlags::empty();
    if usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        access |= vk::AccessFlags::INDEX_READ;
    }
    (access, vk::PipelineStageFlags::VERTEX_INPUT)
}

pub struct Uploader {
    device: Arc<VulkanDevice>,
    transfer_pool: CommandPool,
    /// Only present when ownership has to be acquired on the graphics family.
    graphics_pool: Option<CommandPool>,
}

impl Uploader {
    pub unsafe fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let indices = device.queue_families;
        let transfer_pool = CommandPool::new(
            device.clone(),
            indices.transfer,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let graphics_pool = match ownership_transfer(&indices) {
            Some((_, graphics)) => {
                info!(
                    "Uploading on queue family {} with ownership transfer to {}.",
                    indices.transfer, graphics
                );
                Some(CommandPool::new(
                    device.clone(),
                    graphics,
                    vk::CommandPoolCreateFlags::TRANSIENT,
                )?)
            }
            None => None,
        };

        Ok(Self {
            device,
            transfer_pool,
            graphics_pool,
        })
    }

    /// Device-local buffer with `usage` holding a copy of `bytes`.
    pub unsafe fn upload_buffer(
        &self,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<VulkanBuffer> {
        let staging = VulkanBuffer::staging(self.device.clone(), bytes)?;
        let buffer = VulkanBuffer::create(
            self.device.clone(),
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let handoff = ownership_transfer(&self.device.queue_families);
        let (dst_access, dst_stage) = buffer_consumer(usage);

        self.transfer_pool
            .one_shot(self.device.transfer_queue, |device, command_buffer| {
                let regions = vk::BufferCopy::builder().size(staging.size);
                device.vk_device.cmd_copy_buffer(
                    command_buffer,
                    staging.buffer,
                    buffer.buffer,
                    &[regions],
                );

                if let Some((src_family, dst_family)) = handoff {
                    let barrier = buffer_barrier(&buffer, src_family, dst_family)
                        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .dst_access_mask(vk::AccessFlags::empty());
                    device.vk_device.cmd_pipeline_barrier(
                        command_buffer,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                        vk::DependencyFlags::empty(),
                        &[] as &[vk::MemoryBarrier],
                        &[barrier],
                        &[] as &[vk::ImageMemoryBarrier],
                    );
                }
                Ok(())
            })?;

        if let (Some((src_family, dst_family)), Some(pool)) = (handoff, &self.graphics_pool) {
            pool.one_shot(self.device.graphics_queue, |device, command_buffer| {
                let barrier = buffer_barrier(&buffer, src_family, dst_family)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(dst_access);
                device.vk_device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[] as &[vk::MemoryBarrier],
                    &[barrier],
                    &[] as &[vk::ImageMemoryBarrier],
                );
                Ok(())
            })?;
        }

        debug!("Uploaded {} bytes ({:?}).", bytes.len(), usage);
        Ok(buffer)
    }

    /// Device-local sampled image holding `data`, left in
    /// SHADER_READ_ONLY_OPTIMAL.
    pub unsafe fn upload_texture(&self, data: &TextureData) -> Result<VulkanImage> {
        let staging = VulkanBuffer::staging(self.device.clone(), &data.pixels)?;
        let image = VulkanImage::create(
            self.device.clone(),
            data.extent(),
            constants::TEXTURE_FORMAT,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let to_transfer = LayoutTransition::between(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        let to_shader = LayoutTransition::between(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        let handoff = ownership_transfer(&self.device.queue_families);

        self.transfer_pool
            .one_shot(self.device.transfer_queue, |device, command_buffer| {
                transition_image(
                    device,
                    command_buffer,
                    image.image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    to_transfer,
                    None,
                );

                let subresource = vk::ImageSubresourceLayers::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1);

                let region = vk::BufferImageCopy::builder()
                    .buffer_offset(0)
                    .buffer_row_length(0)
                    .buffer_image_height(0)
                    .image_subresource(subresource)
                    .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                    .image_extent(vk::Extent3D {
                        width: data.width,
                        height: data.height,
                        depth: 1,
                    });

                device.vk_device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );

                let masks = if handoff.is_some() {
                    to_shader.release()
                } else {
                    to_shader
                };
                transition_image(
                    device,
                    command_buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    masks,
                    handoff,
                );
                Ok(())
            })?;

        if let (Some(families), Some(pool)) = (handoff, &self.graphics_pool) {
            pool.one_shot(self.device.graphics_queue, |device, command_buffer| {
                transition_image(
                    device,
                    command_buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    to_shader.acquire(),
                    Some(families),
                );
                Ok(())
            })?;
        }

        debug!(
            "Uploaded {}x{} texture ({} bytes).",
            data.width,
            data.height,
            data.pixels.len()
        );
        Ok(image)
    }
}

fn buffer_barrier(
    buffer: &VulkanBuffer,
    src_family: u32,
    dst_family: u32,
) -> vk::BufferMemoryBarrierBuilder<'static> {
    vk::BufferMemoryBarrier::builder()
        .src_queue_family_index(src_family)
        .dst_queue_family_index(dst_family)
        .buffer(buffer.buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE as vk::DeviceSize)
}

unsafe fn transition_image(
    device: &VulkanDevice,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    masks: LayoutTransition,
    families: Option<(u32, u32)>,
) {
    let (src_family, dst_family) =
        families.unwrap_or((vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED));

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(src_family)
        .dst_queue_family_index(dst_family)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(masks.src_access_mask)
        .dst_access_mask(masks.dst_access_mask);

    device.vk_device.cmd_pipeline_barrier(
        command_buffer,
        masks.src_stage_mask,
        masks.dst_stage_mask,
        vk::DependencyFlags::empty(),
        &[] as &[vk::MemoryBarrier],
        &[] as &[vk::BufferMemoryBarrier],
        &[barrier],
    );
}
