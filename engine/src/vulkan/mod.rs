use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSwapchainExtension};
use winit::window::Window;

use crate::config::RendererConfig;
use crate::error::RenderError;
use buffer::VulkanBuffer;
use command_buffer::{frame_commands, DrawTarget};
use descriptor::{DescriptorPool, DescriptorSetLayout};
use device::{DeviceRequirements, VulkanDevice};
use frame::{classify_acquire, classify_present, Acquired, ChainState, FrameCounter, FrameSlots};
use framebuffer::VulkanFramebuffers;
use instance::VulkanInstance;
use pipeline::{ShaderSet, VulkanPipeline};
use render_pass::VulkanRenderPass;
use swapchain::VulkanSwapchain;
use texture::{Texture, TextureData};
use uniform::{UniformBufferObject, UniformBuffers};
use upload::Uploader;
use vertex::{as_bytes, quad_vertices, QUAD_INDICES};

mod buffer;
mod command_buffer;
pub(crate) mod constants;
mod descriptor;
mod device;
mod frame;
mod framebuffer;
mod image;
mod instance;
mod memory;
mod pipeline;
mod render_pass;
mod swapchain;
mod sync;
mod texture;
mod uniform;
mod upload;
mod vertex;

/// Drives frames for a single window.
///
/// Fields are dropped top to bottom, which is the teardown order: frame
/// sync objects and their command pool, pipeline and render pass, the
/// presentation chain, descriptors and resources, and finally the device.
#[derive(Debug)]
pub struct VulkanRenderer {
    frames: FrameSlots,
    pipeline: VulkanPipeline,
    render_pass: VulkanRenderPass,
    framebuffers: VulkanFramebuffers,
    swapchain: VulkanSwapchain,
    descriptor_pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
    uniforms: UniformBuffers,
    vertex_buffer: VulkanBuffer,
    index_buffer: VulkanBuffer,
    texture: Texture,
    device: Arc<VulkanDevice>,

    descriptor_sets: Vec<vk::DescriptorSet>,
    /// Fence of the slot that last rendered to each swapchain image.
    images_in_flight: Vec<vk::Fence>,
    counter: FrameCounter,
    chain: ChainState,
    shaders: ShaderSet,
    index_count: u32,
    clear_color: [f32; 4],
    start: Instant,
}

impl VulkanRenderer {
    pub unsafe fn new(window: &Window, config: &RendererConfig) -> Result<VulkanRenderer> {
        let requirements = DeviceRequirements::from_config(config);
        let instance = Arc::new(VulkanInstance::new(window, &requirements)?);
        let device = VulkanDevice::new(instance, &requirements)?;

        let shaders = ShaderSet::load(&config.vertex_shader, &config.fragment_shader)?;
        let texture_data = TextureData::load(&config.texture)?;

        // Presentation chain and render configuration
        let swapchain = VulkanSwapchain::new(device.clone(), window_extent(window))?;
        let render_pass = VulkanRenderPass::new(device.clone(), swapchain.format)?;
        let set_layout = DescriptorSetLayout::new(device.clone())?;
        let pipeline = VulkanPipeline::new(device.clone(), &render_pass, &set_layout, &shaders)?;
        let framebuffers = VulkanFramebuffers::new(device.clone(), &render_pass, &swapchain)?;

        // Static resources
        let uploader = Uploader::new(device.clone())?;
        let vertex_buffer = uploader
            .upload_buffer(as_bytes(&quad_vertices()), vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer =
            uploader.upload_buffer(as_bytes(&QUAD_INDICES), vk::BufferUsageFlags::INDEX_BUFFER)?;
        let texture = Texture::new(device.clone(), uploader.upload_texture(&texture_data)?)?;
        drop(uploader);

        // Per-frame state
        let slots = config.frames_in_flight;
        let uniforms = UniformBuffers::new(device.clone(), slots)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), slots as u32)?;
        let descriptor_sets = descriptor_pool.allocate(&set_layout, slots)?;
        for (set, uniform) in descriptor_sets.iter().zip(&uniforms.buffers) {
            descriptor::write_frame_set(&device, *set, uniform, &texture);
        }
        let frames = FrameSlots::new(device.clone(), slots)?;

        info!("Renderer ready with {} frames in flight.", slots);

        Ok(VulkanRenderer {
            images_in_flight: vec![vk::Fence::null(); swapchain.images.len()],
            frames,
            pipeline,
            render_pass,
            framebuffers,
            swapchain,
            descriptor_pool,
            set_layout,
            uniforms,
            vertex_buffer,
            index_buffer,
            texture,
            device,
            descriptor_sets,
            counter: FrameCounter::new(slots),
            chain: ChainState::default(),
            shaders,
            index_count: QUAD_INDICES.len() as u32,
            clear_color: config.clear_color,
            start: Instant::now(),
        })
    }

    /// Renders one frame. `resized` reports a window resize since the last
    /// call; `window_size` is the current framebuffer size, non-zero.
    pub unsafe fn render(&mut self, window_size: vk::Extent2D, resized: bool) -> Result<()> {
        if self.chain.is_stale() {
            self.recreate_swapchain(window_size)?;
        }

        let frame = self.counter.index();
        let (image_available, render_finished, in_flight, command_buffer) = {
            let slot = &self.frames.slots[frame];
            slot.in_flight.wait()?;
            (
                slot.image_available.semaphore,
                slot.render_finished.semaphore,
                slot.in_flight.fence,
                slot.command_buffer,
            )
        };

        let result = self.device.vk_device.acquire_next_image_khr(
            self.swapchain.swapchain,
            u64::MAX,
            image_available,
            vk::Fence::null(),
        );
        let image_index = match classify_acquire(result)? {
            Acquired::Image(index) => index as usize,
            Acquired::Stale => {
                debug!("Swapchain out of date on acquire.");
                return self.recreate_swapchain(window_size);
            }
        };

        let image_fence = self.images_in_flight[image_index];
        if !image_fence.is_null() {
            sync::wait_for_fence(&self.device, image_fence)?;
        }
        self.images_in_flight[image_index] = in_flight;

        // Only once this frame is certain to be submitted.
        self.frames.slots[frame].in_flight.reset()?;

        let ubo = UniformBufferObject::at(self.start.elapsed().as_secs_f32(), self.swapchain.extent);
        self.uniforms.write(frame, &ubo)?;

        let target = DrawTarget {
            render_pass: self.render_pass.render_pass,
            framebuffer: self.framebuffers.framebuffers[image_index],
            extent: self.swapchain.extent,
            clear_color: self.clear_color,
            pipeline: self.pipeline.pipeline,
            pipeline_layout: self.pipeline.layout,
            vertex_buffer: self.vertex_buffer.buffer,
            index_buffer: self.index_buffer.buffer,
            index_count: self.index_count,
            descriptor_set: self.descriptor_sets[frame],
        };
        command_buffer::record(&self.device, command_buffer, &frame_commands(&target))?;

        let wait_semaphores = &[image_available];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[command_buffer];
        let signal_semaphores = &[render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        self.device
            .vk_device
            .queue_submit(self.device.graphics_queue, &[submit_info], in_flight)
            .map_err(RenderError::gpu("queue_submit"))?;

        let swapchains = &[self.swapchain.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(signal_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = self
            .device
            .vk_device
            .queue_present_khr(self.device.present_queue, &present_info);
        if classify_present(result, resized)? {
            self.recreate_swapchain(window_size)?;
        }

        self.counter.advance();

        Ok(())
    }

    /// Rebuilds the presentation chain for `window_size`, deferring while
    /// the window has no area.
    unsafe fn recreate_swapchain(&mut self, window_size: vk::Extent2D) -> Result<()> {
        if !self.chain.begin_rebuild(window_size) {
            debug!("Window has no area, deferring swapchain rebuild.");
            return Ok(());
        }

        self.device.wait_idle()?;

        self.framebuffers.release();
        self.swapchain.recreate(window_size)?;

        if self.swapchain.format != self.render_pass.format {
            info!(
                "Surface format changed from {:?} to {:?}, rebuilding pipeline.",
                self.render_pass.format, self.swapchain.format
            );
            let render_pass = VulkanRenderPass::new(self.device.clone(), self.swapchain.format)?;
            self.pipeline = VulkanPipeline::new(
                self.device.clone(),
                &render_pass,
                &self.set_layout,
                &self.shaders,
            )?;
            self.render_pass = render_pass;
        }

        self.framebuffers
            .rebuild(&self.render_pass, &self.swapchain)?;
        self.images_in_flight = vec![vk::Fence::null(); self.swapchain.images.len()];
        self.chain.rebuilt();

        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(error) = unsafe { self.device.wait_idle() } {
            error!("Failed to wait for device idle before teardown: {}", error);
        }
        debug!("Destroying renderer.");
    }
}

pub fn window_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
