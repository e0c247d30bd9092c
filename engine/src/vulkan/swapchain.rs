use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSurfaceExtension, KhrSwapchainExtension};

use super::constants;
use super::device::{QueueFamilyIndices, VulkanDevice};
use super::image::create_image_view;
use super::instance::VulkanInstance;
use crate::error::RenderError;

/// Surface capability snapshot. Queried again on every (re)creation.
#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let vk_instance = &instance.vk_instance;
        Ok(Self {
            capabilities: vk_instance
                .get_physical_device_surface_capabilities_khr(physical_device, instance.surface)?,
            formats: vk_instance
                .get_physical_device_surface_formats_khr(physical_device, instance.surface)?,
            present_modes: vk_instance
                .get_physical_device_surface_present_modes_khr(physical_device, instance.surface)?,
        })
    }
}

/// sRGB BGRA with a non-linear color space wherever it appears, otherwise the
/// first supported pair.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .cloned()
        .find(|f| {
            f.format == constants::PREFERRED_SURFACE_FORMAT
                && f.color_space == constants::PREFERRED_COLOR_SPACE
        })
        .or_else(|| formats.first().cloned())
}

/// FIFO is always available, so it is the fallback when MAILBOX is not.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .cloned()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A `u32::MAX` current width means the surface takes its size from the
/// swapchain, so the framebuffer size is clamped into the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        let clamp = |min: u32, max: u32, v: u32| min.max(max.min(v));
        vk::Extent2D::builder()
            .width(clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
                framebuffer_size.width,
            ))
            .height(clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
                framebuffer_size.height,
            ))
            .build()
    }
}

/// One more than the minimum; a zero maximum means there is no upper bound.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Images are shared between the graphics and present families when they
/// differ and exclusive to the single family otherwise.
pub fn image_sharing(indices: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if indices.graphics != indices.present {
        (
            vk::SharingMode::CONCURRENT,
            vec![indices.graphics, indices.present],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, vec![])
    }
}

/// The presentation chain: swapchain, its images and one view per image.
#[derive(Debug)]
pub struct VulkanSwapchain {
    device: Arc<VulkanDevice>,
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl VulkanSwapchain {
    pub unsafe fn new(device: Arc<VulkanDevice>, framebuffer_size: vk::Extent2D) -> Result<Self> {
        let mut swapchain = VulkanSwapchain {
            device,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
        };
        swapchain.create(framebuffer_size)?;
        Ok(swapchain)
    }

    /// Tears the chain down and builds it again from a fresh capability
    /// snapshot. The caller must have waited for the device to go idle and
    /// dropped every framebuffer built on the old views.
    pub unsafe fn recreate(&mut self, framebuffer_size: vk::Extent2D) -> Result<()> {
        self.release();
        self.create(framebuffer_size)
    }

    unsafe fn create(&mut self, framebuffer_size: vk::Extent2D) -> Result<()> {
        let support = self.device.swapchain_support()?;

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| anyhow!("Surface reports no supported formats."))?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let image_count = choose_image_count(&support.capabilities);
        let (image_sharing_mode, queue_family_indices) =
            image_sharing(&self.device.queue_families);

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.device.instance.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(image_sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let vk_device = &self.device.vk_device;
        self.swapchain = vk_device
            .create_swapchain_khr(&info, None)
            .map_err(RenderError::gpu("create_swapchain_khr"))?;
        self.images = vk_device.get_swapchain_images_khr(self.swapchain)?;
        self.format = surface_format.format;
        self.extent = extent;

        for image in &self.images {
            let view = create_image_view(&self.device, *image, self.format)?;
            self.image_views.push(view);
        }

        info!(
            "Created swapchain: {:?}/{:?}, {:?}, {}x{}, {} images ({:?}).",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            self.images.len(),
            image_sharing_mode,
        );

        Ok(())
    }

    unsafe fn release(&mut self) {
        for view in self.image_views.drain(..) {
            self.device.vk_device.destroy_image_view(view, None);
        }
        self.images.clear();
        if !self.swapchain.is_null() {
            self.device
                .vk_device
                .destroy_swapchain_khr(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe { self.release() };
        debug!("Destroyed swapchain.");
    }
}
