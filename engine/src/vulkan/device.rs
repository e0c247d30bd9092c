use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::*;
use thiserror::Error;
use vulkanalia::{
    vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0, KhrSurfaceExtension},
    Device,
};

use super::{constants, instance::VulkanInstance, memory, swapchain::SwapchainSupport};
use crate::config::RendererConfig;
use crate::error::RenderError;

/// Layer and extension names the device must provide. Passed in rather than
/// read from globals so tests can describe a device with no requirements.
#[derive(Clone, Debug, Default)]
pub struct DeviceRequirements {
    pub validation_layer: Option<vk::ExtensionName>,
    pub extensions: Vec<vk::ExtensionName>,
}

impl DeviceRequirements {
    pub fn from_config(config: &RendererConfig) -> Self {
        let validation_layer = config
            .validation
            .then(|| vk::ExtensionName::from_bytes(config.validation_layer.as_bytes()));

        Self {
            validation_layer,
            extensions: constants::DEVICE_EXTENSIONS.to_vec(),
        }
    }
}

#[derive(Debug, Error)]
#[error("Missing {0}.")]
pub struct SuitabilityError(pub &'static str);

/// The logical device together with the physical device it was created from
/// and its queues. Every GPU resource keeps an `Arc` to it, so it outlives them;
/// it in turn keeps the instance alive.
#[derive(Debug)]
pub struct VulkanDevice {
    pub vk_device: Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub transfer_queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub instance: Arc<VulkanInstance>,
}

impl VulkanDevice {
    unsafe fn pick_physical_device(
        instance: &VulkanInstance,
        requirements: &DeviceRequirements,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        for physical_device in instance.vk_instance.enumerate_physical_devices()? {
            let properties = instance
                .vk_instance
                .get_physical_device_properties(physical_device);

            let checked = DeviceSupport::get(instance, physical_device)
                .and_then(|support| support.check(requirements));

            match checked {
                Err(error) => warn!(
                    "Skipping physical device (`{}`): {}",
                    properties.device_name, error
                ),
                Ok(indices) => {
                    info!("Selected physical device (`{}`).", properties.device_name);
                    return Ok((physical_device, indices));
                }
            }
        }

        Err(anyhow!(RenderError::NoCapableDevice))
    }

    pub unsafe fn new(
        instance: Arc<VulkanInstance>,
        requirements: &DeviceRequirements,
    ) -> Result<Arc<VulkanDevice>> {
        let (physical_device, indices) = VulkanDevice::pick_physical_device(&instance, requirements)?;
        debug!("Using queue families {:?}.", indices);

        let queue_priorities = &[1.0];
        let queue_infos = indices
            .unique()
            .into_iter()
            .map(|i| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(i)
                    .queue_priorities(queue_priorities)
            })
            .collect::<Vec<_>>();

        let layers = match &requirements.validation_layer {
            Some(layer) => vec![layer.as_ptr()],
            None => vec![],
        };

        let mut extensions = requirements
            .extensions
            .iter()
            .map(|n| n.as_ptr())
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        if cfg!(target_os = "macos")
            && instance.entry.version()? >= constants::PORTABILITY_MACOS_VERSION
        {
            extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder();

        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = instance
            .vk_instance
            .create_device(physical_device, &info, None)?;

        let memory_properties = instance
            .vk_instance
            .get_physical_device_memory_properties(physical_device);

        Ok(Arc::new(VulkanDevice {
            graphics_queue: device.get_device_queue(indices.graphics, 0),
            present_queue: device.get_device_queue(indices.present, 0),
            transfer_queue: device.get_device_queue(indices.transfer, 0),
            vk_device: device,
            physical_device,
            queue_families: indices,
            memory_properties,
            instance,
        }))
    }

    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        memory::find_memory_type(&self.memory_properties, type_bits, properties)
    }

    /// Fresh surface capability snapshot for this device.
    pub unsafe fn swapchain_support(&self) -> Result<SwapchainSupport> {
        SwapchainSupport::get(&self.instance, self.physical_device)
    }

    pub unsafe fn wait_idle(&self) -> Result<()> {
        self.vk_device
            .device_wait_idle()
            .map_err(RenderError::gpu("device_wait_idle"))?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.vk_device.destroy_device(None);
        }
        debug!("Destroyed logical device.");
    }
}

/// What a physical device offers, gathered before any decision is made.
#[derive(Clone, Debug, Default)]
pub struct DeviceSupport {
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Whether queue family `i` can present to the window surface.
    pub present_support: Vec<bool>,
    pub extensions: HashSet<vk::ExtensionName>,
    pub format_count: usize,
    pub present_mode_count: usize,
}

impl DeviceSupport {
    unsafe fn get(instance: &VulkanInstance, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let queue_families = instance
            .vk_instance
            .get_physical_device_queue_family_properties(physical_device);

        let present_support = (0..queue_families.len() as u32)
            .map(|index| {
                instance.vk_instance.get_physical_device_surface_support_khr(
                    physical_device,
                    index,
                    instance.surface,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let extensions = instance
            .vk_instance
            .enumerate_device_extension_properties(physical_device, None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        let swapchain = SwapchainSupport::get(instance, physical_device)?;

        Ok(Self {
            queue_families,
            present_support,
            extensions,
            format_count: swapchain.formats.len(),
            present_mode_count: swapchain.present_modes.len(),
        })
    }

    /// Accepts the device only if it has graphics and present queue families,
    /// every required extension, and at least one surface format and present mode.
    pub fn check(&self, requirements: &DeviceRequirements) -> Result<QueueFamilyIndices> {
        let indices = QueueFamilyIndices::select(&self.queue_families, &self.present_support)?;

        if !requirements
            .extensions
            .iter()
            .all(|e| self.extensions.contains(e))
        {
            return Err(anyhow!(SuitabilityError("required device extensions")));
        }

        if self.format_count == 0 || self.present_mode_count == 0 {
            return Err(anyhow!(SuitabilityError("swapchain support")));
        }

        Ok(indices)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Graphics is the first graphics-capable family. Present prefers the
    /// graphics family, then any family that can present. Transfer prefers a
    /// dedicated (non-graphics) transfer family and falls back to graphics.
    pub fn select(
        properties: &[vk::QueueFamilyProperties],
        present_support: &[bool],
    ) -> Result<Self> {
        let graphics = properties
            .iter()
            .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);

        let supports_present = |i: u32| present_support.get(i as usize).copied().unwrap_or(false);
        let present = graphics
            .filter(|g| supports_present(*g))
            .or_else(|| (0..properties.len() as u32).find(|i| supports_present(*i)));

        if let (Some(graphics), Some(present)) = (graphics, present) {
            let transfer = properties
                .iter()
                .position(|p| {
                    p.queue_flags.contains(vk::QueueFlags::TRANSFER)
                        && !p.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                })
                .map(|i| i as u32)
                .unwrap_or(graphics);

            Ok(Self {
                graphics,
                present,
                transfer,
            })
        } else {
            Err(anyhow!(SuitabilityError("required queue families")))
        }
    }

    /// Distinct family indices, one queue is created for each.
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present, self.transfer]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
