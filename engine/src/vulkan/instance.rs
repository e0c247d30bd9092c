use anyhow::{anyhow, Result};
use log::*;
use std::collections::HashSet;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_void;
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;
use vulkanalia::vk::ExtDebugUtilsExtension;
use vulkanalia::vk::KhrSurfaceExtension;
use vulkanalia::window as vk_window;
use vulkanalia::Entry;
use vulkanalia::Instance;
use winit::window::Window;

use super::constants;
use super::device::DeviceRequirements;
use crate::error::RenderError;

/// Owns the loader entry, the instance, the optional debug messenger and the
/// window surface. Dropped after the logical device.
pub struct VulkanInstance {
    pub entry: Entry,
    pub vk_instance: Instance,
    pub surface: vk::SurfaceKHR,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl VulkanInstance {
    pub unsafe fn new(window: &Window, requirements: &DeviceRequirements) -> Result<VulkanInstance> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;

        // Application Info
        let application_info = vk::ApplicationInfo::builder()
            .application_name(b"Textured Quad\0")
            .application_version(vk::make_version(1, 0, 0))
            .engine_name(b"No Engine\0")
            .engine_version(vk::make_version(1, 0, 0))
            .api_version(vk::make_version(1, 0, 0));

        // Layers
        let available_layers = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|l| l.layer_name)
            .collect::<HashSet<_>>();

        let layers = match &requirements.validation_layer {
            Some(layer) => {
                check_validation_layer(&available_layers, layer)?;
                vec![layer.as_ptr()]
            }
            None => Vec::new(),
        };
        let validation = requirements.validation_layer.is_some();

        // Extensions
        let mut extensions = vk_window::get_required_instance_extensions(window)
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        let flags = if cfg!(target_os = "macos")
            && entry.version()? >= constants::PORTABILITY_MACOS_VERSION
        {
            info!("Enabling extensions for macOS portability.");
            extensions.push(
                vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION
                    .name
                    .as_ptr(),
            );
            extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name.as_ptr());
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        if validation {
            extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
        }

        // Create
        let mut info = vk::InstanceCreateInfo::builder()
            .application_info(&application_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .flags(flags);

        let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .user_callback(Some(debug_callback));

        if validation {
            info = info.push_next(&mut debug_info);
        }

        let instance = entry.create_instance(&info, None)?;

        // Messenger
        let messenger = if validation {
            instance.create_debug_utils_messenger_ext(&debug_info, None)?
        } else {
            vk::DebugUtilsMessengerEXT::null()
        };

        // Surface
        let surface = vk_window::create_surface(&instance, window, window)?;

        Ok(VulkanInstance {
            entry,
            vk_instance: instance,
            surface,
            messenger,
        })
    }
}

impl fmt::Debug for VulkanInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VulkanInstance")
            .field("instance", &self.vk_instance.handle())
            .field("surface", &self.surface)
            .finish()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            self.vk_instance.destroy_surface_khr(self.surface, None);
            if !self.messenger.is_null() {
                self.vk_instance
                    .destroy_debug_utils_messenger_ext(self.messenger, None);
            }
            self.vk_instance.destroy_instance(None);
        }
        debug!("Destroyed instance.");
    }
}

/// Exact-name lookup of the requested layer among the enumerated ones.
pub fn check_validation_layer(
    available: &HashSet<vk::ExtensionName>,
    layer: &vk::ExtensionName,
) -> Result<()> {
    if available.contains(layer) {
        Ok(())
    } else {
        Err(anyhow!(RenderError::ValidationUnavailable(layer.to_string())))
    }
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let data = unsafe { *data };
    let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        debug!("({:?}) {}", type_, message);
    } else {
        trace!("({:?}) {}", type_, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_layer_matches_by_exact_name() {
        let layer = vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");
        let available = [
            vk::ExtensionName::from_bytes(b"VK_LAYER_MESA_device_select"),
            layer,
        ]
        .into_iter()
        .collect::<HashSet<_>>();

        assert!(check_validation_layer(&available, &layer).is_ok());
    }

    #[test]
    fn missing_validation_layer_is_reported() {
        let layer = vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");
        let available = [vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation_v2")]
            .into_iter()
            .collect::<HashSet<_>>();

        let error = check_validation_layer(&available, &layer).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RenderError>(),
            Some(RenderError::ValidationUnavailable(name)) if name == "VK_LAYER_KHRONOS_validation"
        ));
    }
}
