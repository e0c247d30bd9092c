use vulkanalia::{vk, Version};

pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);
pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
pub const VALIDATION_LAYER_NAME: &str = "VK_LAYER_KHRONOS_validation";
pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub const PREFERRED_SURFACE_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;
pub const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Rotation rate of the quad about the up axis, in degrees per second.
pub const ROTATION_DEGREES_PER_SECOND: f32 = 90.0;
