use std::mem::size_of;
use std::sync::Arc;

use anyhow::Result;
use vulkanalia::vk;

use super::buffer::VulkanBuffer;
use super::constants;
use super::device::VulkanDevice;
use super::vertex::{as_bytes, Vec3};

pub type Point3 = nalgebra::Point3<f32>;
pub type Mat4 = nalgebra::Matrix4<f32>;

const FOVY_DEGREES: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Matches the `UniformBufferObject` block of the vertex shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Transforms for `elapsed` seconds after start, drawn into `extent`.
    pub fn at(elapsed: f32, extent: vk::Extent2D) -> Self {
        let angle = elapsed * constants::ROTATION_DEGREES_PER_SECOND.to_radians();
        let model = Mat4::from_axis_angle(&Vec3::z_axis(), angle);

        let view = Mat4::look_at_rh(
            &Point3::new(2.0, 2.0, 2.0),
            &Point3::origin(),
            &Vec3::z_axis(),
        );

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let proj = perspective(aspect, FOVY_DEGREES.to_radians(), Z_NEAR, Z_FAR);

        Self { model, view, proj }
    }
}

/// Right-handed perspective with depth mapped to [0, 1] and Y pointing down,
/// as Vulkan clip space expects.
pub fn perspective(aspect: f32, fovy: f32, near: f32, far: f32) -> Mat4 {
    #[rustfmt::skip]
    let correction = Mat4::new(
        1.0,  0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0,  0.0, 0.5, 0.5,
        0.0,  0.0, 0.0, 1.0,
    );
    correction * Mat4::new_perspective(aspect, fovy, near, far)
}

/// One persistently mapped uniform buffer per frame slot.
#[derive(Debug)]
pub struct UniformBuffers {
    pub buffers: Vec<VulkanBuffer>,
}

impl UniformBuffers {
    pub unsafe fn new(device: Arc<VulkanDevice>, count: usize) -> Result<Self> {
        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            let mut buffer = VulkanBuffer::create(
                device.clone(),
                size_of::<UniformBufferObject>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            buffer.map_persistent()?;
            buffers.push(buffer);
        }
        Ok(Self { buffers })
    }

    /// The slot's fence must have been waited on.
    pub unsafe fn write(&self, slot: usize, ubo: &UniformBufferObject) -> Result<()> {
        self.buffers[slot].write(as_bytes(std::slice::from_ref(ubo)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: 800,
            height: 600,
        }
    }

    #[test]
    fn layout_matches_three_std140_matrices() {
        assert_eq!(size_of::<UniformBufferObject>(), 3 * 64);
    }

    #[test]
    fn model_starts_unrotated() {
        let ubo = UniformBufferObject::at(0.0, extent());
        assert_relative_eq!(ubo.model, Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn model_turns_a_quarter_per_second_about_up() {
        let ubo = UniformBufferObject::at(1.0, extent());
        let x = ubo.model * Vector4::new(1.0, 0.0, 0.0, 0.0);
        assert_relative_eq!(x, Vector4::new(0.0, 1.0, 0.0, 0.0), epsilon = 1e-6);

        let up = ubo.model * Vector4::new(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(up, Vector4::new(0.0, 0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn origin_lands_in_the_center_of_the_view() {
        let ubo = UniformBufferObject::at(0.37, extent());
        let clip = ubo.proj * ubo.view * ubo.model * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;

        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn projection_flips_y_and_maps_depth_to_unit_range() {
        let proj = perspective(4.0 / 3.0, 45f32.to_radians(), 0.1, 10.0);
        assert!(proj[(1, 1)] < 0.0);

        let near = proj * Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vector4::new(0.0, 0.0, -10.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);

        // A point above the axis ends up in the upper half of the image.
        let above = proj * Vector4::new(0.0, 1.0, -5.0, 1.0);
        assert!(above.y / above.w < 0.0);
    }

    #[test]
    fn aspect_follows_the_extent() {
        let wide = UniformBufferObject::at(0.0, vk::Extent2D { width: 1600, height: 600 });
        let square = UniformBufferObject::at(0.0, vk::Extent2D { width: 600, height: 600 });
        assert_relative_eq!(wide.proj[(0, 0)] * 1600.0 / 600.0, square.proj[(0, 0)], epsilon = 1e-5);
    }
}
