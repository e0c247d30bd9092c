use std::mem::{offset_of, size_of};

use vulkanalia::vk::{self, HasBuilder};

pub type Vec2 = nalgebra::Vector2<f32>;
pub type Vec3 = nalgebra::Vector3<f32>;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub pos: Vec2,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub fn new(pos: Vec2, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            pos,
            color,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        let pos = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(offset_of!(Vertex, pos) as u32)
            .build();
        let color = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(1)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(offset_of!(Vertex, color) as u32)
            .build();
        let tex_coord = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(2)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(offset_of!(Vertex, tex_coord) as u32)
            .build();
        [pos, color, tex_coord]
    }
}

/// A unit quad in the XY plane, one color per corner.
pub fn quad_vertices() -> [Vertex; 4] {
    [
        Vertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0), Vec2::new(0.0, 1.0)),
        Vertex::new(Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0), Vec2::new(1.0, 1.0)),
    ]
}

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Reinterprets a slice of plain `#[repr(C)]` values as bytes for upload.
pub fn as_bytes<T: Copy>(values: &[T]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(values.as_ptr().cast::<u8>(), std::mem::size_of_val(values)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 28);
        assert_eq!(Vertex::binding_description().stride, 28);

        let attributes = Vertex::attribute_descriptions();
        let offsets = attributes.iter().map(|a| a.offset).collect::<Vec<_>>();
        let locations = attributes.iter().map(|a| a.location).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 8, 20]);
        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn quad_indices_form_two_triangles_over_four_vertices() {
        let vertices = quad_vertices();
        assert_eq!(vertices.len(), 4);
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|i| (*i as usize) < vertices.len()));

        // Both triangles share the 0-2 diagonal.
        let (first, second) = QUAD_INDICES.split_at(3);
        assert!(first.contains(&0) && first.contains(&2));
        assert!(second.contains(&0) && second.contains(&2));
    }

    #[test]
    fn byte_view_covers_every_element() {
        let vertices = quad_vertices();
        assert_eq!(as_bytes(&vertices).len(), 4 * 28);
        assert_eq!(as_bytes(&QUAD_INDICES).len(), 12);
    }
}
