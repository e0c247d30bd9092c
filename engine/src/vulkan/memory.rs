use anyhow::{anyhow, Result};
use vulkanalia::vk;

use crate::error::RenderError;

/// Index of the first memory type allowed by `type_bits` whose flags include
/// all of `properties`.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory.memory_type_count.min(memory.memory_types.len() as u32))
        .find(|i| {
            let suitable = (type_bits & (1 << i)) != 0;
            let memory_type = memory.memory_types[*i as usize];
            suitable && memory_type.property_flags.contains(properties)
        })
        .ok_or_else(|| {
            anyhow!(RenderError::NoSuitableMemoryType {
                type_bits,
                properties,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties::default();
        memory.memory_type_count = flags.len() as u32;
        for (i, flags) in flags.iter().enumerate() {
            memory.memory_types[i].property_flags = *flags;
        }
        memory
    }

    fn host() -> vk::MemoryPropertyFlags {
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
    }

    #[test]
    fn picks_first_type_with_bit_and_flags() {
        let memory = memory(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host(),
            host() | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&memory, 0b111, host()).unwrap(), 1);
        assert_eq!(
            find_memory_type(&memory, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn superset_of_requested_flags_is_accepted() {
        let memory = memory(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host() | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&memory, 0b11, host()).unwrap(), 1);
    }

    #[test]
    fn masked_out_types_are_skipped() {
        let memory = memory(&[host(), host()]);

        assert_eq!(find_memory_type(&memory, 0b10, host()).unwrap(), 1);
    }

    #[test]
    fn no_match_is_an_error() {
        let memory = memory(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host()]);

        // Right flags, wrong bit.
        let error = find_memory_type(&memory, 0b01, host()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RenderError>(),
            Some(RenderError::NoSuitableMemoryType { type_bits: 0b01, .. })
        ));

        // Right bit, wrong flags.
        assert!(find_memory_type(&memory, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());

        // Nothing allowed at all.
        assert!(find_memory_type(&memory, 0, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn result_always_satisfies_mask_and_flags() {
        let flags = [
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL | host(),
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ];
        let memory = memory(&flags);
        let wanted = [
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host(),
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ];

        for type_bits in 0..16u32 {
            for properties in wanted {
                if let Ok(index) = find_memory_type(&memory, type_bits, properties) {
                    assert_ne!(type_bits & (1 << index), 0);
                    assert!(flags[index as usize].contains(properties));
                } else {
                    assert!((0..4).all(|i| type_bits & (1 << i) == 0
                        || !flags[i].contains(properties)));
                }
            }
        }
    }
}
