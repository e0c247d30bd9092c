use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::device::VulkanDevice;
use super::image::VulkanImage;
use crate::error::RenderError;

/// Decoded RGBA8 pixels, row-major, no padding.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path).map_err(|e| {
            anyhow!(RenderError::TextureLoad {
                path: PathBuf::from(path),
                reason: e.to_string(),
            })
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        if width == 0 || height == 0 {
            return Err(anyhow!(RenderError::TextureLoad {
                path: PathBuf::from(path),
                reason: "image has no pixels".to_string(),
            }));
        }

        info!("Loaded texture `{}` ({}x{}).", path.display(), width, height);
        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// A sampled, shader-read-only image and the sampler it is read through.
#[derive(Debug)]
pub struct Texture {
    device: Arc<VulkanDevice>,
    pub image: VulkanImage,
    pub sampler: vk::Sampler,
}

impl Texture {
    /// `image` must already hold its pixels in SHADER_READ_ONLY_OPTIMAL.
    pub unsafe fn new(device: Arc<VulkanDevice>, image: VulkanImage) -> Result<Self> {
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = device
            .vk_device
            .create_sampler(&info, None)
            .map_err(RenderError::gpu("create_sampler"))?;

        Ok(Self {
            device,
            image,
            sampler,
        })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.vk_device.destroy_sampler(self.sampler, None);
        }
        trace!("Destroyed sampler.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_to_tightly_packed_rgba() {
        let path = std::env::temp_dir().join("textured-quad-decode-test.png");
        let mut source = image::RgbImage::new(3, 2);
        source.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        source.save(&path).unwrap();

        let data = TextureData::load(&path).unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.pixels.len(), 3 * 2 * 4);
        assert_eq!(&data.pixels[20..24], &[10, 20, 30, 255]);
        assert_eq!(
            data.extent(),
            vk::Extent2D {
                width: 3,
                height: 2
            }
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unreadable_texture_is_a_texture_load_error() {
        let path = std::env::temp_dir().join("textured-quad-no-such-texture.png");
        let error = TextureData::load(&path).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<RenderError>(),
            Some(RenderError::TextureLoad { path: reported, .. }) if *reported == path
        ));
    }

    #[test]
    fn bundled_texture_decodes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../textures/texture.png");
        let data = TextureData::load(&path).unwrap();
        assert_eq!(data.pixels.len() as u32, data.width * data.height * 4);
    }
}
