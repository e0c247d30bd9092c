use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::bytecode::Bytecode;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::descriptor::DescriptorSetLayout;
use super::device::VulkanDevice;
use super::render_pass::VulkanRenderPass;
use super::vertex::Vertex;
use crate::error::RenderError;

/// Compiled SPIR-V for both stages. Kept for the renderer's lifetime so the
/// pipeline can be rebuilt without touching the filesystem.
#[derive(Clone, Debug)]
pub struct ShaderSet {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

impl ShaderSet {
    pub fn load(vertex: &Path, fragment: &Path) -> Result<Self> {
        Ok(Self {
            vertex: read_shader(vertex)?,
            fragment: read_shader(fragment)?,
        })
    }
}

fn read_shader(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| shader_error(path, e.to_string()))?;
    check_bytecode(path, &bytes)?;
    debug!("Loaded shader `{}` ({} bytes).", path.display(), bytes.len());
    Ok(bytes)
}

/// SPIR-V is a stream of 32-bit words.
fn check_bytecode(path: &Path, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(shader_error(path, "file is empty".to_string()));
    }
    Bytecode::new(bytes).map_err(|e| shader_error(path, format!("{:?}", e)))?;
    Ok(())
}

fn shader_error(path: &Path, reason: String) -> anyhow::Error {
    anyhow!(RenderError::ShaderLoad {
        path: PathBuf::from(path),
        reason,
    })
}

/// The graphics pipeline and its layout. Depends on the render pass only
/// through its attachment format.
#[derive(Debug)]
pub struct VulkanPipeline {
    device: Arc<VulkanDevice>,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl VulkanPipeline {
    pub unsafe fn new(
        device: Arc<VulkanDevice>,
        render_pass: &VulkanRenderPass,
        set_layout: &DescriptorSetLayout,
        shaders: &ShaderSet,
    ) -> Result<Self> {
        let vertex_shader_module = create_shader_module(&device, &shaders.vertex)?;
        let fragment_shader_module = match create_shader_module(&device, &shaders.fragment) {
            Ok(module) => module,
            Err(error) => {
                device
                    .vk_device
                    .destroy_shader_module(vertex_shader_module, None);
                return Err(error);
            }
        };

        let result = Self::create(
            device.clone(),
            render_pass,
            set_layout,
            vertex_shader_module,
            fragment_shader_module,
        );

        // destroy shader modules
        device
            .vk_device
            .destroy_shader_module(vertex_shader_module, None);
        device
            .vk_device
            .destroy_shader_module(fragment_shader_module, None);

        result
    }

    unsafe fn create(
        device: Arc<VulkanDevice>,
        render_pass: &VulkanRenderPass,
        set_layout: &DescriptorSetLayout,
        vertex_shader_module: vk::ShaderModule,
        fragment_shader_module: vk::ShaderModule,
    ) -> Result<Self> {
        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader_module)
            .name(b"main\0");

        let binding_descriptions = &[Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only their counts are baked in.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

        // rasterizer
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        // multisampling
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1);

        // color blending
        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::all())
            .blend_enable(false);

        let attachments = &[attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(attachments)
            .blend_constants([0.0, 0.0, 0.0, 0.0]);

        // layout
        let set_layouts = &[set_layout.layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = device
            .vk_device
            .create_pipeline_layout(&layout_info, None)
            .map_err(RenderError::pipeline("pipeline layout"))?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.render_pass)
            .subpass(0);

        let pipeline = match device.vk_device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[info],
            None,
        ) {
            Ok((pipelines, _)) => pipelines[0],
            Err(code) => {
                device.vk_device.destroy_pipeline_layout(layout, None);
                return Err(RenderError::pipeline("graphics pipeline")(code).into());
            }
        };
        debug!("Created graphics pipeline.");

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.vk_device.destroy_pipeline(self.pipeline, None);
            self.device
                .vk_device
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Destroyed graphics pipeline.");
    }
}

unsafe fn create_shader_module(device: &VulkanDevice, bytecode: &[u8]) -> Result<vk::ShaderModule> {
    let bytecode = Bytecode::new(bytecode).map_err(|e| anyhow!("{:?}", e))?;
    let info = vk::ShaderModuleCreateInfo::builder()
        .code_size(bytecode.code_size())
        .code(bytecode.code());

    Ok(device
        .vk_device
        .create_shader_module(&info, None)
        .map_err(RenderError::pipeline("shader module"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shader_load_reason(error: &anyhow::Error) -> Option<(PathBuf, String)> {
        match error.downcast_ref::<RenderError>() {
            Some(RenderError::ShaderLoad { path, reason }) => Some((path.clone(), reason.clone())),
            _ => None,
        }
    }

    #[test]
    fn missing_shader_file_is_a_shader_load_error() {
        let path = std::env::temp_dir().join("textured-quad-missing-shader.spv");
        let error = ShaderSet::load(&path, &path).unwrap_err();

        let (reported, _) = shader_load_reason(&error).unwrap();
        assert_eq!(reported, path);
    }

    #[test]
    fn truncated_bytecode_is_rejected() {
        let path = Path::new("shaders/vert.spv");
        let error = check_bytecode(path, &[0x03, 0x02, 0x23, 0x07, 0x00]).unwrap_err();
        assert!(shader_load_reason(&error).is_some());

        let error = check_bytecode(path, &[]).unwrap_err();
        let (_, reason) = shader_load_reason(&error).unwrap();
        assert!(reason.contains("empty"));
    }

    #[test]
    fn word_aligned_bytecode_is_accepted() {
        let magic = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        assert!(check_bytecode(Path::new("shaders/frag.spv"), &magic).is_ok());
    }

    #[test]
    fn fragment_path_is_reported_when_only_it_is_missing() {
        let vertex = std::env::temp_dir().join("textured-quad-present-vertex.spv");
        fs::write(&vertex, [0x03, 0x02, 0x23, 0x07]).unwrap();
        let fragment = std::env::temp_dir().join("textured-quad-absent-fragment.spv");
        let _ = fs::remove_file(&fragment);

        let error = ShaderSet::load(&vertex, &fragment).unwrap_err();
        let (reported, _) = shader_load_reason(&error).unwrap();
        assert_eq!(reported, fragment);

        let _ = fs::remove_file(&vertex);
    }
}
