use std::path::PathBuf;

use thiserror::Error;
use vulkanalia::vk;

/// Fatal failures surfaced by the renderer.
///
/// Swapchain staleness never shows up here; it is recovered by recreating the
/// presentation chain.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No capable physical device found.")]
    NoCapableDevice,

    #[error("Validation layer `{0}` requested but not supported.")]
    ValidationUnavailable(String),

    #[error("No memory type matches type bits {type_bits:#034b} with properties {properties:?}.")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Failed to create {object}: {code}")]
    PipelineCreation {
        object: &'static str,
        code: vk::ErrorCode,
    },

    #[error("Failed to load shader `{}`: {reason}", path.display())]
    ShaderLoad { path: PathBuf, reason: String },

    #[error("Failed to load texture `{}`: {reason}", path.display())]
    TextureLoad { path: PathBuf, reason: String },

    #[error("GPU operation `{operation}` failed: {code}")]
    GpuOperationFailed {
        operation: &'static str,
        code: vk::ErrorCode,
    },
}

impl RenderError {
    pub fn gpu(operation: &'static str) -> impl FnOnce(vk::ErrorCode) -> RenderError {
        move |code| RenderError::GpuOperationFailed { operation, code }
    }

    pub fn pipeline(object: &'static str) -> impl FnOnce(vk::ErrorCode) -> RenderError {
        move |code| RenderError::PipelineCreation { object, code }
    }
}
