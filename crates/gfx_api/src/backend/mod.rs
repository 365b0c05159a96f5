//! Backend abstraction
//!
//! This module defines the trait every rendering backend implements so the
//! texture loaders, pipeline builder and [`crate::Context`] work the same way
//! over OpenGL/OpenGL ES, Vulkan, or the no-op null backend.
//!
//! The trait is sealed: the set of backends is closed and selected through
//! [`BackendType`] at context initialization. Backends that need something
//! from the host (a GL context, Vulkan instance extensions) receive it from
//! the caller's [`BackendFactory`].

pub mod null;
pub mod opengl;
pub mod vulkan;

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::buffer::{BufferStorageHint, BufferUsage};
use crate::config::GraphicsSettings;
use crate::error::{RenderError, RenderResult};
use crate::format::{FormatMatrix, FormatTarget, PixelFormat};
use crate::pipeline::{IndexType, PipelineStateInfo, Primitive, UniformValue};

pub use null::{NullBackend, NullCapabilities};
pub use opengl::{GlBackend, GlDriver};
pub use vulkan::VulkanBackend;

/// Available backend implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendType {
    /// No-op backend that records resources in memory
    Null,
    /// OpenGL 3.0+ or OpenGL ES 3.0+
    OpenGl,
    /// Vulkan 1.0+
    Vulkan,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendType::Null => "null",
            BackendType::OpenGl => "opengl",
            BackendType::Vulkan => "vulkan",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for BackendType {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(BackendType::Null),
            "opengl" | "gl" | "gles" => Ok(BackendType::OpenGl),
            "vulkan" | "vk" => Ok(BackendType::Vulkan),
            other => Err(RenderError::InvalidOperation(format!("Unknown backend '{other}'"))),
        }
    }
}

/// Backend texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Backend buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Backend shader stage handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

/// Backend linked program handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

/// Programmable shader stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// Lowercase stage name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// Source language a backend consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderLanguage {
    /// GLSL text, prefixed by [`Backend::shader_header`]
    Glsl,
    /// Precompiled SPIR-V modules (`<path>.spv`)
    Spirv,
}

/// Implementation limits reported after initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendLimits {
    /// Largest texture edge in pixels
    pub max_texture_size: u32,
    /// Largest layer count of a texture array
    pub max_array_layers: u32,
    /// Largest MSAA sample count
    pub max_samples: u32,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 16384,
            max_array_layers: 2048,
            max_samples: 8,
        }
    }
}

/// Parameters of a texture allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width of level 0
    pub width: u32,
    /// Height of level 0
    pub height: u32,
    /// Number of mip levels (at least 1)
    pub mip_count: u32,
    /// Number of array layers (1 for plain 2D)
    pub layers: u32,
    /// Storage format
    pub format: PixelFormat,
    /// 2D or 2D array
    pub target: FormatTarget,
    /// Name used in diagnostics
    pub debug_name: String,
}

impl TextureDesc {
    /// Check the description against the format and limits
    pub fn validate(&self, limits: &BackendLimits) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 || self.mip_count == 0 || self.layers == 0 {
            return Err(RenderError::InvalidOperation(format!(
                "Degenerate texture '{}' ({}x{}, {} mips, {} layers)",
                self.debug_name, self.width, self.height, self.mip_count, self.layers
            )));
        }
        if self.width.max(self.height) > limits.max_texture_size {
            return Err(RenderError::ResourceCreationFailed(format!(
                "Texture '{}' is {}x{}, limit is {}",
                self.debug_name, self.width, self.height, limits.max_texture_size
            )));
        }
        if self.layers > limits.max_array_layers {
            return Err(RenderError::ResourceCreationFailed(format!(
                "Texture array '{}' has {} layers, limit is {}",
                self.debug_name, self.layers, limits.max_array_layers
            )));
        }
        let max_mips = 32 - self.width.max(self.height).leading_zeros();
        if self.mip_count > max_mips {
            return Err(RenderError::InvalidOperation(format!(
                "Texture '{}' requests {} mips, at most {} fit",
                self.debug_name, self.mip_count, max_mips
            )));
        }
        Ok(())
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::NullBackend {}
    impl Sealed for super::GlBackend {}
    impl Sealed for super::VulkanBackend {}
}

/// Rendering backend
///
/// Object-safe; the context owns exactly one `Box<dyn Backend>`.
pub trait Backend: sealed::Sealed {
    /// Which implementation this is
    fn backend_type(&self) -> BackendType;

    /// Bring the backend up; on error the caller shuts it down and drops it
    fn initialize(&mut self, settings: &GraphicsSettings) -> RenderResult<()>;

    /// Release every backend resource
    fn shutdown(&mut self);

    /// Capability matrix, immutable after initialization
    fn format_matrix(&self) -> &FormatMatrix;

    /// Whether fragment shaders support high-precision float and int
    fn fragment_high_precision(&self) -> bool;

    /// Shader language consumed by [`Backend::compile_shader`]
    fn shader_language(&self) -> ShaderLanguage;

    /// Text prepended to GLSL sources (`#version` and precision lines)
    fn shader_header(&self, stage: ShaderStage) -> String;

    /// Implementation limits
    fn limits(&self) -> BackendLimits;

    /// Allocate a texture with all levels and layers
    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId>;

    /// Upload one level of one layer; `data` is in the texture's format
    fn upload_texture_level(
        &mut self,
        id: TextureId,
        layer: u32,
        level: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RenderResult<()>;

    /// Free a texture
    fn destroy_texture(&mut self, id: TextureId);

    /// Create an empty buffer
    fn create_buffer(&mut self, usage: BufferUsage, hint: BufferStorageHint) -> RenderResult<BufferId>;

    /// Replace a buffer's contents, resizing it
    fn upload_buffer(&mut self, id: BufferId, data: &[u8]) -> RenderResult<()>;

    /// Overwrite a sub-range of a buffer
    fn update_buffer(&mut self, id: BufferId, offset: usize, data: &[u8]) -> RenderResult<()>;

    /// Free a buffer
    fn destroy_buffer(&mut self, id: BufferId);

    /// Compile one stage; errors carry the driver's diagnostic text
    fn compile_shader(&mut self, stage: ShaderStage, path: &str, source: &[u8]) -> RenderResult<ShaderId>;

    /// Link a program, binding `attributes` (location, name) before linking
    fn link_program(
        &mut self,
        name: &str,
        vertex: ShaderId,
        fragment: ShaderId,
        attributes: &[(u32, &str)],
    ) -> RenderResult<ProgramId>;

    /// Location of an active uniform
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32>;

    /// Location of an active vertex attribute
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<i32>;

    /// Set one uniform on a program
    fn set_uniform(&mut self, program: ProgramId, location: i32, value: &UniformValue) -> RenderResult<()>;

    /// Free a shader stage object
    fn delete_shader(&mut self, id: ShaderId);

    /// Free a program
    fn delete_program(&mut self, id: ProgramId);

    /// Start recording a frame
    fn begin_frame(&mut self) -> RenderResult<()>;

    /// Finish a frame
    fn end_frame(&mut self) -> RenderResult<()>;

    /// Make a program and its fixed-function state current
    fn bind_pipeline(&mut self, program: ProgramId, state: &PipelineStateInfo) -> RenderResult<()>;

    /// Bind vertex buffers (with byte offsets) starting at `first_binding`
    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(BufferId, usize)]) -> RenderResult<()>;

    /// Bind the index buffer for indexed draws
    fn bind_index_buffer(&mut self, id: BufferId, index_type: IndexType) -> RenderResult<()>;

    /// Bind a texture to a sampler unit
    fn bind_texture(&mut self, unit: u32, id: TextureId) -> RenderResult<()>;

    /// Non-indexed draw with the bound pipeline's primitive
    fn draw(&mut self, primitive: Primitive, first: u32, count: u32) -> RenderResult<()>;

    /// Indexed draw with the bound index buffer
    fn draw_indexed(&mut self, primitive: Primitive, first: u32, count: u32) -> RenderResult<()>;

    /// Downcast to concrete backend type
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast to concrete backend type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Host hooks used to construct backends
///
/// Every method has a default so headless users only override what their
/// backend choice needs.
pub trait BackendFactory {
    /// Hand out a GL driver bound to a current context
    fn create_gl_driver(&self) -> RenderResult<Box<dyn GlDriver>> {
        Err(RenderError::Unsupported(
            "this factory cannot create an OpenGL context".to_string(),
        ))
    }

    /// Extra Vulkan instance extensions (surface extensions, ...)
    fn vulkan_instance_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Capabilities reported by the null backend
    fn null_capabilities(&self) -> NullCapabilities {
        NullCapabilities::default()
    }

    /// Application name passed to drivers
    fn application_name(&self) -> &str {
        "gfx_api"
    }
}

/// Factory for headless use: Null and Vulkan backends only
#[derive(Debug, Clone, Default)]
pub struct HeadlessFactory {
    application_name: String,
    null_capabilities: NullCapabilities,
}

impl HeadlessFactory {
    /// Create a factory reporting `application_name`
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            null_capabilities: NullCapabilities::default(),
        }
    }

    /// Capabilities the null backend will report
    pub fn with_null_capabilities(mut self, capabilities: NullCapabilities) -> Self {
        self.null_capabilities = capabilities;
        self
    }
}

impl BackendFactory for HeadlessFactory {
    fn null_capabilities(&self) -> NullCapabilities {
        self.null_capabilities.clone()
    }

    fn application_name(&self) -> &str {
        &self.application_name
    }
}

/// Construct (but do not initialize) the backend for `kind`
pub fn create_backend(kind: BackendType, factory: &dyn BackendFactory) -> RenderResult<Box<dyn Backend>> {
    log::debug!("Creating {} backend", kind);
    Ok(match kind {
        BackendType::Null => Box::new(NullBackend::new(factory.null_capabilities())),
        BackendType::OpenGl => Box::new(GlBackend::new(factory.create_gl_driver()?)),
        BackendType::Vulkan => Box::new(VulkanBackend::new(
            factory.application_name(),
            factory.vulkan_instance_extensions(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parse() {
        assert_eq!("Vulkan".parse::<BackendType>().unwrap(), BackendType::Vulkan);
        assert_eq!("gles".parse::<BackendType>().unwrap(), BackendType::OpenGl);
        assert!("metal".parse::<BackendType>().is_err());
        assert_eq!(BackendType::Null.to_string(), "null");
    }

    #[test]
    fn test_texture_desc_validation() {
        let limits = BackendLimits::default();
        let mut desc = TextureDesc {
            width: 256,
            height: 256,
            mip_count: 9,
            layers: 1,
            format: PixelFormat::Rgba8,
            target: FormatTarget::Texture2D,
            debug_name: "t".to_string(),
        };
        assert!(desc.validate(&limits).is_ok());
        desc.mip_count = 10;
        assert!(desc.validate(&limits).is_err());
        desc.mip_count = 0;
        assert!(desc.validate(&limits).is_err());
    }

    #[test]
    fn test_headless_factory_has_no_gl() {
        let factory = HeadlessFactory::new("test");
        assert!(create_backend(BackendType::OpenGl, &factory).is_err());
        let backend = create_backend(BackendType::Null, &factory).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Null);
    }
}
