//! Vulkan backend
//!
//! Headless Vulkan 1.0: the backend owns an instance, device and queue,
//! negotiates formats from device format features, and creates images,
//! buffers and SPIR-V programs. Presentation and draw recording need a
//! render target from the host and are not provided here.

mod context;
mod resources;
mod shader;

use std::any::Any;

use slotmap::{DefaultKey, Key, KeyData, SlotMap};
use thiserror::Error;

pub use context::VulkanContext;

use self::resources::{buffer_usage_flags, VkBuffer, VkImage};
use self::shader::{VkProgram, VkShader};
use super::{
    Backend, BackendLimits, BackendType, BufferId, ProgramId, ShaderId, ShaderLanguage, ShaderStage, TextureDesc,
    TextureId,
};
use crate::buffer::{BufferStorageHint, BufferUsage};
use crate::config::GraphicsSettings;
use crate::error::{RenderError, RenderResult};
use crate::format::FormatMatrix;
use crate::pipeline::{IndexType, PipelineStateInfo, Primitive, UniformValue};
use crate::texture::mip_dimensions;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(ash::vk::Result),

    /// Resource with specified ID could not be found
    #[error("Resource not found: {id}")]
    ResourceNotFound {
        /// The unique identifier of the resource
        id: u64,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Memory allocation failed
    #[error("Out of memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: usize,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl From<VulkanError> for RenderError {
    fn from(e: VulkanError) -> Self {
        match e {
            VulkanError::InitializationFailed(reason) => RenderError::InitializationFailed(reason),
            VulkanError::InvalidOperation { reason } => RenderError::InvalidOperation(reason),
            VulkanError::ResourceNotFound { id } => RenderError::InvalidOperation(format!("unknown resource {id}")),
            VulkanError::OutOfMemory { .. } | VulkanError::NoSuitableMemoryType => {
                RenderError::ResourceCreationFailed(e.to_string())
            }
            VulkanError::Api(_) => RenderError::Backend(e.to_string()),
        }
    }
}

fn key(raw: u64) -> DefaultKey {
    KeyData::from_ffi(raw).into()
}

/// Vulkan 1.0 backend
pub struct VulkanBackend {
    app_name: String,
    instance_extensions: Vec<String>,
    context: Option<VulkanContext>,
    matrix: FormatMatrix,
    limits: BackendLimits,
    samples: u32,
    textures: SlotMap<DefaultKey, VkImage>,
    buffers: SlotMap<DefaultKey, VkBuffer>,
    shaders: SlotMap<DefaultKey, VkShader>,
    programs: SlotMap<DefaultKey, VkProgram>,
    bound_program: Option<ProgramId>,
    in_frame: bool,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("app_name", &self.app_name)
            .field("initialized", &self.context.is_some())
            .field("textures", &self.textures.len())
            .field("buffers", &self.buffers.len())
            .finish_non_exhaustive()
    }
}

impl VulkanBackend {
    /// Backend that will create its instance with `instance_extensions`
    pub fn new(app_name: &str, instance_extensions: Vec<String>) -> Self {
        Self {
            app_name: app_name.to_string(),
            instance_extensions,
            context: None,
            matrix: FormatMatrix::new(),
            limits: BackendLimits::default(),
            samples: 1,
            textures: SlotMap::new(),
            buffers: SlotMap::new(),
            shaders: SlotMap::new(),
            programs: SlotMap::new(),
            bound_program: None,
            in_frame: false,
        }
    }

    /// The device context, once initialized
    pub fn context(&self) -> Option<&VulkanContext> {
        self.context.as_ref()
    }

    /// MSAA sample count after clamping to the device limit
    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn ctx(&self) -> RenderResult<&VulkanContext> {
        self.context.as_ref().ok_or(RenderError::NotInitialized)
    }

    fn unsupported(what: &str) -> RenderError {
        RenderError::Unsupported(format!("{what} needs a render target; the Vulkan backend is headless"))
    }
}

impl Backend for VulkanBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Vulkan
    }

    fn initialize(&mut self, settings: &GraphicsSettings) -> RenderResult<()> {
        let context = VulkanContext::new(&self.app_name, &self.instance_extensions)?;
        self.matrix = context.format_matrix();
        self.limits = context.limits();

        self.samples = settings.antialiasing.max(1);
        if self.samples > self.limits.max_samples {
            log::warn!(
                "Requested {} MSAA samples, device supports {}",
                self.samples,
                self.limits.max_samples
            );
            self.samples = self.limits.max_samples;
        }
        log::debug!("Swap interval {:?} applies when the host creates a swapchain", settings.swap_interval);

        self.context = Some(context);
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        context.wait_idle();
        let device = &context.device;
        for (_, program) in self.programs.drain() {
            program.destroy(device);
        }
        for (_, shader) in self.shaders.drain() {
            shader.destroy(device);
        }
        for (_, image) in self.textures.drain() {
            image.destroy(device);
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy(device);
        }
        self.bound_program = None;
        self.in_frame = false;
        self.matrix = FormatMatrix::new();
    }

    fn format_matrix(&self) -> &FormatMatrix {
        &self.matrix
    }

    fn fragment_high_precision(&self) -> bool {
        true
    }

    fn shader_language(&self) -> ShaderLanguage {
        ShaderLanguage::Spirv
    }

    fn shader_header(&self, _stage: ShaderStage) -> String {
        String::new()
    }

    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        desc.validate(&self.limits)?;
        if !self.matrix.is_sampled(desc.target, desc.format) {
            return Err(RenderError::UnsupportedFormat {
                format: desc.format,
                reason: format!("not sampled on {:?} by this device", desc.target),
            });
        }
        let image = VkImage::create(self.ctx()?, desc)?;
        let id = self.textures.insert(image);
        Ok(TextureId(id.data().as_ffi()))
    }

    fn upload_texture_level(
        &mut self,
        id: TextureId,
        layer: u32,
        level: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        let ctx = self.ctx()?;
        let image = self
            .textures
            .get(key(id.0))
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown texture {}", id.0)))?;
        let desc = &image.desc;
        if layer >= desc.layers || level >= desc.mip_count {
            return Err(RenderError::InvalidOperation(format!(
                "upload to layer {layer} level {level} of '{}' ({} layers, {} mips)",
                desc.debug_name, desc.layers, desc.mip_count
            )));
        }
        if (width, height) != mip_dimensions(desc.width, desc.height, level)
            || data.len() != desc.format.level_size(width, height)
        {
            return Err(RenderError::InvalidOperation(format!(
                "level {level} of '{}' uploaded as {width}x{height} with {} bytes",
                desc.debug_name,
                data.len()
            )));
        }
        image.upload(ctx, layer, level, width, height, data)?;
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        match (self.textures.remove(key(id.0)), self.context.as_ref()) {
            (Some(image), Some(ctx)) => {
                ctx.wait_idle();
                image.destroy(&ctx.device);
            }
            _ => log::warn!("Destroying unknown texture {}", id.0),
        }
    }

    fn create_buffer(&mut self, usage: BufferUsage, hint: BufferStorageHint) -> RenderResult<BufferId> {
        let buffer = VkBuffer::create(self.ctx()?, usage, 0, buffer_usage_flags(usage))?;
        log::trace!("Created Vulkan {:?} buffer ({:?})", usage, hint);
        let id = self.buffers.insert(buffer);
        Ok(BufferId(id.data().as_ffi()))
    }

    fn upload_buffer(&mut self, id: BufferId, data: &[u8]) -> RenderResult<()> {
        let ctx = self.context.as_ref().ok_or(RenderError::NotInitialized)?;
        let buffer = self
            .buffers
            .get_mut(key(id.0))
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown buffer {}", id.0)))?;
        if data.len() > buffer.capacity {
            let replacement = VkBuffer::create(ctx, buffer.usage, data.len(), buffer_usage_flags(buffer.usage))?;
            ctx.wait_idle();
            buffer.destroy(&ctx.device);
            *buffer = replacement;
        }
        buffer.write(&ctx.device, 0, data)?;
        buffer.size = data.len();
        Ok(())
    }

    fn update_buffer(&mut self, id: BufferId, offset: usize, data: &[u8]) -> RenderResult<()> {
        let ctx = self.ctx()?;
        let buffer = self
            .buffers
            .get(key(id.0))
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown buffer {}", id.0)))?;
        if offset.checked_add(data.len()).map_or(true, |end| end > buffer.size) {
            return Err(RenderError::InvalidOperation(format!(
                "update of {} bytes at {offset} overruns buffer {} ({} bytes)",
                data.len(),
                id.0,
                buffer.size
            )));
        }
        buffer.write(&ctx.device, offset, data)?;
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let (Some(buffer), Some(ctx)) = (self.buffers.remove(key(id.0)), self.context.as_ref()) {
            ctx.wait_idle();
            buffer.destroy(&ctx.device);
        }
    }

    fn compile_shader(&mut self, stage: ShaderStage, path: &str, source: &[u8]) -> RenderResult<ShaderId> {
        let shader = VkShader::create(&self.ctx()?.device, stage, source).map_err(|e| RenderError::ShaderCompile {
            stage: stage.name(),
            path: path.to_string(),
            log: e.to_string(),
        })?;
        let id = self.shaders.insert(shader);
        Ok(ShaderId(id.data().as_ffi()))
    }

    fn link_program(
        &mut self,
        name: &str,
        vertex: ShaderId,
        fragment: ShaderId,
        attributes: &[(u32, &str)],
    ) -> RenderResult<ProgramId> {
        let ctx = self.context.as_ref().ok_or(RenderError::NotInitialized)?;
        let lookup = |id: ShaderId, stage: ShaderStage| {
            self.shaders
                .get(key(id.0))
                .filter(|s| s.stage == stage)
                .ok_or_else(|| RenderError::ProgramLink {
                    name: name.to_string(),
                    log: format!("shader {} is not a compiled {} shader", id.0, stage.name()),
                })
        };
        let vs = lookup(vertex, ShaderStage::Vertex)?;
        let fs = lookup(fragment, ShaderStage::Fragment)?;
        let program = VkProgram::link(&ctx.device, name, vs, fs, attributes).map_err(|e| RenderError::ProgramLink {
            name: name.to_string(),
            log: e.to_string(),
        })?;
        let id = self.programs.insert(program);
        Ok(ProgramId(id.data().as_ffi()))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        self.programs
            .get(key(program.0))?
            .uniforms
            .iter()
            .position(|u| u == name)
            .map(|i| i as i32)
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        self.programs
            .get(key(program.0))?
            .attributes
            .iter()
            .find(|(_, n)| n == name)
            .map(|&(loc, _)| loc as i32)
    }

    fn set_uniform(&mut self, program: ProgramId, location: i32, value: &UniformValue) -> RenderResult<()> {
        let entry = self
            .programs
            .get_mut(key(program.0))
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown program {}", program.0)))?;
        if location < 0 || location as usize >= entry.uniforms.len() {
            return Err(RenderError::InvalidOperation(format!(
                "uniform location {location} out of range for '{}'",
                entry.name
            )));
        }
        entry.values.insert(location, *value);
        Ok(())
    }

    fn delete_shader(&mut self, id: ShaderId) {
        // Modules stay alive while a linked program references them
        let in_use = self.shaders.get(key(id.0)).is_some_and(|shader| {
            self.programs
                .values()
                .any(|p| p.vertex == shader.module || p.fragment == shader.module)
        });
        if in_use {
            return;
        }
        if let (Some(shader), Some(ctx)) = (self.shaders.remove(key(id.0)), self.context.as_ref()) {
            shader.destroy(&ctx.device);
        }
    }

    fn delete_program(&mut self, id: ProgramId) {
        if let (Some(program), Some(ctx)) = (self.programs.remove(key(id.0)), self.context.as_ref()) {
            ctx.wait_idle();
            program.destroy(&ctx.device);
        }
        if self.bound_program == Some(id) {
            self.bound_program = None;
        }
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        self.ctx()?;
        if self.in_frame {
            return Err(RenderError::InvalidOperation("begin_frame called twice".to_string()));
        }
        self.in_frame = true;
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        if !self.in_frame {
            return Err(RenderError::InvalidOperation("end_frame without begin_frame".to_string()));
        }
        self.in_frame = false;
        self.bound_program = None;
        Ok(())
    }

    fn bind_pipeline(&mut self, program: ProgramId, _state: &PipelineStateInfo) -> RenderResult<()> {
        if !self.programs.contains_key(key(program.0)) {
            return Err(RenderError::InvalidOperation(format!("unknown program {}", program.0)));
        }
        self.bound_program = Some(program);
        Ok(())
    }

    fn bind_vertex_buffers(&mut self, _first_binding: u32, buffers: &[(BufferId, usize)]) -> RenderResult<()> {
        if let Some(&(id, _)) = buffers.iter().find(|(id, _)| !self.buffers.contains_key(key(id.0))) {
            return Err(RenderError::InvalidOperation(format!("unknown buffer {}", id.0)));
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, id: BufferId, _index_type: IndexType) -> RenderResult<()> {
        match self.buffers.get(key(id.0)) {
            Some(buffer) if buffer.usage == BufferUsage::Index => Ok(()),
            Some(_) => Err(RenderError::InvalidOperation(format!("buffer {} is not an index buffer", id.0))),
            None => Err(RenderError::InvalidOperation(format!("unknown buffer {}", id.0))),
        }
    }

    fn bind_texture(&mut self, _unit: u32, id: TextureId) -> RenderResult<()> {
        if self.textures.contains_key(key(id.0)) {
            Ok(())
        } else {
            Err(RenderError::InvalidOperation(format!("unknown texture {}", id.0)))
        }
    }

    fn draw(&mut self, _primitive: Primitive, _first: u32, _count: u32) -> RenderResult<()> {
        Err(Self::unsupported("draw"))
    }

    fn draw_indexed(&mut self, _primitive: Primitive, _first: u32, _count: u32) -> RenderResult<()> {
        Err(Self::unsupported("draw_indexed"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
