//! Null backend
//!
//! Keeps every resource in memory and validates calls the way a driver
//! would, without touching a GPU. The capability matrix and fragment
//! precision are configurable so texture and pipeline logic can be exercised
//! against any hardware profile.

use std::any::Any;
use std::collections::HashMap;

use slotmap::{DefaultKey, Key, KeyData, SlotMap};

use super::{
    Backend, BackendLimits, BackendType, BufferId, ProgramId, ShaderId, ShaderLanguage, ShaderStage, TextureDesc,
    TextureId,
};
use crate::buffer::{BufferStorageHint, BufferUsage};
use crate::config::GraphicsSettings;
use crate::error::{RenderError, RenderResult};
use crate::format::{FormatMatrix, PixelFormat, PixelFormatUsage};
use crate::pipeline::glsl;
use crate::pipeline::{IndexType, PipelineStateInfo, Primitive, UniformValue};
use crate::texture::mip_dimensions;

/// Hardware profile reported by the null backend
#[derive(Debug, Clone, PartialEq)]
pub struct NullCapabilities {
    /// Capability matrix before the ETC fallback rule
    pub matrix: FormatMatrix,
    /// Fragment shaders have high-precision float and int
    pub fragment_high_precision: bool,
    /// Implementation limits
    pub limits: BackendLimits,
}

impl Default for NullCapabilities {
    /// Uncompressed color formats sampled everywhere plus depth attachments
    fn default() -> Self {
        let mut matrix = FormatMatrix::new();
        for format in PixelFormat::UNCOMPRESSED_COLOR {
            matrix = matrix.with(format, PixelFormatUsage::SAMPLED_IMAGE);
        }
        for format in [PixelFormat::D24S8, PixelFormat::D32F] {
            matrix = matrix.with(
                format,
                PixelFormatUsage::SAMPLED_IMAGE | PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT,
            );
        }
        Self {
            matrix,
            fragment_high_precision: true,
            limits: BackendLimits::default(),
        }
    }
}

impl NullCapabilities {
    /// Also sample `formats` on both targets
    pub fn with_compressed(mut self, formats: &[PixelFormat]) -> Self {
        for &format in formats {
            self.matrix = self.matrix.with(format, PixelFormatUsage::SAMPLED_IMAGE);
        }
        self
    }

    /// Remove a format from both targets
    pub fn without(mut self, format: PixelFormat) -> Self {
        self.matrix = self.matrix.with(format, PixelFormatUsage::empty());
        self
    }

    /// Replace the whole matrix
    pub fn with_matrix(mut self, matrix: FormatMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Set fragment shader precision
    pub fn with_fragment_high_precision(mut self, high: bool) -> Self {
        self.fragment_high_precision = high;
        self
    }

    /// Set implementation limits
    pub fn with_limits(mut self, limits: BackendLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// A texture held by the null backend
#[derive(Debug, Clone)]
pub struct NullTexture {
    /// Allocation parameters
    pub desc: TextureDesc,
    /// Uploaded data keyed by (layer, level)
    pub levels: HashMap<(u32, u32), Vec<u8>>,
}

#[derive(Debug)]
struct NullBuffer {
    usage: BufferUsage,
    hint: BufferStorageHint,
    data: Vec<u8>,
}

#[derive(Debug)]
struct NullShader {
    stage: ShaderStage,
    source: String,
}

/// A linked program
#[derive(Debug, Clone)]
pub struct NullProgram {
    /// Friendly name passed at link time
    pub name: String,
    /// Active uniforms; the location is the index
    pub uniforms: Vec<String>,
    /// Bound attribute (location, name) pairs
    pub attributes: Vec<(u32, String)>,
    /// Last value set per location
    pub values: HashMap<i32, UniformValue>,
}

/// One recorded draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullDraw {
    /// Program bound at draw time
    pub program: ProgramId,
    /// Primitive assembly
    pub primitive: Primitive,
    /// First vertex or index
    pub first: u32,
    /// Vertex or index count
    pub count: u32,
    /// Whether an index buffer was used
    pub indexed: bool,
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct NullBackend {
    capabilities: NullCapabilities,
    matrix: FormatMatrix,
    initialized: bool,
    in_frame: bool,
    textures: SlotMap<DefaultKey, NullTexture>,
    buffers: SlotMap<DefaultKey, NullBuffer>,
    shaders: SlotMap<DefaultKey, NullShader>,
    programs: SlotMap<DefaultKey, NullProgram>,
    bound_program: Option<ProgramId>,
    bound_index: Option<(BufferId, IndexType)>,
    uniform_writes: Vec<(ProgramId, i32, UniformValue)>,
    draws: Vec<NullDraw>,
}

fn key(raw: u64) -> DefaultKey {
    KeyData::from_ffi(raw).into()
}

impl NullBackend {
    /// Create a backend reporting `capabilities`
    pub fn new(capabilities: NullCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// A live texture
    pub fn texture(&self, id: TextureId) -> Option<&NullTexture> {
        self.textures.get(key(id.0))
    }

    /// Contents of a live buffer
    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(key(id.0)).map(|b| b.data.as_slice())
    }

    /// A linked program
    pub fn program(&self, id: ProgramId) -> Option<&NullProgram> {
        self.programs.get(key(id.0))
    }

    /// Every uniform write in call order
    pub fn uniform_writes(&self) -> &[(ProgramId, i32, UniformValue)] {
        &self.uniform_writes
    }

    /// Every draw in call order
    pub fn draws(&self) -> &[NullDraw] {
        &self.draws
    }

    fn texture_mut(&mut self, id: TextureId) -> RenderResult<&mut NullTexture> {
        self.textures
            .get_mut(key(id.0))
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown texture {}", id.0)))
    }

    fn buffer_mut(&mut self, id: BufferId) -> RenderResult<&mut NullBuffer> {
        self.buffers
            .get_mut(key(id.0))
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown buffer {}", id.0)))
    }

    fn require_frame(&self, what: &str) -> RenderResult<ProgramId> {
        if !self.in_frame {
            return Err(RenderError::InvalidOperation(format!("{what} outside begin_frame/end_frame")));
        }
        self.bound_program
            .ok_or_else(|| RenderError::InvalidOperation(format!("{what} without a bound pipeline")))
    }
}

impl Backend for NullBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Null
    }

    fn initialize(&mut self, settings: &GraphicsSettings) -> RenderResult<()> {
        let mut matrix = self.capabilities.matrix.clone();
        matrix.apply_etc_fallback_rule();
        self.matrix = matrix;
        self.initialized = true;
        log::info!(
            "Null backend initialized ({} sample(s), {:?})",
            settings.antialiasing.min(self.capabilities.limits.max_samples),
            settings.swap_interval
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.textures.is_empty() {
            log::debug!("Null backend dropping {} texture(s) at shutdown", self.textures.len());
        }
        self.textures.clear();
        self.buffers.clear();
        self.shaders.clear();
        self.programs.clear();
        self.bound_program = None;
        self.bound_index = None;
        self.initialized = false;
    }

    fn format_matrix(&self) -> &FormatMatrix {
        &self.matrix
    }

    fn fragment_high_precision(&self) -> bool {
        self.capabilities.fragment_high_precision
    }

    fn shader_language(&self) -> ShaderLanguage {
        ShaderLanguage::Glsl
    }

    fn shader_header(&self, _stage: ShaderStage) -> String {
        format!("{}\n", glsl::version_header(false, 3, 3))
    }

    fn limits(&self) -> BackendLimits {
        self.capabilities.limits
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        desc.validate(&self.capabilities.limits)?;
        if !self.matrix.is_sampled(desc.target, desc.format) {
            return Err(RenderError::UnsupportedFormat {
                format: desc.format,
                reason: format!("not sampled on {:?}", desc.target),
            });
        }
        let id = self.textures.insert(NullTexture {
            desc: desc.clone(),
            levels: HashMap::new(),
        });
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
        let texture = self.texture_mut(id)?;
        let desc = &texture.desc;
        if layer >= desc.layers || level >= desc.mip_count {
            return Err(RenderError::InvalidOperation(format!(
                "upload to layer {layer} level {level} of '{}' ({} layers, {} mips)",
                desc.debug_name, desc.layers, desc.mip_count
            )));
        }
        if (width, height) != mip_dimensions(desc.width, desc.height, level) {
            return Err(RenderError::InvalidOperation(format!(
                "level {level} of '{}' uploaded as {width}x{height}",
                desc.debug_name
            )));
        }
        let expected = desc.format.level_size(width, height);
        if data.len() != expected {
            return Err(RenderError::InvalidOperation(format!(
                "level {level} of '{}' needs {expected} bytes of {:?}, got {}",
                desc.debug_name,
                desc.format,
                data.len()
            )));
        }
        texture.levels.insert((layer, level), data.to_vec());
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(key(id.0)).is_none() {
            log::warn!("Destroying unknown texture {}", id.0);
        }
    }

    fn create_buffer(&mut self, usage: BufferUsage, hint: BufferStorageHint) -> RenderResult<BufferId> {
        let id = self.buffers.insert(NullBuffer {
            usage,
            hint,
            data: Vec::new(),
        });
        Ok(BufferId(id.data().as_ffi()))
    }

    fn upload_buffer(&mut self, id: BufferId, data: &[u8]) -> RenderResult<()> {
        let buffer = self.buffer_mut(id)?;
        buffer.data = data.to_vec();
        log::trace!("Null {:?}/{:?} buffer now {} bytes", buffer.usage, buffer.hint, data.len());
        Ok(())
    }

    fn update_buffer(&mut self, id: BufferId, offset: usize, data: &[u8]) -> RenderResult<()> {
        let buffer = self.buffer_mut(id)?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= buffer.data.len())
            .ok_or_else(|| RenderError::InvalidOperation(format!("update overruns buffer {}", id.0)))?;
        buffer.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        self.buffers.remove(key(id.0));
    }

    fn compile_shader(&mut self, stage: ShaderStage, path: &str, source: &[u8]) -> RenderResult<ShaderId> {
        let source = String::from_utf8_lossy(source).into_owned();
        if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
            return Err(RenderError::ShaderCompile {
                stage: stage.name(),
                path: path.to_string(),
                log: line.trim().to_string(),
            });
        }
        let id = self.shaders.insert(NullShader { stage, source });
        Ok(ShaderId(id.data().as_ffi()))
    }

    fn link_program(
        &mut self,
        name: &str,
        vertex: ShaderId,
        fragment: ShaderId,
        attributes: &[(u32, &str)],
    ) -> RenderResult<ProgramId> {
        let mut uniforms: Vec<String> = Vec::new();
        for (id, stage) in [(vertex, ShaderStage::Vertex), (fragment, ShaderStage::Fragment)] {
            let shader = self.shaders.get(key(id.0)).ok_or_else(|| RenderError::ProgramLink {
                name: name.to_string(),
                log: format!("unknown {} shader {}", stage.name(), id.0),
            })?;
            if shader.stage != stage {
                return Err(RenderError::ProgramLink {
                    name: name.to_string(),
                    log: format!("shader {} is not a {} shader", id.0, stage.name()),
                });
            }
            for decl in glsl::scan_uniforms(&shader.source) {
                if !uniforms.contains(&decl.name) {
                    uniforms.push(decl.name);
                }
            }
        }

        let id = self.programs.insert(NullProgram {
            name: name.to_string(),
            uniforms,
            attributes: attributes.iter().map(|&(loc, n)| (loc, n.to_string())).collect(),
            values: HashMap::new(),
        });
        Ok(ProgramId(id.data().as_ffi()))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        self.program(program)?
            .uniforms
            .iter()
            .position(|u| u == name)
            .map(|i| i as i32)
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        self.program(program)?
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
        self.uniform_writes.push((program, location, *value));
        Ok(())
    }

    fn delete_shader(&mut self, id: ShaderId) {
        self.shaders.remove(key(id.0));
    }

    fn delete_program(&mut self, id: ProgramId) {
        self.programs.remove(key(id.0));
        if self.bound_program == Some(id) {
            self.bound_program = None;
        }
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
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
        if self.program(program).is_none() {
            return Err(RenderError::InvalidOperation(format!("unknown program {}", program.0)));
        }
        self.bound_program = Some(program);
        Ok(())
    }

    fn bind_vertex_buffers(&mut self, _first_binding: u32, buffers: &[(BufferId, usize)]) -> RenderResult<()> {
        for &(id, _) in buffers {
            self.buffer_mut(id)?;
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, id: BufferId, index_type: IndexType) -> RenderResult<()> {
        let buffer = self.buffer_mut(id)?;
        if buffer.usage != BufferUsage::Index {
            return Err(RenderError::InvalidOperation(format!("buffer {} is not an index buffer", id.0)));
        }
        self.bound_index = Some((id, index_type));
        Ok(())
    }

    fn bind_texture(&mut self, _unit: u32, id: TextureId) -> RenderResult<()> {
        self.texture_mut(id).map(|_| ())
    }

    fn draw(&mut self, primitive: Primitive, first: u32, count: u32) -> RenderResult<()> {
        let program = self.require_frame("draw")?;
        self.draws.push(NullDraw {
            program,
            primitive,
            first,
            count,
            indexed: false,
        });
        Ok(())
    }

    fn draw_indexed(&mut self, primitive: Primitive, first: u32, count: u32) -> RenderResult<()> {
        let program = self.require_frame("draw_indexed")?;
        let (id, index_type) = self
            .bound_index
            .ok_or_else(|| RenderError::InvalidOperation("draw_indexed without an index buffer".to_string()))?;
        let available = self.buffers.get(key(id.0)).map_or(0, |b| b.data.len() / index_type.size());
        if (first as usize).saturating_add(count as usize) > available {
            return Err(RenderError::InvalidOperation(format!(
                "draw_indexed reads {} indices from {first}, buffer holds {available}",
                count
            )));
        }
        self.draws.push(NullDraw {
            program,
            primitive,
            first,
            count,
            indexed: true,
        });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatTarget;

    fn backend(capabilities: NullCapabilities) -> NullBackend {
        let mut backend = NullBackend::new(capabilities);
        backend.initialize(&GraphicsSettings::new(BackendType::Null)).unwrap();
        backend
    }

    fn desc(format: PixelFormat) -> TextureDesc {
        TextureDesc {
            width: 8,
            height: 4,
            mip_count: 4,
            layers: 1,
            format,
            target: FormatTarget::Texture2D,
            debug_name: "t".to_string(),
        }
    }

    #[test]
    fn test_etc_rule_applied_on_initialize() {
        let caps = NullCapabilities::default().with_compressed(&[PixelFormat::Bc1, PixelFormat::Etc2Rgb8, PixelFormat::EacR11]);
        let backend = backend(caps);
        assert!(backend.format_matrix().is_sampled(FormatTarget::Texture2D, PixelFormat::Bc1));
        assert!(!backend.format_matrix().is_sampled(FormatTarget::Texture2D, PixelFormat::Etc2Rgb8));
        assert!(backend.format_matrix().is_sampled(FormatTarget::Texture2D, PixelFormat::EacR11));
    }

    #[test]
    fn test_upload_validation() {
        let mut backend = backend(NullCapabilities::default());
        let id = backend.create_texture(&desc(PixelFormat::Rgba8)).unwrap();
        assert!(backend.upload_texture_level(id, 0, 0, 8, 4, &[0; 128]).is_ok());
        assert!(backend.upload_texture_level(id, 0, 1, 4, 2, &[0; 31]).is_err());
        assert!(backend.upload_texture_level(id, 0, 1, 8, 4, &[0; 128]).is_err());
        assert!(backend.upload_texture_level(id, 0, 3, 1, 1, &[0; 4]).is_ok());
        assert!(backend.upload_texture_level(id, 1, 0, 8, 4, &[0; 128]).is_err());
        backend.destroy_texture(id);
        assert_eq!(backend.texture_count(), 0);
    }

    #[test]
    fn test_unsampled_format_rejected() {
        let mut backend = backend(NullCapabilities::default());
        assert!(matches!(
            backend.create_texture(&desc(PixelFormat::Bc7)),
            Err(RenderError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_link_collects_uniforms_from_both_stages() {
        let mut backend = backend(NullCapabilities::default());
        let vs = backend
            .compile_shader(ShaderStage::Vertex, "a.vert", b"uniform mat4 mvp;\nuniform int fog;")
            .unwrap();
        let fs = backend
            .compile_shader(ShaderStage::Fragment, "a.frag", b"uniform int fog_fragdup;\nuniform sampler2D tex;")
            .unwrap();
        let program = backend.link_program("a", vs, fs, &[(0, "vertex")]).unwrap();
        assert_eq!(backend.uniform_location(program, "mvp"), Some(0));
        assert_eq!(backend.uniform_location(program, "fog_fragdup"), Some(2));
        assert_eq!(backend.uniform_location(program, "missing"), None);
        assert_eq!(backend.attribute_location(program, "vertex"), Some(0));
        assert!(backend.set_uniform(program, 7, &UniformValue::Int(1)).is_err());
    }

    #[test]
    fn test_compile_error_carries_log() {
        let mut backend = backend(NullCapabilities::default());
        let err = backend
            .compile_shader(ShaderStage::Fragment, "bad.frag", b"#error broken on purpose\n")
            .unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { stage: "fragment", .. }));
    }

    #[test]
    fn test_draw_requires_frame_and_pipeline() {
        let mut backend = backend(NullCapabilities::default());
        assert!(backend.draw(Primitive::Triangles, 0, 3).is_err());
        backend.begin_frame().unwrap();
        assert!(backend.draw(Primitive::Triangles, 0, 3).is_err());
        assert!(backend.begin_frame().is_err());
        backend.end_frame().unwrap();
    }
}
