//! OpenGL and OpenGL ES backend
//!
//! All GL access goes through a [`GlDriver`] supplied by the host, so the
//! backend never loads symbols or creates contexts itself. GL object names
//! double as the crate-level ids.

mod caps;
mod driver;
#[cfg(test)]
pub(crate) mod mock;

use std::any::Any;
use std::collections::HashMap;

pub use caps::{GlCaps, GlVersion};
pub use driver::{gl, GlDriver, ShaderPrecision};

use super::{
    Backend, BackendLimits, BackendType, BufferId, ProgramId, ShaderId, ShaderLanguage, ShaderStage, TextureDesc,
    TextureId,
};
use crate::buffer::{BufferStorageHint, BufferUsage};
use crate::config::{GraphicsSettings, SwapIntervalMode};
use crate::error::{RenderError, RenderResult};
use crate::format::{FormatMatrix, FormatTarget};
use crate::pipeline::glsl;
use crate::pipeline::{
    BlendMode, CullMode, DepthMode, IndexType, PipelineStateInfo, Primitive, StencilMode, UniformValue,
    VertexBufferLayout, VertexFormat,
};
use crate::texture::mip_dimensions;

#[derive(Debug)]
struct GlTexture {
    desc: TextureDesc,
}

#[derive(Debug)]
struct GlBuffer {
    usage: BufferUsage,
    hint: BufferStorageHint,
    size: usize,
}

fn buffer_target(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Vertex => gl::ARRAY_BUFFER,
        BufferUsage::Index => gl::ELEMENT_ARRAY_BUFFER,
    }
}

fn buffer_hint(hint: BufferStorageHint) -> u32 {
    match hint {
        BufferStorageHint::Static => gl::STATIC_DRAW,
        BufferStorageHint::Dynamic => gl::DYNAMIC_DRAW,
        BufferStorageHint::Stream => gl::STREAM_DRAW,
    }
}

fn primitive_mode(primitive: Primitive) -> u32 {
    match primitive {
        Primitive::Triangles => gl::TRIANGLES,
        Primitive::TriangleStrip => gl::TRIANGLE_STRIP,
        Primitive::Lines => gl::LINES,
        Primitive::LineStrip => gl::LINE_STRIP,
        Primitive::Points => gl::POINTS,
    }
}

fn texture_target(target: FormatTarget) -> u32 {
    match target {
        FormatTarget::Texture2D => gl::TEXTURE_2D,
        FormatTarget::Texture2DArray => gl::TEXTURE_2D_ARRAY,
    }
}

fn blend_factors(blend: BlendMode) -> Option<(u32, u32)> {
    match blend {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some((gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA)),
        BlendMode::Additive => Some((gl::SRC_ALPHA, gl::ONE)),
        BlendMode::Premultiplied => Some((gl::ONE, gl::ONE_MINUS_SRC_ALPHA)),
        BlendMode::Multiplicative => Some((gl::DST_COLOR, gl::ZERO)),
    }
}

fn attribute_type(format: VertexFormat) -> (u32, bool) {
    match format {
        VertexFormat::UByte4Norm => (gl::UNSIGNED_BYTE, true),
        _ => (gl::FLOAT, false),
    }
}

fn index_type(index: IndexType) -> u32 {
    match index {
        IndexType::U16 => gl::UNSIGNED_SHORT,
        IndexType::U32 => gl::UNSIGNED_INT,
    }
}

/// OpenGL 3.0+ / OpenGL ES 3.0+ backend
pub struct GlBackend {
    driver: Box<dyn GlDriver>,
    caps: Option<GlCaps>,
    empty_matrix: FormatMatrix,
    samples: u32,
    textures: HashMap<u32, GlTexture>,
    buffers: HashMap<u32, GlBuffer>,
    shaders: HashMap<u32, ShaderStage>,
    programs: HashMap<u32, String>,
    current_program: Option<u32>,
    vertex_layouts: Vec<VertexBufferLayout>,
    index_type: Option<IndexType>,
    pipeline_bound: bool,
    in_frame: bool,
}

impl std::fmt::Debug for GlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlBackend")
            .field("version", &self.caps.as_ref().map(|c| c.version))
            .field("textures", &self.textures.len())
            .field("buffers", &self.buffers.len())
            .field("programs", &self.programs.len())
            .finish_non_exhaustive()
    }
}

impl GlBackend {
    /// Wrap a driver bound to a current context
    pub fn new(driver: Box<dyn GlDriver>) -> Self {
        Self {
            driver,
            caps: None,
            empty_matrix: FormatMatrix::new(),
            samples: 0,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            vertex_layouts: Vec::new(),
            index_type: None,
            pipeline_bound: false,
            in_frame: false,
        }
    }

    /// Capabilities detected at initialization
    pub fn caps(&self) -> Option<&GlCaps> {
        self.caps.as_ref()
    }

    /// MSAA sample count after clamping to the implementation limit
    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn require_caps(&self) -> RenderResult<&GlCaps> {
        self.caps.as_ref().ok_or(RenderError::NotInitialized)
    }

    fn check_error(&mut self, what: &str) -> RenderResult<()> {
        match self.driver.get_error() {
            gl::NO_ERROR => Ok(()),
            code => Err(RenderError::Backend(format!("{what} raised GL error 0x{code:04X}"))),
        }
    }

    fn apply_swap_interval(&mut self, mode: SwapIntervalMode) {
        if self.driver.set_swap_interval(mode.interval()) {
            return;
        }
        if mode == SwapIntervalMode::AdaptiveVsync {
            log::warn!("Adaptive vsync refused; falling back to vsync");
            if !self.driver.set_swap_interval(SwapIntervalMode::Vsync.interval()) {
                log::warn!("Vsync refused as well; keeping the driver default");
            }
        } else {
            log::warn!("Swap interval {:?} refused by the driver", mode);
        }
    }

    fn use_program(&mut self, program: u32) {
        if self.current_program != Some(program) {
            self.driver.use_program(program);
            self.current_program = Some(program);
        }
    }

    fn allocate_levels(&mut self, desc: &TextureDesc) {
        let internal = desc.format.gl_internal_format();
        let upload = desc.format.gl_upload_format();
        for level in 0..desc.mip_count {
            let (w, h) = mip_dimensions(desc.width, desc.height, level);
            match (desc.target, upload) {
                (FormatTarget::Texture2D, Some((format, ty))) => {
                    self.driver.tex_image_2d(level, internal, w, h, format, ty, None);
                }
                (FormatTarget::Texture2D, None) => {
                    let zeros = vec![0u8; desc.format.level_size(w, h)];
                    self.driver.compressed_tex_image_2d(level, internal, w, h, &zeros);
                }
                (FormatTarget::Texture2DArray, Some((format, ty))) => {
                    self.driver
                        .tex_image_3d(level, internal, w, h, desc.layers, format, ty, None);
                }
                (FormatTarget::Texture2DArray, None) => {
                    let zeros = vec![0u8; desc.format.level_size(w, h) * desc.layers as usize];
                    self.driver
                        .compressed_tex_image_3d(level, internal, w, h, desc.layers, &zeros);
                }
            }
        }
    }

    fn require_draw(&self, what: &str) -> RenderResult<()> {
        if !self.in_frame {
            return Err(RenderError::InvalidOperation(format!("{what} outside begin_frame/end_frame")));
        }
        if !self.pipeline_bound {
            return Err(RenderError::InvalidOperation(format!("{what} without a bound pipeline")));
        }
        Ok(())
    }
}

impl Backend for GlBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::OpenGl
    }

    fn initialize(&mut self, settings: &GraphicsSettings) -> RenderResult<()> {
        let caps = caps::detect(self.driver.as_ref())?;
        self.apply_swap_interval(settings.swap_interval);

        self.samples = settings.antialiasing;
        if self.samples > caps.limits.max_samples {
            log::warn!(
                "Requested {} MSAA samples, {} supports {}",
                self.samples,
                caps.version,
                caps.limits.max_samples
            );
            self.samples = caps.limits.max_samples;
        }

        log::info!(
            "OpenGL backend ready: {}, {} sampled 2D format(s), highp fragments: {}",
            caps.version,
            caps.matrix.sampled_formats(FormatTarget::Texture2D).len(),
            caps.fragment_high_precision
        );
        self.caps = Some(caps);
        Ok(())
    }

    fn shutdown(&mut self) {
        for (name, _) in self.textures.drain() {
            self.driver.delete_texture(name);
        }
        for (name, _) in self.buffers.drain() {
            self.driver.delete_buffer(name);
        }
        for (name, _) in self.shaders.drain() {
            self.driver.delete_shader(name);
        }
        for (name, _) in self.programs.drain() {
            self.driver.delete_program(name);
        }
        self.current_program = None;
        self.vertex_layouts.clear();
        self.index_type = None;
        self.pipeline_bound = false;
        self.in_frame = false;
        self.caps = None;
    }

    fn format_matrix(&self) -> &FormatMatrix {
        self.caps.as_ref().map_or(&self.empty_matrix, |caps| &caps.matrix)
    }

    fn fragment_high_precision(&self) -> bool {
        self.caps.as_ref().is_some_and(|caps| caps.fragment_high_precision)
    }

    fn shader_language(&self) -> ShaderLanguage {
        ShaderLanguage::Glsl
    }

    fn shader_header(&self, stage: ShaderStage) -> String {
        let Some(caps) = self.caps.as_ref() else {
            return format!("{}\n", glsl::version_header(false, 3, 0));
        };
        let version = caps.version;
        let mut header = format!("{}\n", glsl::version_header(version.es, version.major, version.minor));
        if version.es && stage == ShaderStage::Fragment {
            header.push_str(glsl::es_fragment_precision(caps.fragment_high_precision));
        }
        header
    }

    fn limits(&self) -> BackendLimits {
        self.caps.as_ref().map(|caps| caps.limits).unwrap_or_default()
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        let caps = self.require_caps()?;
        desc.validate(&caps.limits)?;
        if !caps.matrix.is_sampled(desc.target, desc.format) {
            return Err(RenderError::UnsupportedFormat {
                format: desc.format,
                reason: format!("not sampled on {:?} by {}", desc.target, caps.version),
            });
        }

        let target = texture_target(desc.target);
        let name = self.driver.gen_texture();
        self.driver.active_texture(gl::TEXTURE0);
        self.driver.bind_texture(target, name);
        self.driver.pixel_store(gl::UNPACK_ALIGNMENT, 1);
        self.allocate_levels(desc);
        self.driver
            .tex_parameter(target, gl::TEXTURE_MAX_LEVEL, desc.mip_count as i32 - 1);
        let min_filter = if desc.mip_count > 1 {
            gl::LINEAR_MIPMAP_LINEAR
        } else {
            gl::LINEAR
        };
        self.driver.tex_parameter(target, gl::TEXTURE_MIN_FILTER, min_filter);
        self.driver.tex_parameter(target, gl::TEXTURE_MAG_FILTER, gl::LINEAR);

        if let Err(e) = self.check_error("texture allocation") {
            self.driver.delete_texture(name);
            return Err(RenderError::ResourceCreationFailed(format!("'{}': {}", desc.debug_name, e)));
        }
        self.textures.insert(name, GlTexture { desc: desc.clone() });
        Ok(TextureId(u64::from(name)))
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
        let name = id.0 as u32;
        let desc = &self
            .textures
            .get(&name)
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown texture {}", id.0)))?
            .desc;
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
        if data.len() != desc.format.level_size(width, height) {
            return Err(RenderError::InvalidOperation(format!(
                "level {level} of '{}' needs {} bytes, got {}",
                desc.debug_name,
                desc.format.level_size(width, height),
                data.len()
            )));
        }

        let format = desc.format;
        let target = desc.target;
        self.driver.bind_texture(texture_target(target), name);
        match (target, format.gl_upload_format()) {
            (FormatTarget::Texture2D, Some((client, ty))) => {
                self.driver.tex_sub_image_2d(level, width, height, client, ty, data);
            }
            (FormatTarget::Texture2D, None) => {
                self.driver
                    .compressed_tex_sub_image_2d(level, width, height, format.gl_internal_format(), data);
            }
            (FormatTarget::Texture2DArray, Some((client, ty))) => {
                self.driver
                    .tex_sub_image_3d(level, layer, width, height, client, ty, data);
            }
            (FormatTarget::Texture2DArray, None) => {
                self.driver.compressed_tex_sub_image_3d(
                    level,
                    layer,
                    width,
                    height,
                    format.gl_internal_format(),
                    data,
                );
            }
        }
        self.check_error("texture upload")
            .map_err(|e| RenderError::ResourceCreationFailed(e.to_string()))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        let name = id.0 as u32;
        if self.textures.remove(&name).is_some() {
            self.driver.delete_texture(name);
        } else {
            log::warn!("Destroying unknown texture {}", id.0);
        }
    }

    fn create_buffer(&mut self, usage: BufferUsage, hint: BufferStorageHint) -> RenderResult<BufferId> {
        self.require_caps()?;
        let name = self.driver.gen_buffer();
        let target = buffer_target(usage);
        self.driver.bind_buffer(target, name);
        self.driver.buffer_data(target, &[], buffer_hint(hint));
        self.buffers.insert(name, GlBuffer { usage, hint, size: 0 });
        log::trace!("Created GL buffer {} ({:?}, {:?})", name, usage, hint);
        Ok(BufferId(u64::from(name)))
    }

    fn upload_buffer(&mut self, id: BufferId, data: &[u8]) -> RenderResult<()> {
        let name = id.0 as u32;
        let buffer = self
            .buffers
            .get_mut(&name)
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown buffer {}", id.0)))?;
        buffer.size = data.len();
        let target = buffer_target(buffer.usage);
        let hint = buffer_hint(buffer.hint);
        self.driver.bind_buffer(target, name);
        self.driver.buffer_data(target, data, hint);
        self.check_error("buffer upload")
    }

    fn update_buffer(&mut self, id: BufferId, offset: usize, data: &[u8]) -> RenderResult<()> {
        let name = id.0 as u32;
        let buffer = self
            .buffers
            .get(&name)
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown buffer {}", id.0)))?;
        if offset.checked_add(data.len()).map_or(true, |end| end > buffer.size) {
            return Err(RenderError::InvalidOperation(format!(
                "update of {} bytes at {offset} overruns buffer {} ({} bytes)",
                data.len(),
                id.0,
                buffer.size
            )));
        }
        let target = buffer_target(buffer.usage);
        self.driver.bind_buffer(target, name);
        self.driver.buffer_sub_data(target, offset, data);
        self.check_error("buffer update")
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        let name = id.0 as u32;
        if self.buffers.remove(&name).is_some() {
            self.driver.delete_buffer(name);
        }
    }

    fn compile_shader(&mut self, stage: ShaderStage, path: &str, source: &[u8]) -> RenderResult<ShaderId> {
        let source = std::str::from_utf8(source).map_err(|e| RenderError::ShaderCompile {
            stage: stage.name(),
            path: path.to_string(),
            log: format!("source is not UTF-8: {e}"),
        })?;
        let kind = match stage {
            ShaderStage::Vertex => gl::VERTEX_SHADER,
            ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        };
        let shader = self.driver.create_shader(kind);
        if let Err(log) = self.driver.compile_shader(shader, source) {
            self.driver.delete_shader(shader);
            return Err(RenderError::ShaderCompile {
                stage: stage.name(),
                path: path.to_string(),
                log,
            });
        }
        self.shaders.insert(shader, stage);
        Ok(ShaderId(u64::from(shader)))
    }

    fn link_program(
        &mut self,
        name: &str,
        vertex: ShaderId,
        fragment: ShaderId,
        attributes: &[(u32, &str)],
    ) -> RenderResult<ProgramId> {
        for (id, stage) in [(vertex, ShaderStage::Vertex), (fragment, ShaderStage::Fragment)] {
            if self.shaders.get(&(id.0 as u32)) != Some(&stage) {
                return Err(RenderError::ProgramLink {
                    name: name.to_string(),
                    log: format!("shader {} is not a compiled {} shader", id.0, stage.name()),
                });
            }
        }

        let program = self.driver.create_program();
        self.driver.attach_shader(program, vertex.0 as u32);
        self.driver.attach_shader(program, fragment.0 as u32);
        for &(location, attribute) in attributes {
            self.driver.bind_attrib_location(program, location, attribute);
        }
        if let Err(log) = self.driver.link_program(program) {
            self.driver.delete_program(program);
            return Err(RenderError::ProgramLink {
                name: name.to_string(),
                log,
            });
        }
        self.programs.insert(program, name.to_string());
        Ok(ProgramId(u64::from(program)))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        let location = self.driver.get_uniform_location(program.0 as u32, name);
        (location >= 0).then_some(location)
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        let location = self.driver.get_attrib_location(program.0 as u32, name);
        (location >= 0).then_some(location)
    }

    fn set_uniform(&mut self, program: ProgramId, location: i32, value: &UniformValue) -> RenderResult<()> {
        let name = program.0 as u32;
        if !self.programs.contains_key(&name) {
            return Err(RenderError::InvalidOperation(format!("unknown program {}", program.0)));
        }
        if location < 0 {
            return Err(RenderError::InvalidOperation(format!("negative uniform location {location}")));
        }
        self.use_program(name);
        self.driver.uniform(location, value);
        Ok(())
    }

    fn delete_shader(&mut self, id: ShaderId) {
        if self.shaders.remove(&(id.0 as u32)).is_some() {
            self.driver.delete_shader(id.0 as u32);
        }
    }

    fn delete_program(&mut self, id: ProgramId) {
        let name = id.0 as u32;
        if self.programs.remove(&name).is_some() {
            self.driver.delete_program(name);
            if self.current_program == Some(name) {
                self.current_program = None;
                self.pipeline_bound = false;
            }
        }
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        if self.in_frame {
            return Err(RenderError::InvalidOperation("begin_frame called twice".to_string()));
        }
        self.require_caps()?;
        self.in_frame = true;
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        if !self.in_frame {
            return Err(RenderError::InvalidOperation("end_frame without begin_frame".to_string()));
        }
        self.in_frame = false;
        self.pipeline_bound = false;
        if let Err(e) = self.check_error("frame") {
            log::warn!("{}", e);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, program: ProgramId, state: &PipelineStateInfo) -> RenderResult<()> {
        let name = program.0 as u32;
        if !self.programs.contains_key(&name) {
            return Err(RenderError::InvalidOperation(format!("unknown program {}", program.0)));
        }
        self.use_program(name);

        match blend_factors(state.blend) {
            Some((src, dst)) => {
                self.driver.enable(gl::BLEND);
                self.driver.blend_func(src, dst);
            }
            None => self.driver.disable(gl::BLEND),
        }

        match state.depth {
            DepthMode::Disabled => self.driver.disable(gl::DEPTH_TEST),
            DepthMode::ReadOnly | DepthMode::ReadWrite => {
                self.driver.enable(gl::DEPTH_TEST);
                self.driver.depth_func(gl::LEQUAL);
            }
        }
        self.driver.depth_mask(state.depth == DepthMode::ReadWrite);

        match state.stencil {
            StencilMode::Disabled => self.driver.disable(gl::STENCIL_TEST),
            StencilMode::Write { reference } => {
                self.driver.enable(gl::STENCIL_TEST);
                self.driver.stencil_func(gl::ALWAYS, i32::from(reference), 0xFF);
                self.driver.stencil_op(gl::KEEP, gl::KEEP, gl::REPLACE);
            }
            StencilMode::Equal { reference } => {
                self.driver.enable(gl::STENCIL_TEST);
                self.driver.stencil_func(gl::EQUAL, i32::from(reference), 0xFF);
                self.driver.stencil_op(gl::KEEP, gl::KEEP, gl::KEEP);
            }
        }

        match state.cull {
            CullMode::None => self.driver.disable(gl::CULL_FACE),
            CullMode::Front => {
                self.driver.enable(gl::CULL_FACE);
                self.driver.cull_face(gl::FRONT);
            }
            CullMode::Back => {
                self.driver.enable(gl::CULL_FACE);
                self.driver.cull_face(gl::BACK);
            }
        }

        self.vertex_layouts = state.vertex_buffers.clone();
        self.pipeline_bound = true;
        Ok(())
    }

    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(BufferId, usize)]) -> RenderResult<()> {
        for (i, &(id, offset)) in buffers.iter().enumerate() {
            let binding = first_binding as usize + i;
            let layout = self.vertex_layouts.get(binding).cloned().ok_or_else(|| {
                RenderError::InvalidOperation(format!("no vertex layout for binding {binding}"))
            })?;
            let name = id.0 as u32;
            if !self.buffers.contains_key(&name) {
                return Err(RenderError::InvalidOperation(format!("unknown buffer {}", id.0)));
            }
            self.driver.bind_buffer(gl::ARRAY_BUFFER, name);
            for attribute in &layout.attributes {
                let (ty, normalized) = attribute_type(attribute.format);
                self.driver.enable_vertex_attrib_array(attribute.location);
                self.driver.vertex_attrib_pointer(
                    attribute.location,
                    attribute.format.components() as i32,
                    ty,
                    normalized,
                    layout.stride,
                    offset + attribute.offset as usize,
                );
            }
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, id: BufferId, index: IndexType) -> RenderResult<()> {
        let name = id.0 as u32;
        match self.buffers.get(&name) {
            Some(buffer) if buffer.usage == BufferUsage::Index => {}
            Some(_) => {
                return Err(RenderError::InvalidOperation(format!("buffer {} is not an index buffer", id.0)));
            }
            None => return Err(RenderError::InvalidOperation(format!("unknown buffer {}", id.0))),
        }
        self.driver.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, name);
        self.index_type = Some(index);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, id: TextureId) -> RenderResult<()> {
        let name = id.0 as u32;
        let target = self
            .textures
            .get(&name)
            .map(|t| texture_target(t.desc.target))
            .ok_or_else(|| RenderError::InvalidOperation(format!("unknown texture {}", id.0)))?;
        self.driver.active_texture(gl::TEXTURE0 + unit);
        self.driver.bind_texture(target, name);
        Ok(())
    }

    fn draw(&mut self, primitive: Primitive, first: u32, count: u32) -> RenderResult<()> {
        self.require_draw("draw")?;
        self.driver.draw_arrays(primitive_mode(primitive), first, count);
        Ok(())
    }

    fn draw_indexed(&mut self, primitive: Primitive, first: u32, count: u32) -> RenderResult<()> {
        self.require_draw("draw_indexed")?;
        let index = self
            .index_type
            .ok_or_else(|| RenderError::InvalidOperation("draw_indexed without an index buffer".to_string()))?;
        self.driver.draw_elements(
            primitive_mode(primitive),
            count,
            index_type(index),
            first as usize * index.size(),
        );
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
    use super::mock::MockGl;
    use super::*;
    use crate::assets::MemorySource;
    use crate::format::PixelFormat;
    use crate::pipeline::uniforms::{mat4, TerrainUniforms};
    use crate::pipeline::{PipelineBuilder, ShaderMode, UniformBlock};

    fn initialized(mock: &MockGl) -> GlBackend {
        let mut backend = GlBackend::new(Box::new(mock.clone()));
        backend.initialize(&GraphicsSettings::new(BackendType::OpenGl)).unwrap();
        backend
    }

    #[test]
    fn test_version_below_minimum_is_rejected() {
        let mock = MockGl::new("2.1 Mesa 20.0");
        let mut backend = GlBackend::new(Box::new(mock));
        let err = backend
            .initialize(&GraphicsSettings::new(BackendType::OpenGl))
            .unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_es_without_compiler_is_rejected() {
        let mock = MockGl::new("OpenGL ES 3.2 Mesa").with_shader_compiler(false);
        let mut backend = GlBackend::new(Box::new(mock));
        let err = backend
            .initialize(&GraphicsSettings::new(BackendType::OpenGl))
            .unwrap_err();
        assert!(matches!(err, RenderError::NoShaderCompiler));
    }

    #[test]
    fn test_adaptive_vsync_falls_back() {
        let mock = MockGl::new("4.6.0 NVIDIA").refusing_swap_interval(-1);
        let mut backend = GlBackend::new(Box::new(mock.clone()));
        let settings = GraphicsSettings::new(BackendType::OpenGl).with_swap_interval(SwapIntervalMode::AdaptiveVsync);
        backend.initialize(&settings).unwrap();
        assert_eq!(mock.swap_intervals(), vec![-1, 1]);
    }

    #[test]
    fn test_antialiasing_clamped() {
        let mock = MockGl::new("4.6.0 NVIDIA").with_integer(gl::MAX_SAMPLES, 4);
        let mut backend = GlBackend::new(Box::new(mock));
        backend
            .initialize(&GraphicsSettings::new(BackendType::OpenGl).with_antialiasing(16))
            .unwrap();
        assert_eq!(backend.samples(), 4);
    }

    #[test]
    fn test_es_fragment_header_has_precision() {
        let backend = initialized(&MockGl::new("OpenGL ES 3.0 Mesa").with_high_precision(false));
        assert_eq!(backend.shader_header(ShaderStage::Vertex), "#version 300 es\n");
        let fragment = backend.shader_header(ShaderStage::Fragment);
        assert!(fragment.starts_with("#version 300 es\n"));
        assert!(fragment.contains("precision mediump float;"));
    }

    #[test]
    fn test_format_queries_fill_matrix() {
        let mock = MockGl::new("4.6.0 NVIDIA")
            .with_extension("GL_EXT_texture_compression_s3tc")
            .with_unsupported(PixelFormat::Bc2);
        let backend = initialized(&mock);
        let matrix = backend.format_matrix();
        assert!(matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Bc7));
        assert!(matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Bc3));
        assert!(!matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Bc2));
        assert!(!matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Etc1));
        // BC equivalents present, so ETC2 is dropped
        assert!(!matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Etc2Rgba8));
        assert!(matrix.supports(
            FormatTarget::Texture2D,
            PixelFormat::D24S8,
            crate::format::PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT
        ));
    }

    #[test]
    fn test_without_format_query_everything_is_sampled_only() {
        let backend = initialized(&MockGl::new("3.3.0 Mesa"));
        let matrix = backend.format_matrix();
        assert!(matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Rgba8));
        assert!(matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Bc4));
        assert!(!matrix.is_sampled(FormatTarget::Texture2D, PixelFormat::Bc7));
        assert!(!matrix.supports(
            FormatTarget::Texture2D,
            PixelFormat::D24S8,
            crate::format::PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT
        ));
    }

    #[test]
    fn test_texture_allocates_every_level() {
        let mock = MockGl::new("4.6.0 NVIDIA");
        let mut backend = initialized(&mock);
        let desc = TextureDesc {
            width: 16,
            height: 8,
            mip_count: 5,
            layers: 1,
            format: PixelFormat::Rgba8,
            target: FormatTarget::Texture2D,
            debug_name: "t".to_string(),
        };
        let id = backend.create_texture(&desc).unwrap();
        assert_eq!(mock.count_calls("tex_image_2d"), 5);
        backend
            .upload_texture_level(id, 0, 1, 8, 4, &[0u8; 8 * 4 * 4])
            .unwrap();
        assert!(backend.upload_texture_level(id, 0, 1, 16, 8, &[0u8; 16 * 8 * 4]).is_err());
        backend.destroy_texture(id);
        assert_eq!(mock.count_calls("delete_texture"), 1);
    }

    #[test]
    fn test_shared_uniform_duplicated_without_fragment_highp() {
        let vertex = "in vec4 vertex;\nuniform mat4 ModelViewProjectionMatrix;\nuniform int fogEnabled;\n\
                      out float fog;\nvoid main() { fog = float(fogEnabled); gl_Position = ModelViewProjectionMatrix * vertex; }\n";
        let fragment = "in float fog;\nuniform int fogEnabled;\nuniform vec4 fogColor;\nout vec4 FragColor;\n\
                        void main() { FragColor = fogEnabled > 0 ? fogColor : vec4(fog); }\n";
        let assets = MemorySource::new("mem")
            .with_file("shaders/terrain.vert", vertex)
            .with_file("shaders/terrain.frag", fragment);

        let mock = MockGl::new("OpenGL ES 3.0 Mesa").with_high_precision(false);
        let mut backend = initialized(&mock);
        let pipeline = PipelineBuilder::new(&mut backend, &assets)
            .build(ShaderMode::Terrain, PipelineStateInfo::new(Vec::new()));
        assert!(pipeline.is_built());

        let fragment_source = mock.shader_source_containing("fogColor").unwrap();
        assert!(fragment_source.contains("uniform int fogEnabled_fragdup;"));

        let mut uniforms: TerrainUniforms = bytemuck::Zeroable::zeroed();
        uniforms.model_view_projection = mat4(&nalgebra::Matrix4::identity());
        uniforms.fog_enabled = 1;
        pipeline
            .apply_uniforms(&mut backend, &UniformBlock::Terrain(uniforms))
            .unwrap();

        let program = pipeline.program().unwrap().0 as u32;
        let vertex_location = mock.uniform_location_of(program, "fogEnabled").unwrap();
        let fragment_location = mock.uniform_location_of(program, "fogEnabled_fragdup").unwrap();
        let writes = mock.uniform_writes();
        assert!(writes.contains(&(program, vertex_location, UniformValue::Int(1))));
        assert!(writes.contains(&(program, fragment_location, UniformValue::Int(1))));
    }

    #[test]
    fn test_draw_requires_frame_and_pipeline() {
        let mock = MockGl::new("4.6.0 NVIDIA");
        let mut backend = initialized(&mock);
        assert!(backend.draw(Primitive::Triangles, 0, 3).is_err());
        backend.begin_frame().unwrap();
        assert!(backend.draw(Primitive::Triangles, 0, 3).is_err());
        backend.end_frame().unwrap();
    }

    #[test]
    fn test_buffer_upload_keeps_storage_hint() {
        let mock = MockGl::new("4.6.0 NVIDIA");
        let mut backend = initialized(&mock);
        let hints = [
            (BufferStorageHint::Static, gl::STATIC_DRAW),
            (BufferStorageHint::Dynamic, gl::DYNAMIC_DRAW),
            (BufferStorageHint::Stream, gl::STREAM_DRAW),
        ];
        for (hint, expected) in hints {
            let id = backend.create_buffer(BufferUsage::Vertex, hint).unwrap();
            backend.upload_buffer(id, &[0u8; 16]).unwrap();
            assert_eq!(mock.buffer_usages().last(), Some(&expected), "{hint:?}");
            backend.destroy_buffer(id);
        }
    }
}
