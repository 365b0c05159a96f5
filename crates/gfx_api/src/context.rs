//! Graphics context
//!
//! The [`Context`] owns the active backend, the negotiated best formats,
//! the compression override table and the frame counter. Rendering code
//! holds the textures, buffers and pipelines it creates and hands them
//! back for destruction.

#[cfg(debug_assertions)]
use std::collections::HashSet;

use crate::assets::{AssetSource, DirectorySource, ImageData};
use crate::backend::{self, Backend, BackendFactory, BackendType, ShaderStage, TextureId};
use crate::buffer::{Buffer, BufferStorageHint, BufferUsage};
use crate::compression::OverrideTable;
use crate::config::{ContextSettings, GraphicsSettings};
use crate::error::{RenderError, RenderResult};
use crate::format::{BestFormats, FormatTarget, PixelFormat, PixelFormatUsage};
use crate::pipeline::{IndexType, Pipeline, PipelineBuilder, PipelineStateInfo, Primitive, ShaderMode, UniformBlock, UniformBlockKind};
use crate::texture::{self, LoaderEnv, Texture, TextureArray, TextureLoadOptions, TextureType};

/// Default logical path of the compression override file
pub const DEFAULT_OVERRIDE_FILE: &str = "texture_compression_overrides.txt";

/// Backend-agnostic graphics context
pub struct Context {
    assets: Box<dyn AssetSource>,
    override_path: String,
    backend: Option<Box<dyn Backend>>,
    settings: GraphicsSettings,
    best: BestFormats,
    overrides: OverrideTable,
    frame: u64,
    bound_primitive: Option<Primitive>,
    #[cfg(debug_assertions)]
    live_textures: HashSet<TextureId>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.backend_type())
            .field("frame", &self.frame)
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Uninitialized context reading data through `assets`
    pub fn new(assets: Box<dyn AssetSource>) -> Self {
        Self {
            assets,
            override_path: DEFAULT_OVERRIDE_FILE.to_string(),
            backend: None,
            settings: GraphicsSettings::default(),
            best: BestFormats::default(),
            overrides: OverrideTable::new(),
            frame: 0,
            bound_primitive: None,
            #[cfg(debug_assertions)]
            live_textures: HashSet::new(),
        }
    }

    /// Uninitialized context over the directories and override file in `settings`
    pub fn from_settings(settings: &ContextSettings) -> Self {
        let assets = DirectorySource::new(&settings.assets.roots);
        Self::new(Box::new(assets)).with_override_file(settings.assets.compression_overrides.clone())
    }

    /// Logical path of the compression override file
    pub fn with_override_file(mut self, path: impl Into<String>) -> Self {
        self.override_path = path.into();
        self
    }

    /// Construct and initialize the backend named by `settings.backend`
    ///
    /// Initializing again with the backend that is already active is a no-op;
    /// asking for a different one fails and leaves the active backend alone.
    /// A backend whose initialization fails is shut down and dropped.
    pub fn initialize(&mut self, factory: &dyn BackendFactory, settings: &GraphicsSettings) -> RenderResult<()> {
        if let Some(active) = self.backend_type() {
            if active == settings.backend {
                log::warn!("{} backend is already initialized", active);
                return Ok(());
            }
            log::error!("Refusing to switch from the {} backend to {}", active, settings.backend);
            return Err(RenderError::BackendMismatch {
                active,
                requested: settings.backend,
            });
        }
        settings.validate()?;

        let mut backend = backend::create_backend(settings.backend, factory)?;
        if let Err(e) = backend.initialize(settings) {
            log::error!("Failed to initialize the {} backend: {}", settings.backend, e);
            backend.shutdown();
            return Err(e);
        }

        let mut settings = settings.clone();
        settings.shadow_map_resolution = clamp_shadow_map(settings.shadow_map_resolution, backend.limits().max_texture_size);

        self.best = BestFormats::compute(backend.format_matrix());
        for texture_type in TextureType::ALL {
            log::debug!(
                "Best 2D format for {:?}: {:?}",
                texture_type,
                self.best.best(FormatTarget::Texture2D, texture_type)
            );
        }
        #[cfg(feature = "ktx2")]
        log::info!("KTX2 container support enabled");

        self.overrides.load(self.assets.as_ref(), &self.override_path);
        self.settings = settings;
        self.frame = 0;
        self.backend = Some(backend);
        log::info!("Graphics context initialized with the {} backend", self.settings.backend);
        Ok(())
    }

    /// Whether a backend is active
    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    /// Shut down and drop the backend, clearing the override table
    pub fn shutdown(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            return;
        };
        #[cfg(debug_assertions)]
        {
            if !self.live_textures.is_empty() {
                log::warn!("{} texture(s) still alive at shutdown", self.live_textures.len());
            }
            debug_assert!(self.live_textures.is_empty(), "textures leaked past context shutdown");
            self.live_textures.clear();
        }
        backend.shutdown();
        self.overrides.clear();
        self.best = BestFormats::default();
        self.bound_primitive = None;
        log::info!("Graphics context shut down");
    }

    /// Active backend type
    pub fn backend_type(&self) -> Option<BackendType> {
        self.backend.as_ref().map(|b| b.backend_type())
    }

    /// Active backend
    pub fn backend(&self) -> RenderResult<&dyn Backend> {
        self.backend.as_deref().ok_or(RenderError::NotInitialized)
    }

    /// Active backend, mutably
    pub fn backend_mut(&mut self) -> RenderResult<&mut dyn Backend> {
        match self.backend.as_mut() {
            Some(backend) => Ok(backend.as_mut()),
            None => Err(RenderError::NotInitialized),
        }
    }

    /// Asset source used for textures, shaders and overrides
    pub fn assets(&self) -> &dyn AssetSource {
        self.assets.as_ref()
    }

    /// Current override table
    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Reload the override file; skipped when it resolves to the same directory
    pub fn reload_overrides(&mut self) -> bool {
        self.overrides.load(self.assets.as_ref(), &self.override_path)
    }

    /// Best formats computed at initialization
    pub fn best_formats(&self) -> &BestFormats {
        &self.best
    }

    /// Usage mask of a format on the active backend
    pub fn format_usage(&self, target: FormatTarget, format: PixelFormat) -> PixelFormatUsage {
        self.backend
            .as_ref()
            .map_or(PixelFormatUsage::empty(), |b| b.format_matrix().usage(target, format))
    }

    /// Preferred real-time compressed format for a texture role
    pub fn best_compressed_format(&self, target: FormatTarget, texture_type: TextureType) -> Option<PixelFormat> {
        self.best.best(target, texture_type)
    }

    /// Header prepended to GLSL sources for `stage`
    pub fn shader_version_header(&self, stage: ShaderStage) -> RenderResult<String> {
        Ok(self.backend()?.shader_header(stage))
    }

    /// Frames completed since initialization
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Shadow map edge after clamping to the backend's limits
    pub fn shadow_map_resolution(&self) -> u32 {
        self.settings.shadow_map_resolution
    }

    /// LOD bias patched into fragment shaders
    pub fn mip_lod_bias(&self) -> Option<f32> {
        self.settings.mip_lod_bias
    }

    /// Settings the backend was initialized with
    pub fn settings(&self) -> &GraphicsSettings {
        &self.settings
    }

    fn loader_env(&mut self) -> RenderResult<LoaderEnv<'_>> {
        let backend = self.backend.as_deref_mut().ok_or(RenderError::NotInitialized)?;
        Ok(LoaderEnv {
            backend,
            assets: self.assets.as_ref(),
            best: &self.best,
            overrides: &self.overrides,
        })
    }

    /// Load a 2D texture through the full pipeline
    pub fn load_texture(&mut self, name: &str, options: &TextureLoadOptions) -> RenderResult<Texture> {
        let mut env = self.loader_env()?;
        let texture = texture::load_texture(&mut env, name, options)?;
        #[cfg(debug_assertions)]
        self.live_textures.insert(texture.id);
        Ok(texture)
    }

    /// Load `filenames` as one texture array
    ///
    /// `generator(width, height)` supplies a layer for every file that fails
    /// to load.
    pub fn load_texture_array<F>(
        &mut self,
        filenames: &[&str],
        texture_type: TextureType,
        max_width: Option<u32>,
        max_height: Option<u32>,
        mut generator: F,
    ) -> RenderResult<TextureArray>
    where
        F: FnMut(u32, u32) -> ImageData,
    {
        let mut env = self.loader_env()?;
        let array = texture::load_texture_array(&mut env, filenames, texture_type, max_width, max_height, &mut generator)?;
        #[cfg(debug_assertions)]
        self.live_textures.insert(array.id);
        Ok(array)
    }

    fn release_texture(&mut self, id: TextureId) {
        #[cfg(debug_assertions)]
        self.live_textures.remove(&id);
        match self.backend.as_mut() {
            Some(backend) => backend.destroy_texture(id),
            None => log::warn!("Texture {:?} destroyed after shutdown", id),
        }
    }

    /// Free a texture
    pub fn destroy_texture(&mut self, texture: Texture) {
        self.release_texture(texture.id);
    }

    /// Free a texture array
    pub fn destroy_texture_array(&mut self, array: TextureArray) {
        self.release_texture(array.id);
    }

    /// Create an empty buffer
    pub fn create_buffer(&mut self, usage: BufferUsage, hint: BufferStorageHint) -> RenderResult<Buffer> {
        let id = self.backend_mut()?.create_buffer(usage, hint)?;
        Ok(Buffer::new(id, usage, hint))
    }

    /// Replace a buffer's contents
    pub fn upload_buffer(&mut self, buffer: &mut Buffer, data: &[u8]) -> RenderResult<()> {
        let frame = self.frame;
        let backend = self.backend_mut()?;
        buffer.check_upload(frame)?;
        backend.upload_buffer(buffer.id, data)?;
        buffer.stamp_upload(frame);
        buffer.set_size(data.len());
        Ok(())
    }

    /// Overwrite part of a buffer
    pub fn update_buffer(&mut self, buffer: &mut Buffer, offset: usize, data: &[u8]) -> RenderResult<()> {
        let frame = self.frame;
        let backend = self.backend_mut()?;
        buffer.check_range(offset, data.len())?;
        buffer.check_upload(frame)?;
        backend.update_buffer(buffer.id, offset, data)?;
        buffer.stamp_upload(frame);
        Ok(())
    }

    /// Free a buffer
    pub fn destroy_buffer(&mut self, buffer: Buffer) {
        if let Some(backend) = self.backend.as_mut() {
            backend.destroy_buffer(buffer.id);
        }
    }

    /// Start a frame
    pub fn begin_frame(&mut self) -> RenderResult<()> {
        self.backend_mut()?.begin_frame()
    }

    /// Finish a frame and advance the frame counter
    pub fn end_frame(&mut self) -> RenderResult<()> {
        self.backend_mut()?.end_frame()?;
        self.frame += 1;
        self.bound_primitive = None;
        Ok(())
    }

    /// Build the pipeline for a shader mode
    ///
    /// Failures are logged and yield an unbuilt pipeline; check
    /// [`Pipeline::is_built`] before drawing with it.
    pub fn create_pipeline(&mut self, mode: ShaderMode, state: PipelineStateInfo) -> RenderResult<Pipeline> {
        let bias = self.settings.mip_lod_bias;
        let backend = self.backend.as_deref_mut().ok_or(RenderError::NotInitialized)?;
        Ok(PipelineBuilder::new(backend, self.assets.as_ref())
            .with_mip_lod_bias(bias)
            .build(mode, state))
    }

    /// Free a pipeline's program
    pub fn destroy_pipeline(&mut self, pipeline: &mut Pipeline) {
        if let Some(backend) = self.backend.as_mut() {
            pipeline.destroy(backend.as_mut());
        }
    }

    /// Set every uniform of a pipeline from a typed block
    pub fn set_uniforms(&mut self, pipeline: &Pipeline, block: &UniformBlock) -> RenderResult<()> {
        pipeline.apply_uniforms(self.backend_mut()?, block)
    }

    /// Set every uniform of a pipeline from an opaque blob of `kind`
    pub fn set_uniform_blob(&mut self, pipeline: &Pipeline, kind: UniformBlockKind, bytes: &[u8]) -> RenderResult<()> {
        let block = UniformBlock::from_bytes(kind, bytes)?;
        self.set_uniforms(pipeline, &block)
    }

    /// Make a pipeline current
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) -> RenderResult<()> {
        let program = pipeline.require_program()?;
        self.backend_mut()?.bind_pipeline(program, pipeline.state())?;
        self.bound_primitive = Some(pipeline.state().primitive);
        Ok(())
    }

    /// Bind vertex buffers with byte offsets starting at `first_binding`
    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(&Buffer, usize)]) -> RenderResult<()> {
        let ids: Vec<_> = buffers.iter().map(|&(b, offset)| (b.id, offset)).collect();
        self.backend_mut()?.bind_vertex_buffers(first_binding, &ids)
    }

    /// Bind an index buffer
    pub fn bind_index_buffer(&mut self, buffer: &Buffer, index_type: IndexType) -> RenderResult<()> {
        if buffer.usage() != BufferUsage::Index {
            return Err(RenderError::InvalidOperation(format!("buffer {} is not an index buffer", buffer.id.0)));
        }
        self.backend_mut()?.bind_index_buffer(buffer.id, index_type)
    }

    /// Bind a texture or texture array to a sampler unit
    pub fn bind_texture(&mut self, unit: u32, texture: TextureId) -> RenderResult<()> {
        self.backend_mut()?.bind_texture(unit, texture)
    }

    fn require_primitive(&self) -> RenderResult<Primitive> {
        self.bound_primitive
            .ok_or_else(|| RenderError::InvalidOperation("draw without a bound pipeline".to_string()))
    }

    /// Draw `count` vertices starting at `first`
    pub fn draw(&mut self, first: u32, count: u32) -> RenderResult<()> {
        let primitive = self.require_primitive()?;
        self.backend_mut()?.draw(primitive, first, count)
    }

    /// Draw `count` indices starting at index `first`
    pub fn draw_indexed(&mut self, first: u32, count: u32) -> RenderResult<()> {
        let primitive = self.require_primitive()?;
        self.backend_mut()?.draw_indexed(primitive, first, count)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.shutdown();
        }
    }
}

/// Largest power of two not above `requested` or `max_texture_size`
fn clamp_shadow_map(requested: u32, max_texture_size: u32) -> u32 {
    let limit = requested.min(max_texture_size).max(1);
    let clamped = 1 << (31 - limit.leading_zeros());
    if clamped != requested {
        log::warn!(
            "Shadow map resolution {} adjusted to {} (max texture size {})",
            requested,
            clamped,
            max_texture_size
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::backend::{BackendLimits, HeadlessFactory, NullBackend, NullCapabilities};
    use crate::pipeline::uniforms::RectUniforms;

    const RECT_VS: &str = "in vec4 vertex;\nuniform mat4 transformationMatrix;\n\
                           void main() { gl_Position = transformationMatrix * vertex; }\n";
    const RECT_FS: &str = "uniform vec4 color;\nout vec4 FragColor;\nvoid main() { FragColor = color; }\n";

    fn context() -> Context {
        let assets = MemorySource::new("mem")
            .with_file("shaders/rect.vert", RECT_VS)
            .with_file("shaders/rect.frag", RECT_FS);
        Context::new(Box::new(assets))
    }

    fn null_settings() -> GraphicsSettings {
        GraphicsSettings::new(BackendType::Null)
    }

    #[test]
    fn test_reinitialize_same_backend_is_noop() {
        let mut ctx = context();
        let factory = HeadlessFactory::new("test");
        ctx.initialize(&factory, &null_settings()).unwrap();
        ctx.initialize(&factory, &null_settings()).unwrap();
        assert_eq!(ctx.backend_type(), Some(BackendType::Null));
    }

    #[test]
    fn test_reinitialize_other_backend_fails() {
        let mut ctx = context();
        let factory = HeadlessFactory::new("test");
        ctx.initialize(&factory, &null_settings()).unwrap();
        let err = ctx
            .initialize(&factory, &GraphicsSettings::new(BackendType::Vulkan))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::BackendMismatch {
                active: BackendType::Null,
                requested: BackendType::Vulkan
            }
        ));
        assert_eq!(ctx.backend_type(), Some(BackendType::Null));
    }

    #[test]
    fn test_failed_initialize_leaves_context_uninitialized() {
        let mut ctx = context();
        // the headless factory has no GL context to hand out
        let result = ctx.initialize(&HeadlessFactory::new("test"), &GraphicsSettings::new(BackendType::OpenGl));
        assert!(result.is_err());
        assert!(!ctx.is_initialized());
        assert!(matches!(ctx.begin_frame(), Err(RenderError::NotInitialized)));
    }

    #[test]
    fn test_shadow_map_clamped_to_limits() {
        let mut ctx = context();
        let limits = BackendLimits {
            max_texture_size: 2048,
            ..BackendLimits::default()
        };
        let factory = HeadlessFactory::new("test").with_null_capabilities(NullCapabilities::default().with_limits(limits));
        ctx.initialize(&factory, &null_settings().with_shadow_map_resolution(3000))
            .unwrap();
        assert_eq!(ctx.shadow_map_resolution(), 2048);
        assert_eq!(clamp_shadow_map(1000, 4096), 512);
        assert_eq!(clamp_shadow_map(1024, 4096), 1024);
    }

    #[test]
    fn test_buffer_upload_once_per_frame() {
        let mut ctx = context();
        ctx.initialize(&HeadlessFactory::new("test"), &null_settings()).unwrap();
        let mut buffer = ctx.create_buffer(BufferUsage::Vertex, BufferStorageHint::Stream).unwrap();
        ctx.upload_buffer(&mut buffer, &[1, 2, 3, 4]).unwrap();
        let second = ctx.update_buffer(&mut buffer, 0, &[9]);
        if cfg!(debug_assertions) {
            assert!(matches!(second, Err(RenderError::BufferUpdatedTwice { .. })));
        }
        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.update_buffer(&mut buffer, 2, &[7, 7]).unwrap();
        assert!(ctx.update_buffer(&mut buffer, 3, &[0, 0]).is_err());
        let id = buffer.id();
        let null = ctx.backend().unwrap().as_any().downcast_ref::<NullBackend>().unwrap();
        assert_eq!(null.buffer_data(id).unwrap()[2..], [7, 7]);
        ctx.destroy_buffer(buffer);
    }

    #[test]
    fn test_failed_upload_keeps_frame_slot() {
        let mut ctx = context();
        ctx.initialize(&HeadlessFactory::new("test"), &null_settings()).unwrap();
        let mut buffer = ctx.create_buffer(BufferUsage::Vertex, BufferStorageHint::Dynamic).unwrap();
        ctx.backend_mut().unwrap().destroy_buffer(buffer.id());

        assert!(ctx.upload_buffer(&mut buffer, &[1, 2, 3, 4]).is_err());
        assert_eq!(buffer.last_upload_frame(), None);
        assert_eq!(buffer.size(), 0);

        buffer.id = ctx
            .backend_mut()
            .unwrap()
            .create_buffer(BufferUsage::Vertex, BufferStorageHint::Dynamic)
            .unwrap();
        ctx.upload_buffer(&mut buffer, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.last_upload_frame(), Some(0));
        ctx.destroy_buffer(buffer);
    }

    #[test]
    fn test_pipeline_draw_through_context() {
        let mut ctx = context();
        ctx.initialize(&HeadlessFactory::new("test"), &null_settings()).unwrap();
        let pipeline = ctx
            .create_pipeline(ShaderMode::Rect, PipelineStateInfo::overlay(Vec::new()))
            .unwrap();
        assert!(pipeline.is_built());

        let block = UniformBlock::Rect(RectUniforms::new(&nalgebra::Matrix4::identity(), [1.0, 0.0, 0.0, 1.0]));
        ctx.set_uniform_blob(&pipeline, UniformBlockKind::Rect, block.as_bytes())
            .unwrap();
        assert!(ctx
            .set_uniform_blob(&pipeline, UniformBlockKind::Text, &[0u8; 4])
            .is_err());

        ctx.begin_frame().unwrap();
        assert!(ctx.draw(0, 4).is_err());
        ctx.bind_pipeline(&pipeline).unwrap();
        ctx.draw(0, 4).unwrap();
        ctx.end_frame().unwrap();

        let null = ctx.backend().unwrap().as_any().downcast_ref::<NullBackend>().unwrap();
        assert_eq!(null.draws().len(), 1);
        assert_eq!(null.uniform_writes().len(), 2);
        assert_eq!(ctx.frame(), 1);
    }

    #[test]
    fn test_missing_shader_yields_unbuilt_pipeline() {
        let mut ctx = context();
        ctx.initialize(&HeadlessFactory::new("test"), &null_settings()).unwrap();
        let pipeline = ctx
            .create_pipeline(ShaderMode::Skybox, PipelineStateInfo::new(Vec::new()))
            .unwrap();
        assert!(!pipeline.is_built());
        assert!(ctx.bind_pipeline(&pipeline).is_err());
    }

    #[test]
    fn test_shutdown_clears_state() {
        let mut ctx = context();
        ctx.initialize(&HeadlessFactory::new("test"), &null_settings()).unwrap();
        ctx.shutdown();
        assert!(!ctx.is_initialized());
        assert!(ctx.shader_version_header(ShaderStage::Vertex).is_err());
        // a different backend may be chosen after shutdown
        let mut capabilities = NullCapabilities::default();
        capabilities.fragment_high_precision = false;
        ctx.initialize(
            &HeadlessFactory::new("test").with_null_capabilities(capabilities),
            &null_settings(),
        )
        .unwrap();
        assert!(!ctx.backend().unwrap().fragment_high_precision());
    }
}
