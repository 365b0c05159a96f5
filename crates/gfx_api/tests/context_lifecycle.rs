//! Context lifecycle, built-in shaders, buffers and draws

mod common;

use std::fs;

use common::{null_backend, png_rgba};
use gfx_api::backend::ShaderStage;
use gfx_api::config::AssetSettings;
use gfx_api::pipeline::{IndexType, Primitive, VertexBufferLayout, VertexFormat};
use gfx_api::prelude::*;

const RESOURCES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../resources");

fn builtin_shaders(capabilities: NullCapabilities) -> Context {
    let mut context = Context::new(Box::new(DirectorySource::new(&[RESOURCES])));
    let factory = HeadlessFactory::new("integration").with_null_capabilities(capabilities);
    context
        .initialize(&factory, &GraphicsSettings::new(BackendType::Null).with_mip_lod_bias(-0.5))
        .unwrap();
    context
}

#[test]
fn test_directory_backed_context() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("texpages")).unwrap();
    fs::write(dir.path().join("texpages/grass.png"), png_rgba(32, 32, [40, 160, 40, 255])).unwrap();
    fs::write(dir.path().join("overrides.txt"), "texpages/grass.png=0\n").unwrap();

    let settings = ContextSettings {
        graphics: GraphicsSettings::new(BackendType::Null),
        assets: AssetSettings {
            roots: vec![dir.path().to_string_lossy().into_owned()],
            compression_overrides: "overrides.txt".to_string(),
        },
        ..ContextSettings::new("integration")
    };
    settings.validate().unwrap();

    let capabilities = NullCapabilities::default().with_compressed(&[PixelFormat::Bc3]);
    let factory = HeadlessFactory::new("integration").with_null_capabilities(capabilities);
    let mut context = Context::from_settings(&settings);
    context.initialize(&factory, &settings.graphics).unwrap();
    assert_eq!(context.overrides().len(), 1);

    let texture = context
        .load_texture("texpages/grass.png", &TextureLoadOptions::new(TextureType::GameTexture))
        .unwrap();
    assert_eq!(texture.format(), PixelFormat::Rgba8);
    assert_eq!(texture.mip_count(), 6);

    context.destroy_texture(texture);
    context.shutdown();
    assert!(context.overrides().is_empty());
}

#[test]
fn test_settings_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graphics.toml");
    let path = path.to_string_lossy();

    let mut settings = ContextSettings::new("round-trip");
    settings.graphics = GraphicsSettings::new(BackendType::Vulkan)
        .with_antialiasing(4)
        .with_swap_interval(SwapIntervalMode::AdaptiveVsync)
        .with_shadow_map_resolution(2048);
    settings.save_to_file(&path).unwrap();

    let loaded = ContextSettings::load_from_file(&path).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_every_builtin_shader_mode_builds() {
    let mut context = builtin_shaders(NullCapabilities::default());
    for mode in ShaderMode::ALL {
        let mut pipeline = context.create_pipeline(mode, PipelineStateInfo::new(Vec::new())).unwrap();
        assert!(pipeline.is_built(), "{mode:?}");
        assert_eq!(pipeline.uniform_locations().len(), mode.info().uniforms.len());
        assert!(
            pipeline.uniform_locations().iter().all(Option::is_some),
            "{mode:?} has an unresolved uniform"
        );
        assert!(pipeline.duplicate_fragment_locations().is_none());
        context.destroy_pipeline(&mut pipeline);
        assert!(!pipeline.is_built());
    }
}

#[test]
fn test_low_precision_fragment_uniforms_are_duplicated() {
    let mut context = builtin_shaders(NullCapabilities::default().with_fragment_high_precision(false));
    let pipeline = context
        .create_pipeline(ShaderMode::Terrain, PipelineStateInfo::new(Vec::new()))
        .unwrap();
    assert!(pipeline.is_built());

    let duplicates = pipeline.duplicate_fragment_locations().unwrap();
    let fog_slot = ShaderMode::Terrain
        .info()
        .uniforms
        .iter()
        .position(|&name| name == "fogEnabled")
        .unwrap();
    assert!(duplicates[fog_slot].is_some());
    assert_eq!(duplicates.iter().filter(|d| d.is_some()).count(), 1);

    let block = UniformBlock::from_bytes(UniformBlockKind::Terrain, &vec![0u8; UniformBlockKind::Terrain.byte_size()]).unwrap();
    context.set_uniforms(&pipeline, &block).unwrap();
    assert_eq!(null_backend(&context).uniform_writes().len(), 11);
}

#[test]
fn test_decals_share_terrain_block() {
    let mut context = builtin_shaders(NullCapabilities::default());
    let pipeline = context
        .create_pipeline(ShaderMode::Decals, PipelineStateInfo::new(Vec::new()))
        .unwrap();
    let terrain = UniformBlock::from_bytes(UniformBlockKind::Terrain, &vec![0u8; UniformBlockKind::Terrain.byte_size()]).unwrap();
    context.set_uniforms(&pipeline, &terrain).unwrap();

    let skybox = UniformBlock::from_bytes(UniformBlockKind::Skybox, &vec![0u8; UniformBlockKind::Skybox.byte_size()]).unwrap();
    assert!(matches!(
        context.set_uniforms(&pipeline, &skybox),
        Err(RenderError::UniformBlockMismatch { .. })
    ));
}

#[test]
fn test_indexed_draw_reads_bound_indices() {
    let mut context = builtin_shaders(NullCapabilities::default());
    let layout = VertexBufferLayout::packed(0, &[VertexFormat::Float4]);
    let pipeline = context
        .create_pipeline(ShaderMode::Rect, PipelineStateInfo::overlay(vec![layout]))
        .unwrap();

    let mut vertices = context.create_buffer(BufferUsage::Vertex, BufferStorageHint::Static).unwrap();
    context.upload_buffer(&mut vertices, &[0u8; 64]).unwrap();
    let mut indices = context.create_buffer(BufferUsage::Index, BufferStorageHint::Static).unwrap();
    let index_data: Vec<u8> = [0u16, 1, 2, 2, 1, 3].iter().flat_map(|i| i.to_le_bytes()).collect();
    context.upload_buffer(&mut indices, &index_data).unwrap();
    assert_eq!(indices.size(), 12);

    assert!(context.bind_index_buffer(&vertices, IndexType::U16).is_err());

    context.begin_frame().unwrap();
    context.bind_pipeline(&pipeline).unwrap();
    context.bind_vertex_buffers(0, &[(&vertices, 0)]).unwrap();
    context.bind_index_buffer(&indices, IndexType::U16).unwrap();
    context.draw_indexed(0, 6).unwrap();
    assert!(context.draw_indexed(3, 6).is_err());
    context.end_frame().unwrap();

    let draws = null_backend(&context).draws();
    assert_eq!(draws.len(), 1);
    assert!(draws[0].indexed);
    assert_eq!(draws[0].primitive, Primitive::TriangleStrip);

    context.destroy_buffer(vertices);
    context.destroy_buffer(indices);
}

#[test]
fn test_context_queries() {
    let mut context = builtin_shaders(NullCapabilities::default().with_compressed(&[PixelFormat::Bc4]));
    assert_eq!(context.backend_type(), Some(BackendType::Null));
    assert_eq!(context.mip_lod_bias(), Some(-0.5));
    assert_eq!(
        context.format_usage(FormatTarget::Texture2D, PixelFormat::D24S8),
        PixelFormatUsage::SAMPLED_IMAGE | PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT
    );
    assert_eq!(
        context.best_compressed_format(FormatTarget::Texture2DArray, TextureType::HeightMap),
        Some(PixelFormat::Bc4)
    );
    assert_eq!(context.best_compressed_format(FormatTarget::Texture2D, TextureType::UserInterface), None);
    assert!(context
        .shader_version_header(ShaderStage::Fragment)
        .unwrap()
        .starts_with("#version"));

    context.begin_frame().unwrap();
    context.end_frame().unwrap();
    assert_eq!(context.frame(), 1);

    context.shutdown();
    assert_eq!(context.backend_type(), None);
    assert!(context.format_usage(FormatTarget::Texture2D, PixelFormat::Rgba8).is_empty());
}
