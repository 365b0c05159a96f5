//! Pipeline state object construction
//!
//! Runs the fixed build sequence for one shader mode:
//!
//! 1. read the vertex source and compile it
//! 2. read the fragment source, rename uniforms it shares with the vertex
//!    stage when fragment shaders lack high precision, patch the LOD bias
//! 3. compile the fragment stage and link with attribute locations bound
//! 4. fetch uniform locations (and duplicate fragment locations)
//! 5. verify the bound attribute locations
//!
//! SPIR-V backends read `<path>.spv` modules instead and skip the textual
//! patches.

use crate::assets::AssetSource;
use crate::backend::{Backend, ProgramId, ShaderLanguage, ShaderStage};
use crate::error::RenderResult;

use super::glsl;
use super::{Pipeline, PipelineStateInfo, ShaderMode};

/// Builds [`Pipeline`]s against one backend and asset source
pub struct PipelineBuilder<'a> {
    backend: &'a mut dyn Backend,
    assets: &'a dyn AssetSource,
    mip_lod_bias: Option<f32>,
}

struct Sources {
    vertex: Vec<u8>,
    fragment: Vec<u8>,
    duplicates: Vec<String>,
}

impl<'a> PipelineBuilder<'a> {
    /// Create a builder
    pub fn new(backend: &'a mut dyn Backend, assets: &'a dyn AssetSource) -> Self {
        Self {
            backend,
            assets,
            mip_lod_bias: None,
        }
    }

    /// Patch `MIP_LOD_BIAS` in fragment sources
    pub fn with_mip_lod_bias(mut self, bias: Option<f32>) -> Self {
        self.mip_lod_bias = bias;
        self
    }

    /// Build a pipeline, logging failures
    ///
    /// The returned pipeline is unbuilt when any step failed.
    pub fn build(&mut self, mode: ShaderMode, state: PipelineStateInfo) -> Pipeline {
        match self.try_build(mode, state.clone()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("Failed to build {}: {}", mode.info().friendly_name, e);
                Pipeline::unbuilt(mode, state)
            }
        }
    }

    /// Build a pipeline, returning the first failure
    pub fn try_build(&mut self, mode: ShaderMode, state: PipelineStateInfo) -> RenderResult<Pipeline> {
        let info = mode.info();
        log::debug!("Building {}", info.friendly_name);

        let sources = match self.backend.shader_language() {
            ShaderLanguage::Glsl => self.glsl_sources(mode)?,
            ShaderLanguage::Spirv => self.spirv_sources(mode)?,
        };

        let vertex = self
            .backend
            .compile_shader(ShaderStage::Vertex, info.vertex_path, &sources.vertex)?;
        let fragment = match self
            .backend
            .compile_shader(ShaderStage::Fragment, info.fragment_path, &sources.fragment)
        {
            Ok(id) => id,
            Err(e) => {
                self.backend.delete_shader(vertex);
                return Err(e);
            }
        };

        let linked = self
            .backend
            .link_program(info.friendly_name, vertex, fragment, info.attributes);
        // Linked programs keep their own copy of the stages
        self.backend.delete_shader(vertex);
        self.backend.delete_shader(fragment);
        let program = linked?;

        let uniform_locations: Vec<Option<i32>> = info
            .uniforms
            .iter()
            .map(|name| self.backend.uniform_location(program, name))
            .collect();

        let duplicate_fragment_locations = (!sources.duplicates.is_empty()).then(|| {
            info.uniforms
                .iter()
                .map(|name| {
                    if sources.duplicates.iter().any(|d| d == name) {
                        let renamed = format!("{}{}", name, glsl::FRAGMENT_DUPLICATE_SUFFIX);
                        self.backend.uniform_location(program, &renamed)
                    } else {
                        None
                    }
                })
                .collect()
        });

        self.verify_attributes(mode, program);

        Ok(Pipeline {
            mode,
            program: Some(program),
            state,
            uniform_locations,
            duplicate_fragment_locations,
        })
    }

    fn read_text(&self, path: &str) -> RenderResult<String> {
        Ok(self.assets.read_to_string(path)?)
    }

    fn glsl_sources(&self, mode: ShaderMode) -> RenderResult<Sources> {
        let info = mode.info();
        let vertex_body = self.read_text(info.vertex_path)?;
        let mut fragment_body = self.read_text(info.fragment_path)?;

        let duplicates = if self.backend.fragment_high_precision() {
            Vec::new()
        } else {
            glsl::duplicate_uniforms(&vertex_body, &fragment_body)
        };
        if !duplicates.is_empty() {
            log::debug!(
                "{}: renaming fragment uniforms {:?} to avoid precision mismatch",
                info.friendly_name,
                duplicates
            );
            fragment_body = glsl::rename_identifiers(&fragment_body, &duplicates);
        }
        if let Some(bias) = self.mip_lod_bias {
            fragment_body = glsl::patch_mip_lod_bias(&fragment_body, bias);
        }

        let vertex = format!("{}{}", self.backend.shader_header(ShaderStage::Vertex), vertex_body);
        let fragment = format!("{}{}", self.backend.shader_header(ShaderStage::Fragment), fragment_body);
        Ok(Sources {
            vertex: vertex.into_bytes(),
            fragment: fragment.into_bytes(),
            duplicates,
        })
    }

    fn spirv_sources(&self, mode: ShaderMode) -> RenderResult<Sources> {
        let info = mode.info();
        let vertex = self.assets.read(&format!("{}.spv", info.vertex_path))?;
        let fragment = self.assets.read(&format!("{}.spv", info.fragment_path))?;
        Ok(Sources {
            vertex,
            fragment,
            duplicates: Vec::new(),
        })
    }

    fn verify_attributes(&self, mode: ShaderMode, program: ProgramId) {
        let info = mode.info();
        for &(location, name) in info.attributes {
            match self.backend.attribute_location(program, name) {
                Some(actual) if actual != location as i32 => log::warn!(
                    "{}: attribute '{}' bound to {} but linked at {}",
                    info.friendly_name,
                    name,
                    location,
                    actual
                ),
                Some(_) => {}
                None => log::debug!("{}: attribute '{}' is not active", info.friendly_name, name),
            }
        }
    }
}
