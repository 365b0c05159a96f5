//! Pipeline state objects
//!
//! A [`Pipeline`] pairs a linked shader program for one [`ShaderMode`] with
//! the fixed-function state it is drawn with, and carries the resolved
//! uniform locations used by the typed uniform dispatch in [`uniforms`].

mod builder;
pub mod glsl;
mod shader_modes;
pub mod uniforms;

pub use builder::PipelineBuilder;
pub use shader_modes::{ShaderMode, ShaderModeInfo};
pub use uniforms::{UniformBlock, UniformBlockKind, UniformValue};

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, ProgramId};
use crate::error::{RenderError, RenderResult};

/// Color blending applied to fragment output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    /// Blending disabled
    Opaque,
    /// `src * a + dst * (1 - a)`
    Alpha,
    /// `src * a + dst`
    Additive,
    /// `src + dst * (1 - a)`
    Premultiplied,
    /// `src * dst`
    Multiplicative,
}

/// Depth test and write behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthMode {
    /// No test, no write
    Disabled,
    /// Test with less-or-equal, no write
    ReadOnly,
    /// Test with less-or-equal and write
    ReadWrite,
}

/// Stencil behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StencilMode {
    /// Stencil disabled
    Disabled,
    /// Always pass, replace stencil with `reference`
    Write {
        /// Value written
        reference: u8,
    },
    /// Pass only where stencil equals `reference`
    Equal {
        /// Value compared against
        reference: u8,
    },
}

/// Face culling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    Back,
}

/// Primitive assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    /// Independent triangles
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Independent lines
    Lines,
    /// Line strip
    LineStrip,
    /// Points
    Points,
}

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexType {
    /// Size of one index in bytes
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Data type of one vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexFormat {
    /// One f32
    Float,
    /// Two f32
    Float2,
    /// Three f32
    Float3,
    /// Four f32
    Float4,
    /// Four u8 normalized to [0, 1]
    UByte4Norm,
}

impl VertexFormat {
    /// Component count
    pub fn components(self) -> u32 {
        match self {
            VertexFormat::Float => 1,
            VertexFormat::Float2 => 2,
            VertexFormat::Float3 => 3,
            VertexFormat::Float4 | VertexFormat::UByte4Norm => 4,
        }
    }

    /// Size in bytes
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::UByte4Norm => 4,
            other => other.components() * 4,
        }
    }
}

/// One attribute inside a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexAttribute {
    /// Shader attribute location
    pub location: u32,
    /// Data type
    pub format: VertexFormat,
    /// Byte offset inside one vertex
    pub offset: u32,
}

/// Layout of one vertex buffer binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexBufferLayout {
    /// Bytes between consecutive vertices
    pub stride: u32,
    /// Attributes read from this binding
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    /// Tightly packed layout with consecutive locations starting at `first_location`
    pub fn packed(first_location: u32, formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(i, &format)| {
                let attribute = VertexAttribute {
                    location: first_location + i as u32,
                    format,
                    offset,
                };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            stride: offset,
            attributes,
        }
    }
}

/// Fixed-function state and vertex input of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineStateInfo {
    /// Color blending
    pub blend: BlendMode,
    /// Depth test/write
    pub depth: DepthMode,
    /// Stencil test
    pub stencil: StencilMode,
    /// Face culling
    pub cull: CullMode,
    /// Primitive assembly
    pub primitive: Primitive,
    /// Vertex buffer bindings, indexed by binding number
    pub vertex_buffers: Vec<VertexBufferLayout>,
}

impl PipelineStateInfo {
    /// Opaque triangles with depth read/write and back-face culling
    pub fn new(vertex_buffers: Vec<VertexBufferLayout>) -> Self {
        Self {
            blend: BlendMode::Opaque,
            depth: DepthMode::ReadWrite,
            stencil: StencilMode::Disabled,
            cull: CullMode::Back,
            primitive: Primitive::Triangles,
            vertex_buffers,
        }
    }

    /// Set the blend mode
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Set the depth mode
    pub fn with_depth(mut self, depth: DepthMode) -> Self {
        self.depth = depth;
        self
    }

    /// Set the stencil mode
    pub fn with_stencil(mut self, stencil: StencilMode) -> Self {
        self.stencil = stencil;
        self
    }

    /// Set the cull mode
    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    /// Set the primitive
    pub fn with_primitive(mut self, primitive: Primitive) -> Self {
        self.primitive = primitive;
        self
    }

    /// Default state for 2D overlay drawing: alpha blended, no depth, no culling
    pub fn overlay(vertex_buffers: Vec<VertexBufferLayout>) -> Self {
        Self::new(vertex_buffers)
            .with_blend(BlendMode::Alpha)
            .with_depth(DepthMode::Disabled)
            .with_cull(CullMode::None)
            .with_primitive(Primitive::TriangleStrip)
    }
}

/// Built pipeline state object
///
/// A failed build still yields a `Pipeline`; it has no program and
/// [`Pipeline::is_built`] returns false. Binding or setting uniforms on it
/// returns [`RenderError::InvalidOperation`].
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) mode: ShaderMode,
    pub(crate) program: Option<ProgramId>,
    pub(crate) state: PipelineStateInfo,
    pub(crate) uniform_locations: Vec<Option<i32>>,
    pub(crate) duplicate_fragment_locations: Option<Vec<Option<i32>>>,
}

impl Pipeline {
    pub(crate) fn unbuilt(mode: ShaderMode, state: PipelineStateInfo) -> Self {
        Self {
            mode,
            program: None,
            state,
            uniform_locations: Vec::new(),
            duplicate_fragment_locations: None,
        }
    }

    /// Whether compilation and linking succeeded
    pub fn is_built(&self) -> bool {
        self.program.is_some()
    }

    /// Shader mode this pipeline was built for
    pub fn mode(&self) -> ShaderMode {
        self.mode
    }

    /// Linked program, if built
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Fixed-function state
    pub fn state(&self) -> &PipelineStateInfo {
        &self.state
    }

    /// Uniform locations in the mode's slot order
    pub fn uniform_locations(&self) -> &[Option<i32>] {
        &self.uniform_locations
    }

    /// Second locations for fragment uniforms renamed to avoid precision clashes
    pub fn duplicate_fragment_locations(&self) -> Option<&[Option<i32>]> {
        self.duplicate_fragment_locations.as_deref()
    }

    pub(crate) fn require_program(&self) -> RenderResult<ProgramId> {
        self.program.ok_or_else(|| {
            RenderError::InvalidOperation(format!(
                "Pipeline '{}' failed to build and cannot be used",
                self.mode.info().friendly_name
            ))
        })
    }

    /// Unpack `block` into the pipeline's uniform slots
    ///
    /// Each slot value is written to its location and, when the fragment copy
    /// of that uniform was renamed, to the duplicate location as well.
    pub fn apply_uniforms(&self, backend: &mut dyn Backend, block: &UniformBlock) -> RenderResult<()> {
        let program = self.require_program()?;
        let expected = self.mode.info().block;
        if block.kind() != expected {
            return Err(RenderError::UniformBlockMismatch {
                expected: format!("{expected:?}"),
                found: format!("{:?}", block.kind()),
            });
        }

        for (slot, value) in block.slot_values().iter().enumerate() {
            if let Some(Some(location)) = self.uniform_locations.get(slot) {
                backend.set_uniform(program, *location, value)?;
            }
            if let Some(Some(location)) = self
                .duplicate_fragment_locations
                .as_ref()
                .and_then(|dups| dups.get(slot))
            {
                backend.set_uniform(program, *location, value)?;
            }
        }
        Ok(())
    }

    /// Free the program; the pipeline becomes unbuilt
    pub(crate) fn destroy(&mut self, backend: &mut dyn Backend) {
        if let Some(program) = self.program.take() {
            backend.delete_program(program);
        }
        self.uniform_locations.clear();
        self.duplicate_fragment_locations = None;
    }
}
