//! Typed uniform blocks
//!
//! Every shader mode accepts one uniform block kind. A block is a plain
//! `#[repr(C)]` struct that callers may also hand over as an opaque byte
//! blob; [`UniformBlock::from_bytes`] reinterprets the blob by kind and
//! [`UniformBlock::slot_values`] unpacks the fields in the mode's slot order:
//!
//! | Kind           | Slots |
//! |----------------|-------|
//! | `Rect`         | transformationMatrix, color |
//! | `TexturedRect` | transformationMatrix, tuv_offset, tuv_scale, color, theTexture |
//! | `Text`         | transformationMatrix, color, theTexture |
//! | `Line`         | from, to, color, ModelViewProjectionMatrix |
//! | `Terrain`      | ModelViewProjectionMatrix, paramx1, paramy1, fogColor, fogEnabled, fogEnd, fogStart, timeSec, tex, lightmap_tex |
//! | `Component`    | ModelViewProjectionMatrix, colour, teamcolour, fogColor, fogEnabled, fogEnd, fogStart, timeSec, Texture |
//! | `Skybox`       | posMatrix, color, fog_color, fog_enabled, theTexture |
//!
//! Matrices are column-major, as produced by `nalgebra`.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Column-major 4x4 matrix as stored in uniform blocks
pub type Mat4Data = [[f32; 4]; 4];

/// Convert a nalgebra matrix to block storage
pub fn mat4(m: &Matrix4<f32>) -> Mat4Data {
    (*m).into()
}

/// Single uniform value handed to a backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `int` or sampler unit
    Int(i32),
    /// `float`
    Float(f32),
    /// `vec2`
    Vec2([f32; 2]),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat4`, column-major
    Mat4(Mat4Data),
}

/// Logical kind of a uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformBlockKind {
    /// [`RectUniforms`]
    Rect,
    /// [`TexturedRectUniforms`]
    TexturedRect,
    /// [`TextUniforms`]
    Text,
    /// [`LineUniforms`]
    Line,
    /// [`TerrainUniforms`], shared by terrain and decals
    Terrain,
    /// [`ComponentUniforms`]
    Component,
    /// [`SkyboxUniforms`]
    Skybox,
}

impl UniformBlockKind {
    /// Number of slots the block fills
    pub fn slot_count(self) -> usize {
        match self {
            UniformBlockKind::Rect => 2,
            UniformBlockKind::TexturedRect | UniformBlockKind::Skybox => 5,
            UniformBlockKind::Text => 3,
            UniformBlockKind::Line => 4,
            UniformBlockKind::Terrain => 10,
            UniformBlockKind::Component => 9,
        }
    }

    /// Size of the block's byte representation
    pub fn byte_size(self) -> usize {
        match self {
            UniformBlockKind::Rect => std::mem::size_of::<RectUniforms>(),
            UniformBlockKind::TexturedRect => std::mem::size_of::<TexturedRectUniforms>(),
            UniformBlockKind::Text => std::mem::size_of::<TextUniforms>(),
            UniformBlockKind::Line => std::mem::size_of::<LineUniforms>(),
            UniformBlockKind::Terrain => std::mem::size_of::<TerrainUniforms>(),
            UniformBlockKind::Component => std::mem::size_of::<ComponentUniforms>(),
            UniformBlockKind::Skybox => std::mem::size_of::<SkyboxUniforms>(),
        }
    }
}

/// Solid rectangle
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectUniforms {
    /// Screen transform
    pub transformation_matrix: Mat4Data,
    /// RGBA color
    pub color: [f32; 4],
}

/// Textured rectangle
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturedRectUniforms {
    /// Screen transform
    pub transformation_matrix: Mat4Data,
    /// UV offset
    pub tuv_offset: [f32; 2],
    /// UV scale
    pub tuv_scale: [f32; 2],
    /// Tint color
    pub color: [f32; 4],
    /// Sampler unit
    pub texture: i32,
}

/// Text quads
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextUniforms {
    /// Screen transform
    pub transformation_matrix: Mat4Data,
    /// Text color
    pub color: [f32; 4],
    /// Sampler unit of the glyph atlas
    pub texture: i32,
}

/// Line segment
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineUniforms {
    /// Start point
    pub from: [f32; 2],
    /// End point
    pub to: [f32; 2],
    /// Line color
    pub color: [f32; 4],
    /// Projection
    pub model_view_projection: Mat4Data,
}

/// Terrain and decals
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainUniforms {
    /// Projection
    pub model_view_projection: Mat4Data,
    /// Texture coordinate generation plane for U
    pub paramx1: [f32; 4],
    /// Texture coordinate generation plane for V
    pub paramy1: [f32; 4],
    /// Fog color
    pub fog_color: [f32; 4],
    /// Nonzero enables fog
    pub fog_enabled: i32,
    /// Fog end distance
    pub fog_end: f32,
    /// Fog start distance
    pub fog_start: f32,
    /// Animation time in seconds
    pub time_sec: f32,
    /// Sampler unit of the ground texture
    pub tex: i32,
    /// Sampler unit of the lightmap
    pub lightmap_tex: i32,
}

/// Model component
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentUniforms {
    /// Projection
    pub model_view_projection: Mat4Data,
    /// Base color
    pub colour: [f32; 4],
    /// Team color
    pub teamcolour: [f32; 4],
    /// Fog color
    pub fog_color: [f32; 4],
    /// Nonzero enables fog
    pub fog_enabled: i32,
    /// Fog end distance
    pub fog_end: f32,
    /// Fog start distance
    pub fog_start: f32,
    /// Animation time in seconds
    pub time_sec: f32,
    /// Sampler unit of the diffuse texture
    pub texture: i32,
}

/// Skybox
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyboxUniforms {
    /// Rotation/projection of the sky
    pub pos_matrix: Mat4Data,
    /// Tint color
    pub color: [f32; 4],
    /// Fog color
    pub fog_color: [f32; 4],
    /// Nonzero enables fog
    pub fog_enabled: i32,
    /// Sampler unit of the sky texture
    pub the_texture: i32,
}

// Safety: all blocks are #[repr(C)], made only of f32/i32 fields with no padding
unsafe impl bytemuck::Pod for RectUniforms {}
unsafe impl bytemuck::Zeroable for RectUniforms {}
unsafe impl bytemuck::Pod for TexturedRectUniforms {}
unsafe impl bytemuck::Zeroable for TexturedRectUniforms {}
unsafe impl bytemuck::Pod for TextUniforms {}
unsafe impl bytemuck::Zeroable for TextUniforms {}
unsafe impl bytemuck::Pod for LineUniforms {}
unsafe impl bytemuck::Zeroable for LineUniforms {}
unsafe impl bytemuck::Pod for TerrainUniforms {}
unsafe impl bytemuck::Zeroable for TerrainUniforms {}
unsafe impl bytemuck::Pod for ComponentUniforms {}
unsafe impl bytemuck::Zeroable for ComponentUniforms {}
unsafe impl bytemuck::Pod for SkyboxUniforms {}
unsafe impl bytemuck::Zeroable for SkyboxUniforms {}

impl RectUniforms {
    /// Build from a nalgebra transform
    pub fn new(transform: &Matrix4<f32>, color: [f32; 4]) -> Self {
        Self {
            transformation_matrix: mat4(transform),
            color,
        }
    }
}

/// A uniform block of any kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformBlock {
    /// Solid rectangle
    Rect(RectUniforms),
    /// Textured rectangle
    TexturedRect(TexturedRectUniforms),
    /// Text
    Text(TextUniforms),
    /// Line
    Line(LineUniforms),
    /// Terrain and decals
    Terrain(TerrainUniforms),
    /// Model component
    Component(ComponentUniforms),
    /// Skybox
    Skybox(SkyboxUniforms),
}

fn read_block<T: bytemuck::Pod>(kind: UniformBlockKind, bytes: &[u8]) -> RenderResult<T> {
    bytemuck::try_pod_read_unaligned(bytes).map_err(|e| {
        RenderError::InvalidOperation(format!(
            "{:?} uniform block expects {} bytes, got {} ({:?})",
            kind,
            kind.byte_size(),
            bytes.len(),
            e
        ))
    })
}

impl UniformBlock {
    /// Logical kind
    pub fn kind(&self) -> UniformBlockKind {
        match self {
            UniformBlock::Rect(_) => UniformBlockKind::Rect,
            UniformBlock::TexturedRect(_) => UniformBlockKind::TexturedRect,
            UniformBlock::Text(_) => UniformBlockKind::Text,
            UniformBlock::Line(_) => UniformBlockKind::Line,
            UniformBlock::Terrain(_) => UniformBlockKind::Terrain,
            UniformBlock::Component(_) => UniformBlockKind::Component,
            UniformBlock::Skybox(_) => UniformBlockKind::Skybox,
        }
    }

    /// Reinterpret an opaque blob as a block of `kind`
    pub fn from_bytes(kind: UniformBlockKind, bytes: &[u8]) -> RenderResult<Self> {
        Ok(match kind {
            UniformBlockKind::Rect => UniformBlock::Rect(read_block(kind, bytes)?),
            UniformBlockKind::TexturedRect => UniformBlock::TexturedRect(read_block(kind, bytes)?),
            UniformBlockKind::Text => UniformBlock::Text(read_block(kind, bytes)?),
            UniformBlockKind::Line => UniformBlock::Line(read_block(kind, bytes)?),
            UniformBlockKind::Terrain => UniformBlock::Terrain(read_block(kind, bytes)?),
            UniformBlockKind::Component => UniformBlock::Component(read_block(kind, bytes)?),
            UniformBlockKind::Skybox => UniformBlock::Skybox(read_block(kind, bytes)?),
        })
    }

    /// Byte representation
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformBlock::Rect(b) => bytemuck::bytes_of(b),
            UniformBlock::TexturedRect(b) => bytemuck::bytes_of(b),
            UniformBlock::Text(b) => bytemuck::bytes_of(b),
            UniformBlock::Line(b) => bytemuck::bytes_of(b),
            UniformBlock::Terrain(b) => bytemuck::bytes_of(b),
            UniformBlock::Component(b) => bytemuck::bytes_of(b),
            UniformBlock::Skybox(b) => bytemuck::bytes_of(b),
        }
    }

    /// Field values in slot order
    pub fn slot_values(&self) -> Vec<UniformValue> {
        use UniformValue::{Float, Int, Mat4, Vec2, Vec4};
        match self {
            UniformBlock::Rect(b) => vec![Mat4(b.transformation_matrix), Vec4(b.color)],
            UniformBlock::TexturedRect(b) => vec![
                Mat4(b.transformation_matrix),
                Vec2(b.tuv_offset),
                Vec2(b.tuv_scale),
                Vec4(b.color),
                Int(b.texture),
            ],
            UniformBlock::Text(b) => vec![Mat4(b.transformation_matrix), Vec4(b.color), Int(b.texture)],
            UniformBlock::Line(b) => vec![
                Vec2(b.from),
                Vec2(b.to),
                Vec4(b.color),
                Mat4(b.model_view_projection),
            ],
            UniformBlock::Terrain(b) => vec![
                Mat4(b.model_view_projection),
                Vec4(b.paramx1),
                Vec4(b.paramy1),
                Vec4(b.fog_color),
                Int(b.fog_enabled),
                Float(b.fog_end),
                Float(b.fog_start),
                Float(b.time_sec),
                Int(b.tex),
                Int(b.lightmap_tex),
            ],
            UniformBlock::Component(b) => vec![
                Mat4(b.model_view_projection),
                Vec4(b.colour),
                Vec4(b.teamcolour),
                Vec4(b.fog_color),
                Int(b.fog_enabled),
                Float(b.fog_end),
                Float(b.fog_start),
                Float(b.time_sec),
                Int(b.texture),
            ],
            UniformBlock::Skybox(b) => vec![
                Mat4(b.pos_matrix),
                Vec4(b.color),
                Vec4(b.fog_color),
                Int(b.fog_enabled),
                Int(b.the_texture),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terrain() -> TerrainUniforms {
        TerrainUniforms {
            model_view_projection: mat4(&Matrix4::identity()),
            paramx1: [1.0, 0.0, 0.0, 0.0],
            paramy1: [0.0, 0.0, 1.0, 0.0],
            fog_color: [0.5, 0.5, 0.5, 1.0],
            fog_enabled: 1,
            fog_end: 800.0,
            fog_start: 100.0,
            time_sec: 2.5,
            tex: 0,
            lightmap_tex: 1,
        }
    }

    #[test]
    fn test_blocks_have_no_padding() {
        assert_eq!(std::mem::size_of::<RectUniforms>(), 80);
        assert_eq!(std::mem::size_of::<TexturedRectUniforms>(), 100);
        assert_eq!(std::mem::size_of::<TextUniforms>(), 84);
        assert_eq!(std::mem::size_of::<LineUniforms>(), 96);
        assert_eq!(std::mem::size_of::<TerrainUniforms>(), 136);
        assert_eq!(std::mem::size_of::<ComponentUniforms>(), 132);
        assert_eq!(std::mem::size_of::<SkyboxUniforms>(), 104);
    }

    #[test]
    fn test_opaque_blob_dispatch() {
        let block = UniformBlock::Terrain(terrain());
        let decoded = UniformBlock::from_bytes(UniformBlockKind::Terrain, block.as_bytes()).unwrap();
        assert_eq!(decoded, block);

        let values = decoded.slot_values();
        assert_eq!(values.len(), UniformBlockKind::Terrain.slot_count());
        assert_eq!(values[4], UniformValue::Int(1));
        assert_eq!(values[7], UniformValue::Float(2.5));
        assert_eq!(values[9], UniformValue::Int(1));
    }

    #[test]
    fn test_wrong_blob_size_rejected() {
        let bytes = [0u8; 12];
        assert!(UniformBlock::from_bytes(UniformBlockKind::Rect, &bytes).is_err());
    }

    #[test]
    fn test_matrix_is_column_major() {
        let m = Matrix4::new_translation(&nalgebra::Vector3::new(3.0, 4.0, 5.0));
        let rect = RectUniforms::new(&m, [1.0; 4]);
        assert_eq!(rect.transformation_matrix[3], [3.0, 4.0, 5.0, 1.0]);
    }
}
