//! Built-in shader modes
//!
//! Each mode maps to a vertex/fragment source pair under `shaders/`, a
//! friendly name for diagnostics, the ordered uniform names that define its
//! slot numbering, and the attribute locations bound before linking.

use serde::{Deserialize, Serialize};

use super::uniforms::UniformBlockKind;

/// Shader programs known to the pipeline builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderMode {
    /// Solid colored rectangle
    Rect,
    /// Textured rectangle with UV offset/scale
    TexturedRect,
    /// Glyph quads sampled from a font atlas
    Text,
    /// Single line segment
    Line,
    /// Terrain with lightmap and fog
    Terrain,
    /// Decals drawn over terrain
    Decals,
    /// Lit model component with team color
    Component,
    /// Skybox
    Skybox,
}

/// Static description of a shader mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderModeInfo {
    /// Logical path of the vertex source
    pub vertex_path: &'static str,
    /// Logical path of the fragment source
    pub fragment_path: &'static str,
    /// Name used in logs
    pub friendly_name: &'static str,
    /// Uniform names in slot order
    pub uniforms: &'static [&'static str],
    /// Attribute (location, name) pairs bound before linking
    pub attributes: &'static [(u32, &'static str)],
    /// Uniform block accepted by the mode
    pub block: UniformBlockKind,
}

const TERRAIN_UNIFORMS: &[&str] = &[
    "ModelViewProjectionMatrix",
    "paramx1",
    "paramy1",
    "fogColor",
    "fogEnabled",
    "fogEnd",
    "fogStart",
    "timeSec",
    "tex",
    "lightmap_tex",
];

const VERTEX_ONLY: &[(u32, &str)] = &[(0, "vertex")];
const VERTEX_TEXCOORD: &[(u32, &str)] = &[(0, "vertex"), (1, "vertexTexCoord")];

static RECT: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/rect.vert",
    fragment_path: "shaders/rect.frag",
    friendly_name: "Rect program",
    uniforms: &["transformationMatrix", "color"],
    attributes: VERTEX_ONLY,
    block: UniformBlockKind::Rect,
};

static TEXTURED_RECT: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/rect.vert",
    fragment_path: "shaders/texturedrect.frag",
    friendly_name: "Textured rect program",
    uniforms: &["transformationMatrix", "tuv_offset", "tuv_scale", "color", "theTexture"],
    attributes: VERTEX_ONLY,
    block: UniformBlockKind::TexturedRect,
};

static TEXT: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/rect.vert",
    fragment_path: "shaders/text.frag",
    friendly_name: "Text program",
    uniforms: &["transformationMatrix", "color", "theTexture"],
    attributes: VERTEX_ONLY,
    block: UniformBlockKind::Text,
};

static LINE: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/line.vert",
    fragment_path: "shaders/rect.frag",
    friendly_name: "Line program",
    uniforms: &["from", "to", "color", "ModelViewProjectionMatrix"],
    attributes: VERTEX_ONLY,
    block: UniformBlockKind::Line,
};

static TERRAIN: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/terrain.vert",
    fragment_path: "shaders/terrain.frag",
    friendly_name: "Terrain program",
    uniforms: TERRAIN_UNIFORMS,
    attributes: &[(0, "vertex"), (1, "vertexColor")],
    block: UniformBlockKind::Terrain,
};

static DECALS: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/decals.vert",
    fragment_path: "shaders/decals.frag",
    friendly_name: "Decals program",
    uniforms: TERRAIN_UNIFORMS,
    attributes: VERTEX_TEXCOORD,
    block: UniformBlockKind::Terrain,
};

static COMPONENT: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/component.vert",
    fragment_path: "shaders/component.frag",
    friendly_name: "Component program",
    uniforms: &[
        "ModelViewProjectionMatrix",
        "colour",
        "teamcolour",
        "fogColor",
        "fogEnabled",
        "fogEnd",
        "fogStart",
        "timeSec",
        "Texture",
    ],
    attributes: &[(0, "vertex"), (1, "vertexTexCoord"), (2, "vertexNormal")],
    block: UniformBlockKind::Component,
};

static SKYBOX: ShaderModeInfo = ShaderModeInfo {
    vertex_path: "shaders/skybox.vert",
    fragment_path: "shaders/skybox.frag",
    friendly_name: "Skybox program",
    uniforms: &["posMatrix", "color", "fog_color", "fog_enabled", "theTexture"],
    attributes: VERTEX_TEXCOORD,
    block: UniformBlockKind::Skybox,
};

impl ShaderMode {
    /// Every mode
    pub const ALL: [ShaderMode; 8] = [
        ShaderMode::Rect,
        ShaderMode::TexturedRect,
        ShaderMode::Text,
        ShaderMode::Line,
        ShaderMode::Terrain,
        ShaderMode::Decals,
        ShaderMode::Component,
        ShaderMode::Skybox,
    ];

    /// Static description
    pub fn info(self) -> &'static ShaderModeInfo {
        match self {
            ShaderMode::Rect => &RECT,
            ShaderMode::TexturedRect => &TEXTURED_RECT,
            ShaderMode::Text => &TEXT,
            ShaderMode::Line => &LINE,
            ShaderMode::Terrain => &TERRAIN,
            ShaderMode::Decals => &DECALS,
            ShaderMode::Component => &COMPONENT,
            ShaderMode::Skybox => &SKYBOX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_lists_match_block_slots() {
        for mode in ShaderMode::ALL {
            let info = mode.info();
            assert_eq!(
                info.uniforms.len(),
                info.block.slot_count(),
                "{} uniform list and block disagree",
                info.friendly_name
            );
        }
    }

    #[test]
    fn test_decals_share_terrain_block() {
        assert_eq!(ShaderMode::Decals.info().block, ShaderMode::Terrain.info().block);
        assert_eq!(ShaderMode::Decals.info().uniforms, ShaderMode::Terrain.info().uniforms);
    }

    #[test]
    fn test_attribute_locations_unique() {
        for mode in ShaderMode::ALL {
            let attributes = mode.info().attributes;
            for (i, a) in attributes.iter().enumerate() {
                assert!(attributes[i + 1..].iter().all(|b| b.0 != a.0 && b.1 != a.1));
            }
        }
    }
}
