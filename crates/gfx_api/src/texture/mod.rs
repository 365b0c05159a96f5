//! Textures and texture arrays
//!
//! Textures are owned by whoever loaded them; the context never keeps a
//! reference. Dropping a [`Texture`] does not free GPU memory, hand it back
//! through `Context::destroy_texture`.

mod array;
mod loader;

pub(crate) use array::load_texture_array;
pub(crate) use loader::{load_texture, LoaderEnv};

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, TextureDesc, TextureId};
use crate::error::RenderResult;
use crate::format::PixelFormat;

/// Role of a texture, driving channel reduction and format choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureType {
    /// Color texture on game geometry
    GameTexture,
    /// Interface image: single level, never compressed
    UserInterface,
    /// Specular intensity, reduced to luma
    SpecularMap,
    /// Alpha coverage, reduced to one channel
    AlphaMask,
    /// Height field, first channel only
    HeightMap,
    /// Tangent-space normals
    NormalMap,
}

impl TextureType {
    /// Every texture type
    pub const ALL: [TextureType; 6] = [
        TextureType::GameTexture,
        TextureType::UserInterface,
        TextureType::SpecularMap,
        TextureType::AlphaMask,
        TextureType::HeightMap,
        TextureType::NormalMap,
    ];

    /// Whether this type is stored with a single channel
    pub fn is_single_channel(self) -> bool {
        matches!(
            self,
            TextureType::SpecularMap | TextureType::AlphaMask | TextureType::HeightMap
        )
    }
}

/// Mip levels for a texture of the given size and type
///
/// Interface textures get one level, everything else a full chain down to 1x1.
pub fn mip_count_for(width: u32, height: u32, texture_type: TextureType) -> u32 {
    if texture_type == TextureType::UserInterface {
        return 1;
    }
    32 - width.max(height).max(1).leading_zeros()
}

/// Dimensions of `level` for a level-0 size, never below 1x1
pub fn mip_dimensions(width: u32, height: u32, level: u32) -> (u32, u32) {
    let shift = level.min(31);
    ((width >> shift).max(1), (height >> shift).max(1))
}

/// Options for a single texture load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureLoadOptions {
    /// Role of the texture
    pub texture_type: TextureType,
    /// Downscale so width fits
    pub max_width: Option<u32>,
    /// Downscale so height fits
    pub max_height: Option<u32>,
    /// Log a missing file at debug instead of warn
    pub quiet: bool,
}

impl TextureLoadOptions {
    /// Options for `texture_type` with no size limit
    pub fn new(texture_type: TextureType) -> Self {
        Self {
            texture_type,
            max_width: None,
            max_height: None,
            quiet: false,
        }
    }

    /// Limit the loaded size
    pub fn with_max_size(mut self, max_width: Option<u32>, max_height: Option<u32>) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    /// Demote the missing-file diagnostic
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// A loaded 2D texture
#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    pub(crate) id: TextureId,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) mip_count: u32,
    pub(crate) format: PixelFormat,
    pub(crate) name: String,
}

impl Texture {
    /// Backend handle
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Width of level 0
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of level 0
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of mip levels
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// Storage format, fixed at creation
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Name it was loaded under
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A loaded 2D texture array
#[derive(Debug, PartialEq, Eq)]
pub struct TextureArray {
    pub(crate) id: TextureId,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) mip_count: u32,
    pub(crate) layers: u32,
    pub(crate) format: PixelFormat,
}

impl TextureArray {
    /// Backend handle
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Width of every layer
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of every layer
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Mip levels of every layer
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// Number of layers
    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Storage format
    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

/// Backend texture under construction
///
/// Destroyed on drop unless [`PendingTexture::commit`] hands it out, so an
/// early return never leaks the allocation.
pub(crate) struct PendingTexture<'a> {
    backend: &'a mut dyn Backend,
    id: Option<TextureId>,
}

impl<'a> PendingTexture<'a> {
    pub(crate) fn create(backend: &'a mut dyn Backend, desc: &TextureDesc) -> RenderResult<Self> {
        desc.validate(&backend.limits())?;
        let id = backend.create_texture(desc)?;
        Ok(Self { backend, id: Some(id) })
    }

    pub(crate) fn upload(&mut self, layer: u32, level: u32, width: u32, height: u32, data: &[u8]) -> RenderResult<()> {
        match self.id {
            Some(id) => self.backend.upload_texture_level(id, layer, level, width, height, data),
            None => Ok(()),
        }
    }

    pub(crate) fn commit(mut self) -> Option<TextureId> {
        self.id.take()
    }
}

impl Drop for PendingTexture<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            log::debug!("Destroying partially uploaded texture {:?}", id);
            self.backend.destroy_texture(id);
        }
    }
}
