//! Pixel formats and the per-backend capability matrix
//!
//! [`PixelFormat`] enumerates every format the texture pipeline can create or
//! upload. Each format knows its block layout and its native identifiers in
//! OpenGL and Vulkan so backends never keep their own translation tables.

mod matrix;

pub use matrix::{BestFormats, FormatMatrix};

use ash::vk;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Ways a backend can use a pixel format for a given target
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct PixelFormatUsage: u32 {
        /// Sampled from shaders
        const SAMPLED_IMAGE = 1 << 0;
        /// Bound as a storage image
        const STORAGE_IMAGE = 1 << 1;
        /// Rendered to as depth/stencil
        const DEPTH_STENCIL_ATTACHMENT = 1 << 2;
    }
}

/// Texture target kinds tracked separately by the capability matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatTarget {
    /// Plain 2D texture
    Texture2D,
    /// 2D texture array
    Texture2DArray,
}

impl FormatTarget {
    /// Both targets, in query order
    pub const ALL: [FormatTarget; 2] = [FormatTarget::Texture2D, FormatTarget::Texture2DArray];
}

/// Block compression families, each gated independently by the backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionFamily {
    /// Plain 8-bit or depth formats
    Uncompressed,
    /// S3TC / DXT (BC1-BC3)
    S3tc,
    /// RGTC (BC4, BC5)
    Rgtc,
    /// BPTC (BC7)
    Bptc,
    /// ETC1
    Etc1,
    /// ETC2 and EAC
    Etc2,
    /// ASTC LDR
    Astc,
}

/// Pixel formats known to the graphics layer
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    Bgra8,
    D24S8,
    D32F,
    /// DXT1, opaque
    Bc1,
    /// DXT3; only decoded from containers, never produced
    Bc2,
    /// DXT5
    Bc3,
    /// RGTC1, single channel
    Bc4,
    /// RGTC2, two channel
    Bc5,
    /// BPTC unorm
    Bc7,
    Etc1,
    Etc2Rgb8,
    /// ETC2 color with EAC alpha
    Etc2Rgba8,
    EacR11,
    EacRg11,
    /// ASTC LDR with 4x4 blocks
    Astc4x4,
}

impl PixelFormat {
    /// Every format, uncompressed first
    pub const ALL: [PixelFormat; 19] = [
        PixelFormat::R8,
        PixelFormat::Rg8,
        PixelFormat::Rgb8,
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
        PixelFormat::D24S8,
        PixelFormat::D32F,
        PixelFormat::Bc1,
        PixelFormat::Bc2,
        PixelFormat::Bc3,
        PixelFormat::Bc4,
        PixelFormat::Bc5,
        PixelFormat::Bc7,
        PixelFormat::Etc1,
        PixelFormat::Etc2Rgb8,
        PixelFormat::Etc2Rgba8,
        PixelFormat::EacR11,
        PixelFormat::EacRg11,
        PixelFormat::Astc4x4,
    ];

    /// Color formats that can hold decoded images of 1 to 4 channels
    pub const UNCOMPRESSED_COLOR: [PixelFormat; 4] =
        [PixelFormat::R8, PixelFormat::Rg8, PixelFormat::Rgb8, PixelFormat::Rgba8];

    /// Uncompressed color format for `channels` channels
    pub fn uncompressed_for_channels(channels: u8) -> Option<PixelFormat> {
        match channels {
            1 => Some(PixelFormat::R8),
            2 => Some(PixelFormat::Rg8),
            3 => Some(PixelFormat::Rgb8),
            4 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }

    /// Number of channels the format stores
    pub fn channels(self) -> u8 {
        match self {
            PixelFormat::R8 | PixelFormat::D32F | PixelFormat::Bc4 | PixelFormat::EacR11 => 1,
            PixelFormat::Rg8 | PixelFormat::D24S8 | PixelFormat::Bc5 | PixelFormat::EacRg11 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bc1 | PixelFormat::Etc1 | PixelFormat::Etc2Rgb8 => 3,
            PixelFormat::Rgba8
            | PixelFormat::Bgra8
            | PixelFormat::Bc2
            | PixelFormat::Bc3
            | PixelFormat::Bc7
            | PixelFormat::Etc2Rgba8
            | PixelFormat::Astc4x4 => 4,
        }
    }

    /// Compression family of the format
    pub fn family(self) -> CompressionFamily {
        match self {
            PixelFormat::Bc1 | PixelFormat::Bc2 | PixelFormat::Bc3 => CompressionFamily::S3tc,
            PixelFormat::Bc4 | PixelFormat::Bc5 => CompressionFamily::Rgtc,
            PixelFormat::Bc7 => CompressionFamily::Bptc,
            PixelFormat::Etc1 => CompressionFamily::Etc1,
            PixelFormat::Etc2Rgb8 | PixelFormat::Etc2Rgba8 | PixelFormat::EacR11 | PixelFormat::EacRg11 => {
                CompressionFamily::Etc2
            }
            PixelFormat::Astc4x4 => CompressionFamily::Astc,
            _ => CompressionFamily::Uncompressed,
        }
    }

    /// Whether the format is block compressed
    pub fn is_compressed(self) -> bool {
        self.family() != CompressionFamily::Uncompressed
    }

    /// Whether the format is a depth or depth/stencil format
    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::D24S8 | PixelFormat::D32F)
    }

    /// Formats permitted by a "highest quality compressed only" override
    pub fn is_high_quality(self) -> bool {
        matches!(
            self,
            PixelFormat::Bc4 | PixelFormat::Bc5 | PixelFormat::Bc7 | PixelFormat::EacR11 | PixelFormat::EacRg11
        )
    }

    /// Block edge in pixels (1 for uncompressed)
    pub fn block_dim(self) -> u32 {
        if self.is_compressed() {
            4
        } else {
            1
        }
    }

    /// Bytes per block (per pixel for uncompressed)
    pub fn block_bytes(self) -> usize {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rg8 => 2,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::D24S8 | PixelFormat::D32F => 4,
            PixelFormat::Bc1
            | PixelFormat::Bc4
            | PixelFormat::Etc1
            | PixelFormat::Etc2Rgb8
            | PixelFormat::EacR11 => 8,
            PixelFormat::Bc2
            | PixelFormat::Bc3
            | PixelFormat::Bc5
            | PixelFormat::Bc7
            | PixelFormat::Etc2Rgba8
            | PixelFormat::EacRg11
            | PixelFormat::Astc4x4 => 16,
        }
    }

    /// Byte size of one `width` x `height` level, saturating at `usize::MAX`
    pub fn level_size(self, width: u32, height: u32) -> usize {
        self.checked_level_size(width, height).unwrap_or(usize::MAX)
    }

    /// Byte size of one `width` x `height` level, `None` on overflow
    pub fn checked_level_size(self, width: u32, height: u32) -> Option<usize> {
        let dim = self.block_dim();
        let blocks_x = width.max(1).div_ceil(dim) as usize;
        let blocks_y = height.max(1).div_ceil(dim) as usize;
        blocks_x.checked_mul(blocks_y)?.checked_mul(self.block_bytes())
    }

    /// OpenGL sized internal format
    pub fn gl_internal_format(self) -> u32 {
        match self {
            PixelFormat::R8 => 0x8229,
            PixelFormat::Rg8 => 0x822B,
            PixelFormat::Rgb8 => 0x8051,
            PixelFormat::Rgba8 => 0x8058,
            PixelFormat::Bgra8 => 0x93A1,
            PixelFormat::D24S8 => 0x88F0,
            PixelFormat::D32F => 0x8CAC,
            PixelFormat::Bc1 => 0x83F0,
            PixelFormat::Bc2 => 0x83F2,
            PixelFormat::Bc3 => 0x83F3,
            PixelFormat::Bc4 => 0x8DBB,
            PixelFormat::Bc5 => 0x8DBD,
            PixelFormat::Bc7 => 0x8E8C,
            PixelFormat::Etc1 => 0x8D64,
            PixelFormat::Etc2Rgb8 => 0x9274,
            PixelFormat::Etc2Rgba8 => 0x9278,
            PixelFormat::EacR11 => 0x9270,
            PixelFormat::EacRg11 => 0x9272,
            PixelFormat::Astc4x4 => 0x93B0,
        }
    }

    /// OpenGL client format and type for uncompressed uploads
    pub fn gl_upload_format(self) -> Option<(u32, u32)> {
        const UNSIGNED_BYTE: u32 = 0x1401;
        match self {
            PixelFormat::R8 => Some((0x1903, UNSIGNED_BYTE)),
            PixelFormat::Rg8 => Some((0x8227, UNSIGNED_BYTE)),
            PixelFormat::Rgb8 => Some((0x1907, UNSIGNED_BYTE)),
            PixelFormat::Rgba8 => Some((0x1908, UNSIGNED_BYTE)),
            PixelFormat::Bgra8 => Some((0x80E1, UNSIGNED_BYTE)),
            PixelFormat::D24S8 => Some((0x84F9, 0x84FA)),
            PixelFormat::D32F => Some((0x1902, 0x1406)),
            _ => None,
        }
    }

    /// Vulkan format
    pub fn vk_format(self) -> vk::Format {
        match self {
            PixelFormat::R8 => vk::Format::R8_UNORM,
            PixelFormat::Rg8 => vk::Format::R8G8_UNORM,
            PixelFormat::Rgb8 => vk::Format::R8G8B8_UNORM,
            PixelFormat::Rgba8 => vk::Format::R8G8B8A8_UNORM,
            PixelFormat::Bgra8 => vk::Format::B8G8R8A8_UNORM,
            PixelFormat::D24S8 => vk::Format::D24_UNORM_S8_UINT,
            PixelFormat::D32F => vk::Format::D32_SFLOAT,
            PixelFormat::Bc1 => vk::Format::BC1_RGB_UNORM_BLOCK,
            PixelFormat::Bc2 => vk::Format::BC2_UNORM_BLOCK,
            PixelFormat::Bc3 => vk::Format::BC3_UNORM_BLOCK,
            PixelFormat::Bc4 => vk::Format::BC4_UNORM_BLOCK,
            PixelFormat::Bc5 => vk::Format::BC5_UNORM_BLOCK,
            PixelFormat::Bc7 => vk::Format::BC7_UNORM_BLOCK,
            // ETC1 payloads are valid ETC2 RGB8 blocks
            PixelFormat::Etc1 | PixelFormat::Etc2Rgb8 => vk::Format::ETC2_R8G8B8_UNORM_BLOCK,
            PixelFormat::Etc2Rgba8 => vk::Format::ETC2_R8G8B8A8_UNORM_BLOCK,
            PixelFormat::EacR11 => vk::Format::EAC_R11_UNORM_BLOCK,
            PixelFormat::EacRg11 => vk::Format::EAC_R11G11_UNORM_BLOCK,
            PixelFormat::Astc4x4 => vk::Format::ASTC_4X4_UNORM_BLOCK,
        }
    }

    /// Map a raw Vulkan format value (as stored in KTX2 headers)
    pub fn from_vk_format(raw: u32) -> Option<PixelFormat> {
        if raw == vk::Format::BC1_RGBA_UNORM_BLOCK.as_raw() as u32 {
            return Some(PixelFormat::Bc1);
        }
        Self::ALL
            .iter()
            .copied()
            .filter(|f| *f != PixelFormat::Etc1)
            .find(|f| f.vk_format().as_raw() as u32 == raw)
    }
}
