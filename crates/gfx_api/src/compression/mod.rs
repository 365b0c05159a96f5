//! Real-time texture compression
//!
//! Software block encoders used when the texture loader picks a compressed
//! upload format for raster input, and decoders that turn stored container
//! data back into plain pixels when the backend cannot sample it.
//!
//! Encoders favour speed over quality: every block is fitted with a bounding
//! box or average, then indices are chosen against the exactly decoded
//! palette, so output is always valid for the target format.

mod astc;
mod bc;
mod bc7;
mod etc;
pub mod overrides;

pub use overrides::{select_compressed_format, CompressionLevel, OverrideTable};

use crate::assets::ImageData;
use crate::error::{RenderError, RenderResult};
use crate::format::PixelFormat;

/// 4x4 RGBA texels in row-major order
pub(crate) type Block = [[u8; 4]; 16];

/// Gather the 4x4 block at block coordinates (bx, by), clamping at edges
fn gather_block(image: &ImageData, bx: u32, by: u32) -> Block {
    let mut block = [[0u8; 4]; 16];
    for (i, texel) in block.iter_mut().enumerate() {
        let x = (bx * 4 + (i as u32 % 4)).min(image.width - 1);
        let y = (by * 4 + (i as u32 / 4)).min(image.height - 1);
        *texel = image.rgba_at(x, y);
    }
    block
}

/// Compress an image into `format`
///
/// Input may have any channel count; it is read as RGBA with the same
/// expansion rules as [`ImageData::expand_channels`].
pub fn compress(image: &ImageData, format: PixelFormat) -> RenderResult<Vec<u8>> {
    if image.width == 0 || image.height == 0 {
        return Err(RenderError::Compression {
            format,
            reason: "empty image".to_string(),
        });
    }

    let encode: fn(&Block, &mut Vec<u8>) = match format {
        PixelFormat::Bc1 => bc::encode_bc1,
        PixelFormat::Bc3 => bc::encode_bc3,
        PixelFormat::Bc4 => bc::encode_bc4,
        PixelFormat::Bc5 => bc::encode_bc5,
        PixelFormat::Bc7 => bc7::encode_mode6,
        PixelFormat::Etc1 | PixelFormat::Etc2Rgb8 => etc::encode_etc1,
        PixelFormat::Etc2Rgba8 => etc::encode_etc2_rgba8,
        PixelFormat::EacR11 => etc::encode_eac_r11,
        PixelFormat::EacRg11 => etc::encode_eac_rg11,
        PixelFormat::Astc4x4 => astc::encode_4x4,
        other => {
            return Err(RenderError::Compression {
                format: other,
                reason: "no encoder for this format".to_string(),
            })
        }
    };

    let blocks_x = image.width.div_ceil(4);
    let blocks_y = image.height.div_ceil(4);
    let mut out = Vec::with_capacity(format.level_size(image.width, image.height));
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            encode(&gather_block(image, bx, by), &mut out);
        }
    }
    debug_assert_eq!(out.len(), format.level_size(image.width, image.height));
    Ok(out)
}

/// Decode one level of `format` data into pixels
///
/// Uncompressed formats keep their channel count (BGRA is swizzled to
/// RGBA). S3TC decodes to RGBA, BC4 to one channel and BC5 to two.
pub fn decompress(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> RenderResult<ImageData> {
    let expected = format.level_size(width, height);
    if data.len() != expected {
        return Err(RenderError::Compression {
            format,
            reason: format!("{}x{} level needs {} bytes, got {}", width, height, expected, data.len()),
        });
    }

    let to_render = |e: crate::assets::AssetError| RenderError::Compression {
        format,
        reason: e.to_string(),
    };

    match format {
        PixelFormat::R8 | PixelFormat::Rg8 | PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
            ImageData::new(width, height, format.channels(), data.to_vec()).map_err(to_render)
        }
        PixelFormat::Bgra8 => {
            let mut rgba = data.to_vec();
            for px in rgba.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
            ImageData::new(width, height, 4, rgba).map_err(to_render)
        }
        PixelFormat::Bc1 | PixelFormat::Bc2 | PixelFormat::Bc3 | PixelFormat::Bc4 | PixelFormat::Bc5 => {
            let (channels, pixels) = bc::decode(format, width, height, data);
            ImageData::new(width, height, channels, pixels).map_err(to_render)
        }
        other => Err(RenderError::Compression {
            format: other,
            reason: "no decoder for this format".to_string(),
        }),
    }
}

/// Whether [`decompress`] can decode the format
pub fn can_decompress(format: PixelFormat) -> bool {
    !format.is_depth()
        && matches!(
            format,
            PixelFormat::R8
                | PixelFormat::Rg8
                | PixelFormat::Rgb8
                | PixelFormat::Rgba8
                | PixelFormat::Bgra8
                | PixelFormat::Bc1
                | PixelFormat::Bc2
                | PixelFormat::Bc3
                | PixelFormat::Bc4
                | PixelFormat::Bc5
        )
}
