//! Single texture load pipeline
//!
//! name resolution → decode → channel reduction → downscale → mip count →
//! channel expansion → format selection → create → upload every level.
//! Pre-compressed containers the backend can sample skip straight to upload.

use crate::assets::{self, AssetSource, ImageData};
use crate::backend::{Backend, TextureDesc};
use crate::compression::{self, select_compressed_format, OverrideTable};
use crate::error::{RenderError, RenderResult};
use crate::format::{BestFormats, FormatMatrix, FormatTarget, PixelFormat};

#[cfg(feature = "ktx2")]
use crate::assets::ktx2::Ktx2Texture;

use super::{mip_count_for, PendingTexture, Texture, TextureLoadOptions, TextureType};

/// Everything a load needs from the context
pub(crate) struct LoaderEnv<'a> {
    pub backend: &'a mut dyn Backend,
    pub assets: &'a dyn AssetSource,
    pub best: &'a BestFormats,
    pub overrides: &'a OverrideTable,
}

/// Decoded source file
pub(super) enum SourceImage {
    Raster(ImageData),
    #[cfg(feature = "ktx2")]
    Container(Ktx2Texture),
}

impl SourceImage {
    /// Level 0 as plain pixels
    pub(super) fn into_image(self) -> RenderResult<ImageData> {
        match self {
            SourceImage::Raster(image) => Ok(image),
            #[cfg(feature = "ktx2")]
            SourceImage::Container(ktx) => {
                let level0 = ktx.levels.first().ok_or_else(|| {
                    RenderError::ResourceCreationFailed("container has no levels".to_string())
                })?;
                compression::decompress(ktx.format, ktx.width, ktx.height, level0)
            }
        }
    }
}

/// Prefer a `.ktx2` container when the requested `.png` is absent
pub(super) fn resolve_name(assets: &dyn AssetSource, name: &str) -> String {
    if cfg!(feature = "ktx2")
        && assets::extension(name).as_deref() == Some("png")
        && !assets.exists(name)
    {
        let container = assets::with_extension(name, "ktx2");
        if assets.exists(&container) {
            log::debug!("Using container {} for {}", container, name);
            return container;
        }
    }
    name.to_string()
}

/// Resolve, read and decode a texture source
pub(super) fn read_source(assets: &dyn AssetSource, name: &str, quiet: bool) -> RenderResult<SourceImage> {
    let path = resolve_name(assets, name);
    let bytes = match assets.read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            if quiet {
                log::debug!("Texture {} not found: {}", name, e);
            } else {
                log::warn!("Texture {} not found: {}", name, e);
            }
            return Err(e.into());
        }
    };

    #[cfg(feature = "ktx2")]
    if Ktx2Texture::is_ktx2(&bytes) {
        return Ok(SourceImage::Container(Ktx2Texture::parse(&path, &bytes)?));
    }

    let image = ImageData::from_bytes(&bytes).map_err(|e| {
        log::error!("Failed to decode texture {}: {}", path, e);
        RenderError::from(e)
    })?;
    Ok(SourceImage::Raster(image))
}

/// Reduce channels according to the texture's role
pub(super) fn reduce_channels(image: ImageData, texture_type: TextureType, rgb_sampled: bool) -> RenderResult<ImageData> {
    Ok(match texture_type {
        TextureType::SpecularMap => image.to_luma(),
        TextureType::AlphaMask => match image.channels {
            4 => image.extract_channel(3)?,
            1 => image,
            other => {
                return Err(RenderError::InvalidOperation(format!(
                    "Alpha mask source must have 1 or 4 channels, not {other}"
                )))
            }
        },
        TextureType::HeightMap => image.extract_channel(0)?,
        TextureType::NormalMap if image.channels == 4 && rgb_sampled => image.truncate_channels(3),
        TextureType::NormalMap if image.channels < 3 => image.expand_channels(if rgb_sampled { 3 } else { 4 }),
        _ => image,
    })
}

/// Raise the channel count until an uncompressed format is sampled on `target`
pub(super) fn expand_to_supported(
    image: ImageData,
    matrix: &FormatMatrix,
    target: FormatTarget,
) -> RenderResult<ImageData> {
    for channels in image.channels..=4 {
        let Some(format) = PixelFormat::uncompressed_for_channels(channels) else {
            continue;
        };
        if matrix.is_sampled(target, format) {
            return Ok(if channels == image.channels {
                image
            } else {
                log::trace!("Expanding {} channel(s) to {} for {:?}", image.channels, channels, format);
                image.expand_channels(channels)
            });
        }
    }
    Err(RenderError::LogicError(format!(
        "No uncompressed format with {} to 4 channels is sampled on {:?}",
        image.channels, target
    )))
}

/// Next level of a mip chain
pub(super) fn next_level(image: &ImageData, texture_type: TextureType) -> RenderResult<ImageData> {
    let half = image.half_size();
    if texture_type == TextureType::AlphaMask && half.channels != 1 {
        let channels = half.channels;
        return Ok(half.extract_channel(0)?.expand_channels(channels));
    }
    Ok(half)
}

/// Upload one level, compressing first when the formats differ
pub(super) fn upload_level(
    pending: &mut PendingTexture<'_>,
    image: &ImageData,
    format: PixelFormat,
    layer: u32,
    level: u32,
) -> RenderResult<()> {
    if format.is_compressed() {
        let blocks = compression::compress(image, format)?;
        pending.upload(layer, level, image.width, image.height, &blocks)
    } else {
        pending.upload(layer, level, image.width, image.height, &image.data)
    }
}

/// Load one 2D texture
pub(crate) fn load_texture(env: &mut LoaderEnv<'_>, name: &str, options: &TextureLoadOptions) -> RenderResult<Texture> {
    let source = read_source(env.assets, name, options.quiet)?;

    #[cfg(feature = "ktx2")]
    if let SourceImage::Container(ktx) = &source {
        if env.backend.format_matrix().is_sampled(FormatTarget::Texture2D, ktx.format) {
            return load_container(env, name, ktx, options);
        }
        log::debug!("{:?} in {} is not sampled, decoding", ktx.format, name);
    }

    let image = source.into_image()?;
    load_raster(env, name, image, options)
}

/// First container level that fits the size limits and the backend's
/// largest texture edge
#[cfg(feature = "ktx2")]
pub(super) fn first_fitting_level(
    ktx: &Ktx2Texture,
    max_width: Option<u32>,
    max_height: Option<u32>,
    max_texture_size: u32,
) -> RenderResult<usize> {
    let within = |level: usize, max_w: u32, max_h: u32| {
        let (w, h) = ktx.level_dimensions(level);
        w <= max_w && h <= max_h
    };
    let max_w = max_width.map_or(max_texture_size, |m| m.min(max_texture_size));
    let max_h = max_height.map_or(max_texture_size, |m| m.min(max_texture_size));
    if let Some(level) = (0..ktx.levels.len()).find(|&level| within(level, max_w, max_h)) {
        return Ok(level);
    }
    let last = ktx.levels.len().saturating_sub(1);
    if within(last, max_texture_size, max_texture_size) {
        return Ok(last);
    }
    let (w, h) = ktx.level_dimensions(last);
    Err(RenderError::ResourceCreationFailed(format!(
        "container levels down to {w}x{h} exceed the {max_texture_size} texture limit"
    )))
}

#[cfg(feature = "ktx2")]
fn load_container(env: &mut LoaderEnv<'_>, name: &str, ktx: &Ktx2Texture, options: &TextureLoadOptions) -> RenderResult<Texture> {
    let limit = env.backend.limits().max_texture_size;
    let first = first_fitting_level(ktx, options.max_width, options.max_height, limit)?;
    let (width, height) = ktx.level_dimensions(first);
    let available = (ktx.levels.len() - first) as u32;
    let mip_count = if options.texture_type == TextureType::UserInterface {
        1
    } else {
        available.min(mip_count_for(width, height, options.texture_type))
    };

    let desc = TextureDesc {
        width,
        height,
        mip_count,
        layers: 1,
        format: ktx.format,
        target: FormatTarget::Texture2D,
        debug_name: name.to_string(),
    };
    let mut pending = PendingTexture::create(&mut *env.backend, &desc).map_err(|e| {
        log::error!("Failed to create {} ({}x{}, {:?}): {}", name, width, height, ktx.format, e);
        e
    })?;
    for level in 0..mip_count {
        let (w, h) = ktx.level_dimensions(first + level as usize);
        pending.upload(0, level, w, h, &ktx.levels[first + level as usize])?;
    }

    let id = pending
        .commit()
        .ok_or_else(|| RenderError::ResourceCreationFailed(format!("texture {name} was released during upload")))?;
    log::debug!("Loaded container {} as {:?} {}x{} ({} mips)", name, ktx.format, width, height, mip_count);
    Ok(Texture {
        id,
        width,
        height,
        mip_count,
        format: ktx.format,
        name: name.to_string(),
    })
}

/// Format a texture is uploaded in: best compressed candidate allowed by
/// the override table, or the image's own uncompressed format
pub(super) fn choose_format(
    best: &BestFormats,
    target: FormatTarget,
    texture_type: TextureType,
    uncompressed: PixelFormat,
    level: Option<compression::CompressionLevel>,
) -> PixelFormat {
    let candidates = best.candidates(target, texture_type);
    let chosen = select_compressed_format(candidates, level);
    if level.is_some() && chosen != candidates.first().copied() {
        log::debug!(
            "Compression override {:?} changes {:?} to {:?}",
            level,
            candidates.first(),
            chosen.unwrap_or(uncompressed)
        );
    }
    chosen.unwrap_or(uncompressed)
}

fn load_raster(env: &mut LoaderEnv<'_>, name: &str, image: ImageData, options: &TextureLoadOptions) -> RenderResult<Texture> {
    let target = FormatTarget::Texture2D;
    let texture_type = options.texture_type;

    let (image, format, mip_count) = {
        let matrix = env.backend.format_matrix();
        let rgb_sampled = matrix.is_sampled(target, PixelFormat::Rgb8);
        let image = reduce_channels(image, texture_type, rgb_sampled)?;
        let image = image.downscale_to_fit(options.max_width, options.max_height)?;
        let mip_count = mip_count_for(image.width, image.height, texture_type);
        let image = expand_to_supported(image, matrix, target)?;
        let uncompressed = PixelFormat::uncompressed_for_channels(image.channels).ok_or_else(|| {
            RenderError::LogicError(format!("{} channel image has no uncompressed format", image.channels))
        })?;
        let format = choose_format(env.best, target, texture_type, uncompressed, env.overrides.lookup(name));
        (image, format, mip_count)
    };

    let (width, height) = (image.width, image.height);
    let fail = |e: RenderError| {
        log::error!("Failed to load {} as {:?} ({}x{}): {}", name, format, width, height, e);
        e
    };

    let desc = TextureDesc {
        width,
        height,
        mip_count,
        layers: 1,
        format,
        target,
        debug_name: name.to_string(),
    };
    let mut pending = PendingTexture::create(&mut *env.backend, &desc).map_err(fail)?;

    let mut level_image = image;
    for level in 0..mip_count {
        if level > 0 {
            level_image = next_level(&level_image, texture_type).map_err(fail)?;
        }
        upload_level(&mut pending, &level_image, format, 0, level).map_err(fail)?;
    }

    let id = pending
        .commit()
        .ok_or_else(|| RenderError::ResourceCreationFailed(format!("texture {name} was released during upload")))?;
    log::debug!("Loaded {} as {:?} {}x{} ({} mips)", name, format, width, height, mip_count);
    Ok(Texture {
        id,
        width,
        height,
        mip_count,
        format,
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormatUsage;

    fn gray(channels: u8) -> ImageData {
        ImageData::new(2, 2, channels, vec![100; 4 * channels as usize]).unwrap()
    }

    #[test]
    fn test_reduction_per_type() {
        let rgba = ImageData::solid_color(2, 2, [10, 20, 30, 40]);
        assert_eq!(reduce_channels(rgba.clone(), TextureType::SpecularMap, true).unwrap().channels, 1);
        let mask = reduce_channels(rgba.clone(), TextureType::AlphaMask, true).unwrap();
        assert_eq!(mask.channels, 1);
        assert_eq!(mask.data[0], 40);
        let height = reduce_channels(rgba.clone(), TextureType::HeightMap, true).unwrap();
        assert_eq!(height.data[0], 10);
        assert_eq!(reduce_channels(rgba.clone(), TextureType::NormalMap, true).unwrap().channels, 3);
        assert_eq!(reduce_channels(rgba, TextureType::NormalMap, false).unwrap().channels, 4);
    }

    #[test]
    fn test_normal_map_from_low_channel_source() {
        for channels in [1, 2] {
            let rgb = reduce_channels(gray(channels), TextureType::NormalMap, true).unwrap();
            assert_eq!(rgb.channels, 3, "{channels} channel source");
            let rgba = reduce_channels(gray(channels), TextureType::NormalMap, false).unwrap();
            assert_eq!(rgba.channels, 4, "{channels} channel source");
        }
    }

    #[test]
    fn test_alpha_mask_rejects_rgb() {
        assert!(reduce_channels(gray(3), TextureType::AlphaMask, true).is_err());
        assert!(reduce_channels(gray(2), TextureType::AlphaMask, true).is_err());
        assert_eq!(reduce_channels(gray(1), TextureType::AlphaMask, true).unwrap().channels, 1);
    }

    #[test]
    fn test_expansion_stops_at_first_sampled_format() {
        let sampled = PixelFormatUsage::SAMPLED_IMAGE;
        let matrix = FormatMatrix::new().with(PixelFormat::Rgba8, sampled).with(PixelFormat::Rg8, sampled);
        let target = FormatTarget::Texture2D;
        assert_eq!(expand_to_supported(gray(1), &matrix, target).unwrap().channels, 2);
        assert_eq!(expand_to_supported(gray(3), &matrix, target).unwrap().channels, 4);
        assert!(matches!(
            expand_to_supported(gray(1), &FormatMatrix::new(), target),
            Err(RenderError::LogicError(_))
        ));
    }

    #[test]
    fn test_alpha_mask_mips_keep_channel_zero() {
        let image = ImageData::solid_color(4, 4, [200, 1, 2, 3]);
        let next = next_level(&image, TextureType::AlphaMask).unwrap();
        assert_eq!((next.width, next.height, next.channels), (2, 2, 4));
        assert_eq!(next.rgba_at(0, 0), [200, 200, 200, 255]);
    }
}
