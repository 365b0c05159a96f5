//! Texture array load pipeline
//!
//! Every layer shares layer 0's width, height and mip count. The storage
//! format is decided once for the whole batch: containers that all hold the
//! same sampled format are uploaded as stored, anything else is extracted
//! to RGBA8 and compressed uniformly.

use crate::assets::ImageData;
use crate::backend::TextureDesc;
use crate::error::{RenderError, RenderResult};
use crate::format::{FormatTarget, PixelFormat};

#[cfg(feature = "ktx2")]
use crate::assets::ktx2::Ktx2Texture;

use super::loader::{
    choose_format, next_level, read_source, reduce_channels, upload_level, LoaderEnv, SourceImage,
};
use super::{mip_count_for, PendingTexture, TextureArray, TextureType};

const TARGET: FormatTarget = FormatTarget::Texture2DArray;

/// Load `filenames` as the layers of one array texture
///
/// A layer that fails to load is replaced by `generator(width, height)`,
/// called once per failed layer with layer 0's size.
pub(crate) fn load_texture_array(
    env: &mut LoaderEnv<'_>,
    filenames: &[&str],
    texture_type: TextureType,
    max_width: Option<u32>,
    max_height: Option<u32>,
    generator: &mut dyn FnMut(u32, u32) -> ImageData,
) -> RenderResult<TextureArray> {
    if filenames.is_empty() {
        return Err(RenderError::InvalidOperation("texture array needs at least one layer".to_string()));
    }

    let sources: Vec<Option<SourceImage>> = filenames
        .iter()
        .map(|name| read_source(env.assets, name, false).ok())
        .collect();

    #[cfg(feature = "ktx2")]
    if let Some(containers) = joint_containers(env, &sources) {
        return load_container_layers(env, filenames, &containers, texture_type, max_width, max_height);
    }

    load_raster_layers(env, filenames, sources, texture_type, max_width, max_height, generator)
}

/// Containers usable as stored: all present, same format and shape, sampled
#[cfg(feature = "ktx2")]
fn joint_containers<'s>(env: &LoaderEnv<'_>, sources: &'s [Option<SourceImage>]) -> Option<Vec<&'s Ktx2Texture>> {
    let containers: Vec<&Ktx2Texture> = sources
        .iter()
        .map(|source| match source {
            Some(SourceImage::Container(ktx)) => Some(ktx),
            _ => None,
        })
        .collect::<Option<_>>()?;
    let first = containers.first()?;
    let uniform = containers.iter().all(|ktx| {
        ktx.format == first.format
            && ktx.width == first.width
            && ktx.height == first.height
            && ktx.levels.len() == first.levels.len()
    });
    (uniform && env.backend.format_matrix().is_sampled(TARGET, first.format)).then_some(containers)
}

#[cfg(feature = "ktx2")]
fn load_container_layers(
    env: &mut LoaderEnv<'_>,
    filenames: &[&str],
    containers: &[&Ktx2Texture],
    texture_type: TextureType,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> RenderResult<TextureArray> {
    let reference = containers[0];
    let limit = env.backend.limits().max_texture_size;
    let first = super::loader::first_fitting_level(reference, max_width, max_height, limit)?;
    let (width, height) = reference.level_dimensions(first);
    let available = (reference.levels.len() - first) as u32;
    let mip_count = available.min(mip_count_for(width, height, texture_type));
    let format = reference.format;

    let desc = TextureDesc {
        width,
        height,
        mip_count,
        layers: containers.len() as u32,
        format,
        target: TARGET,
        debug_name: filenames.join(","),
    };
    let mut pending = PendingTexture::create(&mut *env.backend, &desc)?;
    for (layer, ktx) in containers.iter().enumerate() {
        for level in 0..mip_count {
            let index = first + level as usize;
            let (w, h) = ktx.level_dimensions(index);
            pending.upload(layer as u32, level, w, h, &ktx.levels[index])?;
        }
    }
    let id = pending
        .commit()
        .ok_or_else(|| RenderError::ResourceCreationFailed("texture array was released during upload".to_string()))?;
    log::debug!("Loaded {} container layer(s) as {:?} {}x{}", containers.len(), format, width, height);
    Ok(TextureArray {
        id,
        width,
        height,
        mip_count,
        layers: containers.len() as u32,
        format,
    })
}

/// Decoded, reduced, resized and RGBA8-expanded layer
fn prepare_layer(
    source: SourceImage,
    texture_type: TextureType,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> RenderResult<ImageData> {
    let image = source.into_image()?;
    let image = reduce_channels(image, texture_type, false)?;
    let image = image.downscale_to_fit(max_width, max_height)?;
    Ok(image.expand_channels(4))
}

fn load_raster_layers(
    env: &mut LoaderEnv<'_>,
    filenames: &[&str],
    sources: Vec<Option<SourceImage>>,
    texture_type: TextureType,
    max_width: Option<u32>,
    max_height: Option<u32>,
    generator: &mut dyn FnMut(u32, u32) -> ImageData,
) -> RenderResult<TextureArray> {
    let mut layers: Vec<Option<ImageData>> = Vec::with_capacity(sources.len());
    for (name, source) in filenames.iter().zip(sources) {
        let prepared = source.and_then(|source| {
            prepare_layer(source, texture_type, max_width, max_height)
                .map_err(|e| log::warn!("Array layer {} unusable: {}", name, e))
                .ok()
        });
        layers.push(prepared);
    }

    let (width, height) = layers
        .iter()
        .flatten()
        .next()
        .map(|image| (image.width, image.height))
        .ok_or_else(|| {
            RenderError::ResourceCreationFailed(format!("no layer of array [{}] could be loaded", filenames.join(", ")))
        })?;
    let mip_count = mip_count_for(width, height, texture_type);

    let mut images = Vec::with_capacity(layers.len());
    for (index, (name, layer)) in filenames.iter().zip(layers).enumerate() {
        let image = match layer {
            Some(image) => image,
            None => {
                log::warn!("Using default texture for array layer {} ({})", index, name);
                generator(width, height).expand_channels(4)
            }
        };
        if (image.width, image.height) != (width, height) {
            return Err(RenderError::InvalidOperation(format!(
                "Array layer {} ({}) is {}x{}, layer 0 is {}x{}",
                index, name, image.width, image.height, width, height
            )));
        }
        images.push(image);
    }

    let level = env.overrides.lookup_all(filenames.iter().copied());
    let format = choose_format(env.best, TARGET, texture_type, PixelFormat::Rgba8, level);
    if !format.is_compressed() && !env.backend.format_matrix().is_sampled(TARGET, PixelFormat::Rgba8) {
        return Err(RenderError::UnsupportedFormat {
            format: PixelFormat::Rgba8,
            reason: "not sampled on texture arrays".to_string(),
        });
    }

    let desc = TextureDesc {
        width,
        height,
        mip_count,
        layers: images.len() as u32,
        format,
        target: TARGET,
        debug_name: filenames.join(","),
    };
    let fail = |e: RenderError| {
        log::error!("Failed to load array [{}] as {:?} ({}x{}): {}", filenames.join(", "), format, width, height, e);
        e
    };
    let mut pending = PendingTexture::create(&mut *env.backend, &desc).map_err(fail)?;

    for (layer, image) in images.into_iter().enumerate() {
        let mut level_image = image;
        for level in 0..mip_count {
            if level > 0 {
                level_image = next_level(&level_image, texture_type).map_err(fail)?;
            }
            upload_level(&mut pending, &level_image, format, layer as u32, level).map_err(fail)?;
        }
    }

    let id = pending
        .commit()
        .ok_or_else(|| RenderError::ResourceCreationFailed("texture array was released during upload".to_string()))?;
    log::debug!(
        "Loaded array of {} layer(s) as {:?} {}x{} ({} mips)",
        desc.layers,
        format,
        width,
        height,
        mip_count
    );
    Ok(TextureArray {
        id,
        width,
        height,
        mip_count,
        layers: desc.layers,
        format,
    })
}
