//! Capability matrix and best-format selection

use std::collections::HashMap;

use super::{FormatTarget, PixelFormat, PixelFormatUsage};
use crate::texture::TextureType;

/// Per (target, format) usage table filled once by a backend at initialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatMatrix {
    usage: HashMap<(FormatTarget, PixelFormat), PixelFormatUsage>,
}

impl FormatMatrix {
    /// Empty matrix: nothing supported
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the usage mask for a pair, replacing any earlier value
    pub fn set(&mut self, target: FormatTarget, format: PixelFormat, usage: PixelFormatUsage) {
        if usage.is_empty() {
            self.usage.remove(&(target, format));
        } else {
            self.usage.insert((target, format), usage);
        }
    }

    /// Builder form of [`FormatMatrix::set`] for both targets
    pub fn with(mut self, format: PixelFormat, usage: PixelFormatUsage) -> Self {
        for target in FormatTarget::ALL {
            self.set(target, format, usage);
        }
        self
    }

    /// Usage mask for a pair (empty when unsupported)
    pub fn usage(&self, target: FormatTarget, format: PixelFormat) -> PixelFormatUsage {
        self.usage.get(&(target, format)).copied().unwrap_or_default()
    }

    /// Whether every bit in `usage` is supported
    pub fn supports(&self, target: FormatTarget, format: PixelFormat, usage: PixelFormatUsage) -> bool {
        self.usage(target, format).contains(usage)
    }

    /// Whether the format can be sampled on the target
    pub fn is_sampled(&self, target: FormatTarget, format: PixelFormat) -> bool {
        self.supports(target, format, PixelFormatUsage::SAMPLED_IMAGE)
    }

    /// Sampled formats on a target, in [`PixelFormat::ALL`] order
    pub fn sampled_formats(&self, target: FormatTarget) -> Vec<PixelFormat> {
        PixelFormat::ALL
            .iter()
            .copied()
            .filter(|&f| self.is_sampled(target, f))
            .collect()
    }

    /// Drop ETC formats wherever the equivalent BC format is available
    pub fn apply_etc_fallback_rule(&mut self) {
        const PAIRS: [(PixelFormat, &[PixelFormat]); 4] = [
            (PixelFormat::Bc1, &[PixelFormat::Etc2Rgb8, PixelFormat::Etc1]),
            (PixelFormat::Bc3, &[PixelFormat::Etc2Rgba8]),
            (PixelFormat::Bc4, &[PixelFormat::EacR11]),
            (PixelFormat::Bc5, &[PixelFormat::EacRg11]),
        ];
        for target in FormatTarget::ALL {
            for (bc, etc_formats) in PAIRS {
                if self.is_sampled(target, bc) {
                    for &etc in etc_formats {
                        self.usage.remove(&(target, etc));
                    }
                }
            }
        }
    }
}

/// Compressed candidates per texture class, most preferred first
fn candidates(texture_type: TextureType, three_channel: bool) -> &'static [PixelFormat] {
    const RGBA: &[PixelFormat] = &[
        PixelFormat::Bc7,
        PixelFormat::Astc4x4,
        PixelFormat::Bc3,
        PixelFormat::Etc2Rgba8,
    ];
    const RGB: &[PixelFormat] = &[
        PixelFormat::Bc7,
        PixelFormat::Astc4x4,
        PixelFormat::Bc1,
        PixelFormat::Etc2Rgb8,
    ];
    const SINGLE: &[PixelFormat] = &[PixelFormat::Bc4, PixelFormat::EacR11];

    match texture_type {
        TextureType::UserInterface => &[],
        TextureType::GameTexture => RGBA,
        TextureType::NormalMap if three_channel => RGB,
        TextureType::NormalMap => RGBA,
        TextureType::SpecularMap | TextureType::AlphaMask | TextureType::HeightMap => SINGLE,
    }
}

/// Supported real-time compressed formats per (target, texture type)
///
/// Computed once from the matrix after backend initialization.
#[derive(Debug, Clone, Default)]
pub struct BestFormats {
    table: HashMap<(FormatTarget, TextureType), Vec<PixelFormat>>,
}

impl BestFormats {
    /// Filter each class's candidate list down to what the matrix samples
    pub fn compute(matrix: &FormatMatrix) -> Self {
        let mut table = HashMap::new();
        for target in FormatTarget::ALL {
            let three_channel = matrix.is_sampled(target, PixelFormat::Rgb8);
            for texture_type in TextureType::ALL {
                let supported: Vec<PixelFormat> = candidates(texture_type, three_channel)
                    .iter()
                    .copied()
                    .filter(|&f| matrix.is_sampled(target, f))
                    .collect();
                log::debug!("Best formats for {:?}/{:?}: {:?}", target, texture_type, supported);
                table.insert((target, texture_type), supported);
            }
        }
        Self { table }
    }

    /// Supported candidates for a class, most preferred first
    pub fn candidates(&self, target: FormatTarget, texture_type: TextureType) -> &[PixelFormat] {
        self.table
            .get(&(target, texture_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Most preferred supported candidate
    pub fn best(&self, target: FormatTarget, texture_type: TextureType) -> Option<PixelFormat> {
        self.candidates(target, texture_type).first().copied()
    }

    /// Most preferred supported candidate in the high-quality tier
    pub fn best_high_quality(&self, target: FormatTarget, texture_type: TextureType) -> Option<PixelFormat> {
        self.candidates(target, texture_type)
            .iter()
            .copied()
            .find(|f| f.is_high_quality())
    }
}
