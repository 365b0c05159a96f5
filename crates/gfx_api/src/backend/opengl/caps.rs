//! Capability detection for OpenGL and OpenGL ES contexts

use std::collections::HashSet;

use super::driver::{gl, GlDriver};
use crate::backend::BackendLimits;
use crate::error::{RenderError, RenderResult};
use crate::format::{CompressionFamily, FormatMatrix, FormatTarget, PixelFormat, PixelFormatUsage};

/// Context version parsed from `GL_VERSION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// OpenGL ES context
    pub es: bool,
}

impl GlVersion {
    /// Lowest desktop version the backend runs on
    pub const MIN_DESKTOP: (u32, u32) = (3, 0);
    /// Lowest ES version the backend runs on
    pub const MIN_ES: (u32, u32) = (3, 0);

    /// Parse strings such as `4.6.0 NVIDIA 535.54` or `OpenGL ES 3.2 Mesa 23.1`
    pub fn parse(version: &str) -> Option<Self> {
        let trimmed = version.trim();
        let (es, rest) = match trimmed.strip_prefix("OpenGL ES") {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let start = rest.find(|c: char| c.is_ascii_digit())?;
        let mut numbers = rest[start..]
            .split(|c: char| !c.is_ascii_digit())
            .take(2)
            .map(str::parse::<u32>);
        let major = numbers.next()?.ok()?;
        let minor = numbers.next().and_then(Result::ok).unwrap_or(0);
        Some(Self { major, minor, es })
    }

    /// Version as a comparable pair
    pub fn pair(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    /// Desktop context of at least `major.minor`
    pub fn desktop_at_least(&self, major: u32, minor: u32) -> bool {
        !self.es && self.pair() >= (major, minor)
    }

    /// ES context of at least `major.minor`
    pub fn es_at_least(&self, major: u32, minor: u32) -> bool {
        self.es && self.pair() >= (major, minor)
    }

    fn minimum(&self) -> (u32, u32) {
        if self.es {
            Self::MIN_ES
        } else {
            Self::MIN_DESKTOP
        }
    }
}

impl std::fmt::Display for GlVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.es {
            write!(f, "OpenGL ES {}.{}", self.major, self.minor)
        } else {
            write!(f, "OpenGL {}.{}", self.major, self.minor)
        }
    }
}

/// Everything learned about the context at initialization
#[derive(Debug, Clone)]
pub struct GlCaps {
    /// Context version
    pub version: GlVersion,
    /// Advertised extensions
    pub extensions: HashSet<String>,
    /// Implementation limits
    pub limits: BackendLimits,
    /// Capability matrix after the ETC fallback rule
    pub matrix: FormatMatrix,
    /// Fragment shaders support high-precision float and int
    pub fragment_high_precision: bool,
}

impl GlCaps {
    /// Whether an extension is advertised
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }
}

fn any_extension(extensions: &HashSet<String>, names: &[&str]) -> bool {
    names.iter().any(|n| extensions.contains(*n))
}

/// Whether a compression family (or BGRA) can be used at all
fn format_available(format: PixelFormat, version: GlVersion, extensions: &HashSet<String>) -> bool {
    match format.family() {
        CompressionFamily::Uncompressed if format == PixelFormat::Bgra8 => any_extension(
            extensions,
            &["GL_EXT_texture_format_BGRA8888", "GL_APPLE_texture_format_BGRA8888"],
        ),
        CompressionFamily::Uncompressed => true,
        CompressionFamily::S3tc => {
            let partial: &[&str] = match format {
                PixelFormat::Bc1 => &["GL_EXT_texture_compression_dxt1", "GL_ANGLE_texture_compression_dxt1"],
                PixelFormat::Bc2 => &["GL_ANGLE_texture_compression_dxt3"],
                _ => &["GL_ANGLE_texture_compression_dxt5"],
            };
            any_extension(extensions, &["GL_EXT_texture_compression_s3tc"]) || any_extension(extensions, partial)
        }
        CompressionFamily::Rgtc => {
            version.desktop_at_least(3, 0)
                || any_extension(
                    extensions,
                    &["GL_ARB_texture_compression_rgtc", "GL_EXT_texture_compression_rgtc"],
                )
        }
        CompressionFamily::Bptc => {
            version.desktop_at_least(4, 2)
                || any_extension(
                    extensions,
                    &["GL_ARB_texture_compression_bptc", "GL_EXT_texture_compression_bptc"],
                )
        }
        CompressionFamily::Etc1 => any_extension(extensions, &["GL_OES_compressed_ETC1_RGB8_texture"]),
        CompressionFamily::Etc2 => {
            version.es_at_least(3, 0)
                || version.desktop_at_least(4, 3)
                || any_extension(extensions, &["GL_ARB_ES3_compatibility"])
        }
        CompressionFamily::Astc => {
            version.es_at_least(3, 2)
                || any_extension(
                    extensions,
                    &["GL_KHR_texture_compression_astc_ldr", "GL_OES_texture_compression_astc"],
                )
        }
    }
}

/// ETC1 has no array form
fn array_available(format: PixelFormat) -> bool {
    format.family() != CompressionFamily::Etc1
}

/// Whether `glGetInternalformativ` can answer usage queries
fn has_internalformat_query(version: GlVersion, extensions: &HashSet<String>) -> bool {
    version.desktop_at_least(4, 3) || extensions.contains("GL_ARB_internalformat_query2")
}

fn target_enum(target: FormatTarget) -> u32 {
    match target {
        FormatTarget::Texture2D => gl::TEXTURE_2D,
        FormatTarget::Texture2DArray => gl::TEXTURE_2D_ARRAY,
    }
}

fn query_usage(driver: &dyn GlDriver, target: FormatTarget, format: PixelFormat) -> PixelFormatUsage {
    let target = target_enum(target);
    let internal = format.gl_internal_format();
    if driver.get_internalformat(target, internal, gl::INTERNALFORMAT_SUPPORTED) != gl::TRUE {
        return PixelFormatUsage::empty();
    }

    let supported = |pname| matches!(driver.get_internalformat(target, internal, pname), gl::FULL_SUPPORT | gl::CAVEAT_SUPPORT);
    let mut usage = PixelFormatUsage::empty();
    if supported(gl::FRAGMENT_TEXTURE) {
        usage |= PixelFormatUsage::SAMPLED_IMAGE;
    }
    if !format.is_compressed() && !format.is_depth() && supported(gl::SHADER_IMAGE_LOAD) {
        usage |= PixelFormatUsage::STORAGE_IMAGE;
    }
    if format.is_depth() && driver.get_internalformat(target, internal, gl::DEPTH_RENDERABLE) == gl::TRUE {
        usage |= PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT;
    }
    usage
}

/// Fill the capability matrix for a context
pub fn build_matrix(driver: &dyn GlDriver, version: GlVersion, extensions: &HashSet<String>) -> FormatMatrix {
    let query = has_internalformat_query(version, extensions);
    if !query {
        log::info!("No internalformat query on {}; assuming sampled-only support", version);
    }

    let mut matrix = FormatMatrix::new();
    for format in PixelFormat::ALL {
        if !format_available(format, version, extensions) {
            continue;
        }
        for target in FormatTarget::ALL {
            if target == FormatTarget::Texture2DArray && !array_available(format) {
                continue;
            }
            let usage = if query {
                query_usage(driver, target, format)
            } else {
                PixelFormatUsage::SAMPLED_IMAGE
            };
            matrix.set(target, format, usage);
        }
    }

    // ETC is only used where the equivalent BC format is missing
    matrix.apply_etc_fallback_rule();
    matrix
}

fn fragment_high_precision(driver: &dyn GlDriver, version: GlVersion) -> bool {
    if !version.es {
        return true;
    }
    let supported = |ty| {
        driver
            .shader_precision_format(gl::FRAGMENT_SHADER, ty)
            .is_some_and(|p| p.is_supported())
    };
    supported(gl::HIGH_FLOAT) && supported(gl::HIGH_INT)
}

/// Query version, extensions, limits, matrix and precision
pub fn detect(driver: &dyn GlDriver) -> RenderResult<GlCaps> {
    let version_string = driver
        .get_string(gl::VERSION)
        .ok_or_else(|| RenderError::InitializationFailed("GL_VERSION is not available".to_string()))?;
    let version = GlVersion::parse(&version_string)
        .ok_or_else(|| RenderError::InitializationFailed(format!("Unrecognized GL_VERSION '{version_string}'")))?;

    let (min_major, min_minor) = version.minimum();
    if version.pair() < (min_major, min_minor) {
        return Err(RenderError::UnsupportedVersion {
            found: version_string,
            required: format!("{}{}.{}", if version.es { "OpenGL ES " } else { "OpenGL " }, min_major, min_minor),
        });
    }
    if version.es && !driver.has_shader_compiler() {
        return Err(RenderError::NoShaderCompiler);
    }

    log::info!(
        "{} ({} / {})",
        version,
        driver.get_string(gl::VENDOR).unwrap_or_default(),
        driver.get_string(gl::RENDERER).unwrap_or_default()
    );

    let extensions: HashSet<String> = driver.extensions().into_iter().collect();
    let limits = BackendLimits {
        max_texture_size: driver.get_integer(gl::MAX_TEXTURE_SIZE).max(1) as u32,
        max_array_layers: driver.get_integer(gl::MAX_ARRAY_TEXTURE_LAYERS).max(1) as u32,
        max_samples: driver.get_integer(gl::MAX_SAMPLES).max(0) as u32,
    };
    let matrix = build_matrix(driver, version, &extensions);
    let fragment_high_precision = fragment_high_precision(driver, version);
    if !fragment_high_precision {
        log::info!("Fragment shaders lack high precision; shared uniforms will be renamed");
    }

    Ok(GlCaps {
        version,
        extensions,
        limits,
        matrix,
        fragment_high_precision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_s3tc_gated_per_format() {
        let es = GlVersion::parse("OpenGL ES 3.0 ANGLE").unwrap();
        let dxt5 = extensions(&["GL_ANGLE_texture_compression_dxt5"]);
        assert!(format_available(PixelFormat::Bc3, es, &dxt5));
        assert!(!format_available(PixelFormat::Bc1, es, &dxt5));
        assert!(!format_available(PixelFormat::Bc2, es, &dxt5));

        let dxt1 = extensions(&["GL_EXT_texture_compression_dxt1", "GL_ANGLE_texture_compression_dxt3"]);
        assert!(format_available(PixelFormat::Bc1, es, &dxt1));
        assert!(format_available(PixelFormat::Bc2, es, &dxt1));
        assert!(!format_available(PixelFormat::Bc3, es, &dxt1));

        let full = extensions(&["GL_EXT_texture_compression_s3tc"]);
        for format in [PixelFormat::Bc1, PixelFormat::Bc2, PixelFormat::Bc3] {
            assert!(format_available(format, es, &full), "{format:?}");
        }
    }
}
