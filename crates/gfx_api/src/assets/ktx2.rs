//! Minimal KTX2 container support
//!
//! Reads single-layer, single-face KTX2 files without supercompression. The
//! level index is reordered so that `levels[0]` is always the full-size
//! image, matching how the texture loader walks mip chains.

use super::AssetError;
use crate::format::PixelFormat;

const IDENTIFIER: [u8; 12] = [0xAB, 0x4B, 0x54, 0x58, 0x20, 0x32, 0x30, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A];
const HEADER_LEN: usize = 80;
const LEVEL_ENTRY_LEN: usize = 24;
/// Largest level 0 edge accepted from a container
pub const MAX_DIMENSION: u32 = 1 << 16;

/// A decoded KTX2 container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ktx2Texture {
    /// Stored pixel format
    pub format: PixelFormat,
    /// Width of level 0
    pub width: u32,
    /// Height of level 0
    pub height: u32,
    /// Level payloads, largest first
    pub levels: Vec<Vec<u8>>,
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from(read_u32(bytes, offset)) | (u64::from(read_u32(bytes, offset + 4)) << 32)
}

impl Ktx2Texture {
    /// Whether the bytes start with the KTX2 identifier
    pub fn is_ktx2(bytes: &[u8]) -> bool {
        bytes.len() >= IDENTIFIER.len() && bytes[..IDENTIFIER.len()] == IDENTIFIER
    }

    /// Parse a container held in memory
    pub fn parse(path: &str, bytes: &[u8]) -> Result<Self, AssetError> {
        let invalid = |reason: String| AssetError::InvalidData { path: path.to_string(), reason };

        if bytes.len() < HEADER_LEN || !Self::is_ktx2(bytes) {
            return Err(invalid("missing KTX2 identifier".to_string()));
        }

        let vk_format = read_u32(bytes, 12);
        let width = read_u32(bytes, 20);
        let height = read_u32(bytes, 24).max(1);
        let depth = read_u32(bytes, 28);
        let layers = read_u32(bytes, 32);
        let faces = read_u32(bytes, 36);
        let level_count = read_u32(bytes, 40).max(1) as usize;
        let supercompression = read_u32(bytes, 44);

        let format = PixelFormat::from_vk_format(vk_format)
            .ok_or_else(|| AssetError::UnsupportedFormat(format!("{path}: vkFormat {vk_format}")))?;
        if width == 0 {
            return Err(invalid("zero width".to_string()));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(invalid(format!("{width}x{height} exceeds {MAX_DIMENSION}")));
        }
        let max_levels = (32 - width.max(height).leading_zeros()) as usize;
        if level_count > max_levels {
            return Err(invalid(format!(
                "{level_count} levels for {width}x{height}, at most {max_levels}"
            )));
        }
        if depth > 1 || layers > 1 || faces != 1 {
            return Err(AssetError::UnsupportedFormat(format!(
                "{path}: only single 2D images are supported (depth {depth}, layers {layers}, faces {faces})"
            )));
        }
        if supercompression != 0 {
            return Err(AssetError::UnsupportedFormat(format!(
                "{path}: supercompression scheme {supercompression}"
            )));
        }

        let index_end = HEADER_LEN + level_count * LEVEL_ENTRY_LEN;
        if bytes.len() < index_end {
            return Err(invalid("truncated level index".to_string()));
        }

        let mut levels = Vec::with_capacity(level_count);
        for level in 0..level_count {
            let entry = HEADER_LEN + level * LEVEL_ENTRY_LEN;
            let outside = || invalid(format!("level {level} lies outside the file"));
            let offset = usize::try_from(read_u64(bytes, entry)).map_err(|_| outside())?;
            let length = usize::try_from(read_u64(bytes, entry + 8)).map_err(|_| outside())?;
            let w = (width >> level).max(1);
            let h = (height >> level).max(1);
            let expected = format
                .checked_level_size(w, h)
                .ok_or_else(|| invalid(format!("level {level} size overflows")))?;
            if length != expected {
                return Err(invalid(format!("level {level} is {length} bytes, expected {expected}")));
            }
            let end = offset.checked_add(length).ok_or_else(outside)?;
            let data = bytes.get(offset..end).ok_or_else(outside)?;
            levels.push(data.to_vec());
        }

        log::debug!("Parsed KTX2 {} {:?} {}x{} with {} level(s)", path, format, width, height, levels.len());
        Ok(Self { format, width, height, levels })
    }

    /// Dimensions of a level
    pub fn level_dimensions(&self, level: usize) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    /// Serialize to KTX2 bytes (no DFD or key/value data)
    pub fn to_bytes(&self) -> Vec<u8> {
        let level_count = self.levels.len();
        let mut out = Vec::new();
        out.extend_from_slice(&IDENTIFIER);
        let header = [
            self.format.vk_format().as_raw() as u32,
            1,
            self.width,
            self.height,
            0,
            0,
            1,
            level_count as u32,
            0,
        ];
        for value in header {
            out.extend_from_slice(&value.to_le_bytes());
        }
        // dfd, kvd, sgd offsets/lengths all zero
        out.extend_from_slice(&[0u8; 32]);

        // Mip data is stored smallest first after the index
        let mut offset = (HEADER_LEN + level_count * LEVEL_ENTRY_LEN) as u64;
        let mut offsets = vec![0u64; level_count];
        for level in (0..level_count).rev() {
            offsets[level] = offset;
            offset += self.levels[level].len() as u64;
        }
        for (level, data) in self.levels.iter().enumerate() {
            out.extend_from_slice(&offsets[level].to_le_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        }
        for data in self.levels.iter().rev() {
            out.extend_from_slice(data);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ktx2Texture {
        Ktx2Texture {
            format: PixelFormat::Bc1,
            width: 8,
            height: 4,
            levels: vec![vec![1; 16], vec![2; 8], vec![3; 8], vec![4; 8]],
        }
    }

    #[test]
    fn test_parse_written_container() {
        let tex = sample();
        let bytes = tex.to_bytes();
        assert!(Ktx2Texture::is_ktx2(&bytes));
        let parsed = Ktx2Texture::parse("a.ktx2", &bytes).unwrap();
        assert_eq!(parsed, tex);
        assert_eq!(parsed.level_dimensions(3), (1, 1));
    }

    #[test]
    fn test_rejects_bad_level_size() {
        let mut tex = sample();
        tex.levels[1] = vec![0; 4];
        let bytes = tex.to_bytes();
        assert!(Ktx2Texture::parse("bad.ktx2", &bytes).is_err());
    }

    fn patch(bytes: &mut [u8], offset: usize, value: &[u8]) {
        bytes[offset..offset + value.len()].copy_from_slice(value);
    }

    #[test]
    fn test_rejects_huge_dimensions() {
        let mut bytes = sample().to_bytes();
        patch(&mut bytes, 20, &u32::MAX.to_le_bytes());
        patch(&mut bytes, 24, &u32::MAX.to_le_bytes());
        assert!(matches!(
            Ktx2Texture::parse("huge.ktx2", &bytes),
            Err(AssetError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_rejects_more_levels_than_dimensions_allow() {
        let tex = Ktx2Texture {
            format: PixelFormat::Bc1,
            width: 1,
            height: 1,
            levels: vec![vec![0; 8]],
        };
        let mut bytes = tex.to_bytes();
        patch(&mut bytes, 40, &40u32.to_le_bytes());
        assert!(Ktx2Texture::parse("deep.ktx2", &bytes).is_err());

        // 8x4 allows 4 levels, 5 is one too many
        let mut bytes = sample().to_bytes();
        patch(&mut bytes, 40, &5u32.to_le_bytes());
        assert!(Ktx2Texture::parse("deep.ktx2", &bytes).is_err());
    }

    #[test]
    fn test_rejects_level_offset_overflow() {
        let mut bytes = sample().to_bytes();
        patch(&mut bytes, HEADER_LEN, &u64::MAX.to_le_bytes());
        assert!(Ktx2Texture::parse("wrap.ktx2", &bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_level_data() {
        let bytes = sample().to_bytes();
        assert!(Ktx2Texture::parse("short.ktx2", &bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn test_rejects_non_ktx2() {
        assert!(Ktx2Texture::parse("x.ktx2", &[0u8; 100]).is_err());
        assert!(!Ktx2Texture::is_ktx2(b"\x89PNG"));
    }
}
