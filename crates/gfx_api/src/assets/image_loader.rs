//! Image loading and CPU-side pixel operations
//!
//! [`ImageData`] holds tightly packed 8-bit pixels with 1 to 4 channels. The
//! texture loader uses it for every step that happens before upload: channel
//! reduction and expansion, downscaling, and mip generation.

use image::{imageops::FilterType, DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

use super::AssetError;

/// Loaded image data ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Tightly packed pixel data, row-major, `channels` bytes per pixel
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of color channels (1 to 4)
    pub channels: u8,
}

impl ImageData {
    /// Wrap raw pixels, validating the buffer length
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, AssetError> {
        if !(1..=4).contains(&channels) {
            return Err(AssetError::UnsupportedFormat(format!("{channels} channel image")));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(AssetError::InvalidData {
                path: "<memory>".to_string(),
                reason: format!(
                    "{}x{}x{} image needs {} bytes, got {}",
                    width,
                    height,
                    channels,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self { data, width, height, channels })
    }

    /// Decode an encoded image (PNG) keeping its channel count
    ///
    /// 16-bit and floating point images are converted to 8 bits per channel.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)?;
        let data = Self::from_dynamic(img);
        log::debug!(
            "Decoded image {}x{} with {} channel(s)",
            data.width,
            data.height,
            data.channels
        );
        Ok(data)
    }

    /// Convert a decoded `image` crate image
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let channels = img.color().channel_count().clamp(1, 4);
        let (width, height) = (img.width(), img.height());
        let data = match (img, channels) {
            (DynamicImage::ImageLuma8(buf), _) => buf.into_raw(),
            (DynamicImage::ImageLumaA8(buf), _) => buf.into_raw(),
            (DynamicImage::ImageRgb8(buf), _) => buf.into_raw(),
            (DynamicImage::ImageRgba8(buf), _) => buf.into_raw(),
            (other, 1) => other.to_luma8().into_raw(),
            (other, 2) => other.to_luma_alpha8().into_raw(),
            (other, 3) => other.to_rgb8().into_raw(),
            (other, _) => other.to_rgba8().into_raw(),
        };
        Self { data, width, height, channels }
    }

    /// Convert into an `image` crate image of the matching color type
    pub fn to_dynamic(&self) -> Result<DynamicImage, AssetError> {
        let invalid = || AssetError::InvalidData {
            path: "<memory>".to_string(),
            reason: "pixel buffer does not match dimensions".to_string(),
        };
        let (w, h, data) = (self.width, self.height, self.data.clone());
        Ok(match self.channels {
            1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, data).ok_or_else(invalid)?),
            2 => DynamicImage::ImageLumaA8(GrayAlphaImage::from_raw(w, h, data).ok_or_else(invalid)?),
            3 => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, data).ok_or_else(invalid)?),
            _ => DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, data).ok_or_else(invalid)?),
        })
    }

    /// Create a solid color image (useful for testing and defaults)
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        let mut data = Vec::with_capacity(pixel_count * 4);

        for _ in 0..pixel_count {
            data.extend_from_slice(&color);
        }

        Self {
            data,
            width,
            height,
            channels: 4,
        }
    }

    /// Create an RGBA checkerboard with square cells of `cell` pixels
    pub fn checkerboard(width: u32, height: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let color = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
                data.extend_from_slice(&color);
            }
        }
        Self { data, width, height, channels: 4 }
    }

    /// Get the size of the image data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if image dimensions are power of two
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.channels as usize)
    }

    /// Single-channel luminance (Rec. 601 weights)
    pub fn to_luma(&self) -> Self {
        let data = match self.channels {
            1 => self.data.clone(),
            2 => self.pixels().map(|p| p[0]).collect(),
            _ => self
                .pixels()
                .map(|p| {
                    let l = 0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]);
                    l.round().clamp(0.0, 255.0) as u8
                })
                .collect(),
        };
        Self { data, width: self.width, height: self.height, channels: 1 }
    }

    /// Single-channel image holding channel `channel`
    pub fn extract_channel(&self, channel: u8) -> Result<Self, AssetError> {
        if channel >= self.channels {
            return Err(AssetError::InvalidData {
                path: "<memory>".to_string(),
                reason: format!("channel {} requested from {} channel image", channel, self.channels),
            });
        }
        let data = self.pixels().map(|p| p[channel as usize]).collect();
        Ok(Self { data, width: self.width, height: self.height, channels: 1 })
    }

    /// Keep the first `channels` channels
    pub fn truncate_channels(&self, channels: u8) -> Self {
        if channels >= self.channels {
            return self.clone();
        }
        let keep = channels as usize;
        let data = self.pixels().flat_map(|p| p[..keep].iter().copied()).collect();
        Self { data, width: self.width, height: self.height, channels }
    }

    /// Raise the channel count
    ///
    /// Gray replicates into color, two-channel data becomes red/green with a
    /// zero blue, and missing alpha is opaque.
    pub fn expand_channels(&self, channels: u8) -> Self {
        if channels <= self.channels {
            return self.clone();
        }
        let keep = channels as usize;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * keep);
        for p in self.pixels() {
            let rgba = match self.channels {
                1 => [p[0], p[0], p[0], 255],
                2 => [p[0], p[1], 0, 255],
                3 => [p[0], p[1], p[2], 255],
                _ => [p[0], p[1], p[2], p[3]],
            };
            data.extend_from_slice(&rgba[..keep]);
        }
        Self { data, width: self.width, height: self.height, channels }
    }

    /// Dimensions after fitting inside `max_width` x `max_height`, keeping aspect
    pub fn fit_dimensions(&self, max_width: Option<u32>, max_height: Option<u32>) -> (u32, u32) {
        let max_w = max_width.filter(|&w| w > 0).unwrap_or(u32::MAX);
        let max_h = max_height.filter(|&h| h > 0).unwrap_or(u32::MAX);
        if self.width <= max_w && self.height <= max_h {
            return (self.width, self.height);
        }
        let scale = (f64::from(max_w) / f64::from(self.width)).min(f64::from(max_h) / f64::from(self.height));
        let w = (f64::from(self.width) * scale).floor().max(1.0) as u32;
        let h = (f64::from(self.height) * scale).floor().max(1.0) as u32;
        (w.min(max_w), h.min(max_h))
    }

    /// Downscale to fit the limits, keeping aspect; no-op when already inside
    pub fn downscale_to_fit(&self, max_width: Option<u32>, max_height: Option<u32>) -> Result<Self, AssetError> {
        let (w, h) = self.fit_dimensions(max_width, max_height);
        if (w, h) == (self.width, self.height) {
            return Ok(self.clone());
        }
        log::debug!("Downscaling {}x{} to {}x{}", self.width, self.height, w, h);
        let resized = self.to_dynamic()?.resize_exact(w, h, FilterType::Triangle);
        let mut out = Self::from_dynamic(resized);
        out.channels = self.channels;
        Ok(out)
    }

    /// Half-size box filter, clamped to 1x1
    ///
    /// Odd edges fold the last row/column into the final output texel.
    pub fn half_size(&self) -> Self {
        let (w, h) = (self.width, self.height);
        let nw = (w / 2).max(1);
        let nh = (h / 2).max(1);
        let c = self.channels as usize;
        let mut data = Vec::with_capacity(nw as usize * nh as usize * c);

        for y in 0..nh {
            let y0 = (y * 2).min(h - 1);
            let y1 = (y * 2 + 1).min(h - 1);
            for x in 0..nw {
                let x0 = (x * 2).min(w - 1);
                let x1 = (x * 2 + 1).min(w - 1);
                for ch in 0..c {
                    let at = |px: u32, py: u32| u32::from(self.data[(py as usize * w as usize + px as usize) * c + ch]);
                    let sum = at(x0, y0) + at(x1, y0) + at(x0, y1) + at(x1, y1);
                    data.push(((sum + 2) / 4) as u8);
                }
            }
        }

        Self { data, width: nw, height: nh, channels: self.channels }
    }

    /// Pixel at (x, y) expanded to RGBA
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let c = self.channels as usize;
        let i = (y as usize * self.width as usize + x as usize) * c;
        let p = &self.data[i..i + c];
        match self.channels {
            1 => [p[0], p[0], p[0], 255],
            2 => [p[0], p[1], 0, 255],
            3 => [p[0], p[1], p[2], 255],
            _ => [p[0], p[1], p[2], p[3]],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]);
        assert_eq!(img.width, 4);
        assert_eq!(img.height, 4);
        assert_eq!(img.channels, 4);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_png_decode_keeps_channel_count() {
        let gray = encode_png(DynamicImage::ImageLuma8(GrayImage::new(3, 2)));
        let rgb = encode_png(DynamicImage::ImageRgb8(RgbImage::new(3, 2)));
        assert_eq!(ImageData::from_bytes(&gray).unwrap().channels, 1);
        assert_eq!(ImageData::from_bytes(&rgb).unwrap().channels, 3);
        assert!(ImageData::from_bytes(b"not a png").is_err());
    }

    #[test]
    fn test_luma_and_extract() {
        let img = ImageData::new(1, 1, 4, vec![255, 255, 255, 7]).unwrap();
        assert_eq!(img.to_luma().data, vec![255]);
        assert_eq!(img.extract_channel(3).unwrap().data, vec![7]);
        assert!(img.truncate_channels(3).extract_channel(3).is_err());
    }

    #[test]
    fn test_expand_channels() {
        let gray = ImageData::new(1, 1, 1, vec![9]).unwrap();
        assert_eq!(gray.expand_channels(4).data, vec![9, 9, 9, 255]);
        let rg = ImageData::new(1, 1, 2, vec![1, 2]).unwrap();
        assert_eq!(rg.expand_channels(3).data, vec![1, 2, 0]);
        let rgb = ImageData::new(1, 1, 3, vec![1, 2, 3]).unwrap();
        assert_eq!(rgb.expand_channels(4).data, vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_half_size_chain_reaches_one() {
        let mut img = ImageData::solid_color(256, 64, [10, 20, 30, 40]);
        let mut steps = 0;
        while img.width > 1 || img.height > 1 {
            img = img.half_size();
            steps += 1;
        }
        assert_eq!(steps, 8);
        assert_eq!(img.data, vec![10, 20, 30, 40]);

        let odd = ImageData::new(3, 1, 1, vec![0, 100, 200]).unwrap().half_size();
        assert_eq!((odd.width, odd.height), (1, 1));
    }

    #[test]
    fn test_fit_dimensions_keeps_aspect() {
        let img = ImageData::solid_color(512, 256, [0; 4]);
        assert_eq!(img.fit_dimensions(Some(128), None), (128, 64));
        assert_eq!(img.fit_dimensions(None, Some(512)), (512, 256));
        let small = img.downscale_to_fit(Some(64), Some(64)).unwrap();
        assert_eq!((small.width, small.height, small.channels), (64, 32, 4));
    }
}
