//! S3TC and RGTC (BC1-BC5) block codecs

use super::Block;
use crate::format::PixelFormat;

fn rgb565_to_rgb888(c: u16) -> [u8; 3] {
    let r5 = ((c >> 11) & 0x1f) as u8;
    let g6 = ((c >> 5) & 0x3f) as u8;
    let b5 = (c & 0x1f) as u8;

    // Replicate top bits into low bits to fill 8-bit channels.
    let r = (r5 << 3) | (r5 >> 2);
    let g = (g6 << 2) | (g6 >> 4);
    let b = (b5 << 3) | (b5 >> 2);
    [r, g, b]
}

fn rgb888_to_rgb565(c: [u8; 3]) -> u16 {
    let r = (u16::from(c[0]) * 31 + 127) / 255;
    let g = (u16::from(c[1]) * 63 + 127) / 255;
    let b = (u16::from(c[2]) * 31 + 127) / 255;
    (r << 11) | (g << 5) | b
}

fn lerp_u8(a: u8, b: u8, num: u32, den: u32) -> u8 {
    debug_assert!(num <= den);
    ((u32::from(a) * (den - num) + u32::from(b) * num) / den) as u8
}

fn lerp3(a: [u8; 3], b: [u8; 3], num: u32, den: u32) -> [u8; 3] {
    [lerp_u8(a[0], b[0], num, den), lerp_u8(a[1], b[1], num, den), lerp_u8(a[2], b[2], num, den)]
}

/// Color palette; `opaque_only` forces the four-color interpretation used by BC2/BC3
fn color_palette(color0: u16, color1: u16, opaque_only: bool) -> [[u8; 4]; 4] {
    let c0 = rgb565_to_rgb888(color0);
    let c1 = rgb565_to_rgb888(color1);
    let with_alpha = |c: [u8; 3], a: u8| [c[0], c[1], c[2], a];

    if opaque_only || color0 > color1 {
        [
            with_alpha(c0, 255),
            with_alpha(c1, 255),
            with_alpha(lerp3(c0, c1, 1, 3), 255),
            with_alpha(lerp3(c0, c1, 2, 3), 255),
        ]
    } else {
        [
            with_alpha(c0, 255),
            with_alpha(c1, 255),
            with_alpha(lerp3(c0, c1, 1, 2), 255),
            [0, 0, 0, 0],
        ]
    }
}

fn single_palette(v0: u8, v1: u8) -> [u8; 8] {
    let mut a = [0u8; 8];
    a[0] = v0;
    a[1] = v1;
    if v0 > v1 {
        for i in 1..7 {
            a[i as usize + 1] = lerp_u8(v0, v1, i, 7);
        }
    } else {
        for i in 1..5 {
            a[i as usize + 1] = lerp_u8(v0, v1, i, 5);
        }
        a[6] = 0;
        a[7] = 255;
    }
    a
}

fn distance_rgb(a: [u8; 4], b: [u8; 4]) -> u32 {
    (0..3)
        .map(|i| {
            let d = i32::from(a[i]) - i32::from(b[i]);
            (d * d) as u32
        })
        .sum()
}

/// Encode the color half shared by BC1 and BC3
fn encode_color(block: &Block, out: &mut Vec<u8>) {
    let mut lo = [255u8; 3];
    let mut hi = [0u8; 3];
    for texel in block {
        for c in 0..3 {
            lo[c] = lo[c].min(texel[c]);
            hi[c] = hi[c].max(texel[c]);
        }
    }

    let mut color0 = rgb888_to_rgb565(hi);
    let mut color1 = rgb888_to_rgb565(lo);
    if color0 < color1 {
        std::mem::swap(&mut color0, &mut color1);
    }

    let mut indices = 0u32;
    if color0 != color1 {
        let palette = color_palette(color0, color1, false);
        for (i, texel) in block.iter().enumerate() {
            let best = (0..4)
                .min_by_key(|&p| distance_rgb(*texel, palette[p]))
                .unwrap_or(0);
            indices |= (best as u32) << (2 * i);
        }
    }

    out.extend_from_slice(&color0.to_le_bytes());
    out.extend_from_slice(&color1.to_le_bytes());
    out.extend_from_slice(&indices.to_le_bytes());
}

/// Encode one channel as a BC4 / BC3-alpha block
fn encode_single(values: [u8; 16], out: &mut Vec<u8>) {
    let v0 = values.iter().copied().max().unwrap_or(0);
    let v1 = values.iter().copied().min().unwrap_or(0);

    let mut indices = 0u64;
    if v0 != v1 {
        let palette = single_palette(v0, v1);
        for (i, &v) in values.iter().enumerate() {
            let best = (0..8)
                .min_by_key(|&p| (i32::from(v) - i32::from(palette[p])).unsigned_abs())
                .unwrap_or(0);
            indices |= (best as u64) << (3 * i);
        }
    }

    out.push(v0);
    out.push(v1);
    out.extend_from_slice(&indices.to_le_bytes()[..6]);
}

fn channel(block: &Block, c: usize) -> [u8; 16] {
    let mut values = [0u8; 16];
    for (v, texel) in values.iter_mut().zip(block) {
        *v = texel[c];
    }
    values
}

pub(super) fn encode_bc1(block: &Block, out: &mut Vec<u8>) {
    encode_color(block, out);
}

pub(super) fn encode_bc3(block: &Block, out: &mut Vec<u8>) {
    encode_single(channel(block, 3), out);
    encode_color(block, out);
}

pub(super) fn encode_bc4(block: &Block, out: &mut Vec<u8>) {
    encode_single(channel(block, 0), out);
}

pub(super) fn encode_bc5(block: &Block, out: &mut Vec<u8>) {
    encode_single(channel(block, 0), out);
    encode_single(channel(block, 1), out);
}

fn decode_single(block: &[u8]) -> [u8; 16] {
    let palette = single_palette(block[0], block[1]);
    let mut bits = 0u64;
    for (i, b) in block[2..8].iter().enumerate() {
        bits |= u64::from(*b) << (8 * i);
    }
    let mut out = [0u8; 16];
    for (i, v) in out.iter_mut().enumerate() {
        *v = palette[((bits >> (3 * i)) & 0b111) as usize];
    }
    out
}

fn decode_color(block: &[u8], opaque_only: bool) -> [[u8; 4]; 16] {
    let color0 = u16::from_le_bytes([block[0], block[1]]);
    let color1 = u16::from_le_bytes([block[2], block[3]]);
    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let palette = color_palette(color0, color1, opaque_only);
    let mut out = [[0u8; 4]; 16];
    for (i, texel) in out.iter_mut().enumerate() {
        *texel = palette[((indices >> (2 * i)) & 0b11) as usize];
    }
    out
}

/// Decode a BC1-BC5 level; returns (channels, pixels)
pub(super) fn decode(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> (u8, Vec<u8>) {
    let channels: u8 = match format {
        PixelFormat::Bc4 => 1,
        PixelFormat::Bc5 => 2,
        _ => 4,
    };
    let block_bytes = format.block_bytes();
    let blocks_w = width.div_ceil(4);
    let mut out = vec![0u8; width as usize * height as usize * channels as usize];

    for (block_index, block) in data.chunks_exact(block_bytes).enumerate() {
        let bx = block_index as u32 % blocks_w * 4;
        let by = block_index as u32 / blocks_w * 4;

        let texels: [[u8; 4]; 16] = match format {
            PixelFormat::Bc1 => decode_color(block, false),
            PixelFormat::Bc2 => {
                let alpha_bits = u64::from_le_bytes([
                    block[0], block[1], block[2], block[3], block[4], block[5], block[6], block[7],
                ]);
                let mut t = decode_color(&block[8..], true);
                for (i, texel) in t.iter_mut().enumerate() {
                    texel[3] = ((alpha_bits >> (4 * i)) & 0xF) as u8 * 17;
                }
                t
            }
            PixelFormat::Bc3 => {
                let alpha = decode_single(&block[..8]);
                let mut t = decode_color(&block[8..], true);
                for (texel, a) in t.iter_mut().zip(alpha) {
                    texel[3] = a;
                }
                t
            }
            PixelFormat::Bc4 => {
                let r = decode_single(block);
                let mut t = [[0u8; 4]; 16];
                for (texel, v) in t.iter_mut().zip(r) {
                    texel[0] = v;
                }
                t
            }
            _ => {
                let r = decode_single(&block[..8]);
                let g = decode_single(&block[8..]);
                let mut t = [[0u8; 4]; 16];
                for (i, texel) in t.iter_mut().enumerate() {
                    texel[0] = r[i];
                    texel[1] = g[i];
                }
                t
            }
        };

        for (i, texel) in texels.iter().enumerate() {
            let x = bx + (i as u32 % 4);
            let y = by + (i as u32 / 4);
            if x < width && y < height {
                let idx = (y as usize * width as usize + x as usize) * channels as usize;
                out[idx..idx + channels as usize].copy_from_slice(&texel[..channels as usize]);
            }
        }
    }

    (channels, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_block() -> Block {
        let mut block = [[0u8; 4]; 16];
        for (i, texel) in block.iter_mut().enumerate() {
            let v = (i * 17) as u8;
            *texel = [v, 255 - v, v / 2, v];
        }
        block
    }

    #[test]
    fn test_bc1_known_vector_four_color_mode() {
        let bc1 = [0xff, 0xff, 0x00, 0x00, 0x00, 0x55, 0xaa, 0xff];
        let (channels, rgba) = decode(PixelFormat::Bc1, 4, 4, &bc1);
        assert_eq!(channels, 4);

        let mut expected = Vec::new();
        expected.extend_from_slice(&[255, 255, 255, 255].repeat(4));
        expected.extend_from_slice(&[0, 0, 0, 255].repeat(4));
        expected.extend_from_slice(&[170, 170, 170, 255].repeat(4));
        expected.extend_from_slice(&[85, 85, 85, 255].repeat(4));
        assert_eq!(rgba, expected);
    }

    #[test]
    fn test_bc1_encoder_uses_four_color_mode() {
        let mut out = Vec::new();
        encode_bc1(&gradient_block(), &mut out);
        assert_eq!(out.len(), 8);
        let color0 = u16::from_le_bytes([out[0], out[1]]);
        let color1 = u16::from_le_bytes([out[2], out[3]]);
        assert!(color0 > color1);

        let (_, rgba) = decode(PixelFormat::Bc1, 4, 4, &out);
        assert!(rgba.chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_bc4_gradient_is_close() {
        let block = gradient_block();
        let mut out = Vec::new();
        encode_bc4(&block, &mut out);
        assert_eq!(out.len(), 8);
        assert!(out[0] > out[1]);

        let (channels, r) = decode(PixelFormat::Bc4, 4, 4, &out);
        assert_eq!(channels, 1);
        for (texel, decoded) in block.iter().zip(r) {
            assert!((i32::from(texel[0]) - i32::from(decoded)).abs() <= 19);
        }
    }

    #[test]
    fn test_bc5_flat_block_exact() {
        let block = [[12u8, 200, 0, 255]; 16];
        let mut out = Vec::new();
        encode_bc5(&block, &mut out);
        let (channels, rg) = decode(PixelFormat::Bc5, 4, 4, &out);
        assert_eq!(channels, 2);
        assert!(rg.chunks(2).all(|p| p == [12, 200]));
    }

    #[test]
    fn test_bc2_explicit_alpha() {
        let bc2 = [
            0xff, 0xff, 0x00, 0x00, 0x88, 0x88, 0x11, 0x11, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00,
        ];
        let (_, rgba) = decode(PixelFormat::Bc2, 4, 4, &bc2);
        assert_eq!(&rgba[0..4], &[255, 255, 255, 255]);
        assert_eq!(&rgba[16..20], &[255, 255, 255, 0]);
        assert_eq!(&rgba[32..36], &[255, 255, 255, 136]);
        assert_eq!(&rgba[48..52], &[255, 255, 255, 17]);
    }

    #[test]
    fn test_partial_block_decode_clips() {
        let block = [[40u8, 80, 120, 255]; 16];
        let mut out = Vec::new();
        encode_bc1(&block, &mut out);
        let (_, rgba) = decode(PixelFormat::Bc1, 2, 3, &out);
        assert_eq!(rgba.len(), 2 * 3 * 4);
    }
}
