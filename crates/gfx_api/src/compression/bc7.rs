//! BC7 encoder restricted to mode 6
//!
//! Mode 6 is a single-subset RGBA mode with 7-bit endpoints plus a unique
//! p-bit per endpoint and 4-bit indices. It handles smooth RGBA content well
//! and needs no partition search.

use super::Block;

const WEIGHTS: [u32; 16] = [0, 4, 9, 13, 17, 21, 26, 30, 34, 38, 43, 47, 51, 55, 60, 64];

struct BitWriter {
    bits: u128,
    pos: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self { bits: 0, pos: 0 }
    }

    fn write(&mut self, value: u32, count: u32) {
        debug_assert!(self.pos + count <= 128);
        let mask = (1u128 << count) - 1;
        self.bits |= (u128::from(value) & mask) << self.pos;
        self.pos += count;
    }
}

/// Quantized endpoint: 7-bit channels plus the shared p-bit
#[derive(Clone, Copy)]
struct Endpoint {
    channels: [u8; 4],
    pbit: u8,
}

impl Endpoint {
    fn quantize(color: [u8; 4]) -> Self {
        let mut best = Self { channels: [0; 4], pbit: 0 };
        let mut best_err = u32::MAX;
        for pbit in 0..2u8 {
            let mut channels = [0u8; 4];
            let mut err = 0u32;
            for c in 0..4 {
                let v = i32::from(color[c]);
                let q = ((v - i32::from(pbit) + 1) / 2).clamp(0, 127);
                channels[c] = q as u8;
                let d = ((q << 1) | i32::from(pbit)) - v;
                err += (d * d) as u32;
            }
            if err < best_err {
                best_err = err;
                best = Self { channels, pbit };
            }
        }
        best
    }

    fn expand(self) -> [u8; 4] {
        self.channels.map(|c| (c << 1) | self.pbit)
    }
}

fn interpolate(e0: [u8; 4], e1: [u8; 4], w: u32) -> [u8; 4] {
    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = (((64 - w) * u32::from(e0[c]) + w * u32::from(e1[c]) + 32) >> 6) as u8;
    }
    out
}

fn distance(a: [u8; 4], b: [u8; 4]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = i32::from(x) - i32::from(y);
            (d * d) as u32
        })
        .sum()
}

pub(super) fn encode_mode6(block: &Block, out: &mut Vec<u8>) {
    let mut lo = [255u8; 4];
    let mut hi = [0u8; 4];
    for texel in block {
        for c in 0..4 {
            lo[c] = lo[c].min(texel[c]);
            hi[c] = hi[c].max(texel[c]);
        }
    }

    let mut e0 = Endpoint::quantize(lo);
    let mut e1 = Endpoint::quantize(hi);
    let palette: Vec<[u8; 4]> = WEIGHTS
        .iter()
        .map(|&w| interpolate(e0.expand(), e1.expand(), w))
        .collect();

    let mut indices = [0u32; 16];
    for (index, texel) in indices.iter_mut().zip(block) {
        *index = (0..16u32)
            .min_by_key(|&i| distance(*texel, palette[i as usize]))
            .unwrap_or(0);
    }

    // The anchor index is stored without its top bit
    if indices[0] >= 8 {
        std::mem::swap(&mut e0, &mut e1);
        for index in indices.iter_mut() {
            *index = 15 - *index;
        }
    }

    let mut writer = BitWriter::new();
    writer.write(1 << 6, 7);
    for c in 0..4 {
        writer.write(u32::from(e0.channels[c]), 7);
        writer.write(u32::from(e1.channels[c]), 7);
    }
    writer.write(u32::from(e0.pbit), 1);
    writer.write(u32::from(e1.pbit), 1);
    writer.write(indices[0], 3);
    for &index in &indices[1..] {
        writer.write(index, 4);
    }
    debug_assert_eq!(writer.pos, 128);

    out.extend_from_slice(&writer.bits.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(bits: u128, pos: &mut u32, count: u32) -> u32 {
        let v = ((bits >> *pos) & ((1u128 << count) - 1)) as u32;
        *pos += count;
        v
    }

    /// Decoder for mode 6 only
    fn decode_mode6(data: &[u8]) -> [[u8; 4]; 16] {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(data);
        let bits = u128::from_le_bytes(bytes);
        let mut pos = 0;
        assert_eq!(read(bits, &mut pos, 7), 1 << 6);
        let mut e = [[0u8; 4]; 2];
        for c in 0..4 {
            e[0][c] = read(bits, &mut pos, 7) as u8;
            e[1][c] = read(bits, &mut pos, 7) as u8;
        }
        let p0 = read(bits, &mut pos, 1) as u8;
        let p1 = read(bits, &mut pos, 1) as u8;
        let e0 = e[0].map(|c| (c << 1) | p0);
        let e1 = e[1].map(|c| (c << 1) | p1);
        let mut out = [[0u8; 4]; 16];
        for (i, texel) in out.iter_mut().enumerate() {
            let index = read(bits, &mut pos, if i == 0 { 3 } else { 4 });
            *texel = interpolate(e0, e1, WEIGHTS[index as usize]);
        }
        out
    }

    #[test]
    fn test_weights_are_symmetric() {
        for i in 0..16 {
            assert_eq!(WEIGHTS[i] + WEIGHTS[15 - i], 64);
        }
    }

    #[test]
    fn test_flat_block_round_trips_exactly() {
        let block = [[201u8, 33, 90, 128]; 16];
        let mut out = Vec::new();
        encode_mode6(&block, &mut out);
        assert_eq!(out.len(), 16);
        assert_eq!(out[0] & 0x7F, 0x40);
        let decoded = decode_mode6(&out);
        for texel in decoded {
            for c in 0..4 {
                assert!((i32::from(texel[c]) - i32::from(block[0][c])).abs() <= 1);
            }
        }
    }

    #[test]
    fn test_anchor_constraint_with_descending_block() {
        let mut block = [[0u8; 4]; 16];
        for (i, texel) in block.iter_mut().enumerate() {
            let v = 255 - (i * 16) as u8;
            *texel = [v, v, v, 255];
        }
        let mut out = Vec::new();
        encode_mode6(&block, &mut out);
        let decoded = decode_mode6(&out);
        for (texel, original) in decoded.iter().zip(block.iter()) {
            assert!((i32::from(texel[0]) - i32::from(original[0])).abs() <= 12);
        }
    }
}
