//! ASTC 4x4 LDR encoder
//!
//! Every block uses the same layout: one partition, color endpoint mode 12
//! (LDR RGBA direct) with 8-bit endpoints, and a 4x4 grid of 2-bit weights.

use super::Block;

/// 4x4 weight grid, 2-bit weights, single plane
const BLOCK_MODE: u128 = 0x042;
/// LDR RGBA direct
const CEM_RGBA_DIRECT: u128 = 12;
/// Unquantized values of the four 2-bit weights
const WEIGHTS: [u32; 4] = [0, 21, 43, 64];

fn interpolate(e0: [u8; 4], e1: [u8; 4], w: u32) -> [u8; 4] {
    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = ((u32::from(e0[c]) * (64 - w) + u32::from(e1[c]) * w + 32) >> 6) as u8;
    }
    out
}

pub(super) fn encode_4x4(block: &Block, out: &mut Vec<u8>) {
    let mut lo = [255u8; 4];
    let mut hi = [0u8; 4];
    for texel in block {
        for c in 0..4 {
            lo[c] = lo[c].min(texel[c]);
            hi[c] = hi[c].max(texel[c]);
        }
    }

    // Per-channel max is never darker than min, so mode 12 decodes the
    // endpoints in stored order without blue contraction
    let (e0, e1) = (lo, hi);
    let luma_sum = |e: [u8; 4]| e[..3].iter().map(|&c| u32::from(c)).sum::<u32>();
    debug_assert!(luma_sum(e1) >= luma_sum(e0));

    let palette = WEIGHTS.map(|w| interpolate(e0, e1, w));
    let mut bits: u128 = BLOCK_MODE | (CEM_RGBA_DIRECT << 13);

    for c in 0..4 {
        bits |= u128::from(e0[c]) << (17 + 16 * c);
        bits |= u128::from(e1[c]) << (17 + 16 * c + 8);
    }

    for (i, texel) in block.iter().enumerate() {
        let weight = (0..4usize)
            .min_by_key(|&k| {
                texel
                    .iter()
                    .zip(palette[k].iter())
                    .map(|(&a, &b)| {
                        let d = i32::from(a) - i32::from(b);
                        (d * d) as u32
                    })
                    .sum::<u32>()
            })
            .unwrap_or(0) as u128;
        // Weight bits are stored bit-reversed from the top of the block
        bits |= (weight & 1) << (127 - 2 * i);
        bits |= ((weight >> 1) & 1) << (127 - (2 * i + 1));
    }

    out.extend_from_slice(&bits.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(data: &[u8]) -> [[u8; 4]; 16] {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(data);
        let bits = u128::from_le_bytes(bytes);
        assert_eq!(bits & 0x7FF, BLOCK_MODE);
        assert_eq!((bits >> 11) & 0x3, 0);
        assert_eq!((bits >> 13) & 0xF, CEM_RGBA_DIRECT);

        let mut e0 = [0u8; 4];
        let mut e1 = [0u8; 4];
        for c in 0..4 {
            e0[c] = (bits >> (17 + 16 * c)) as u8;
            e1[c] = (bits >> (17 + 16 * c + 8)) as u8;
        }
        let mut out = [[0u8; 4]; 16];
        for (i, texel) in out.iter_mut().enumerate() {
            let lo = (bits >> (127 - 2 * i)) & 1;
            let hi = (bits >> (127 - (2 * i + 1))) & 1;
            *texel = interpolate(e0, e1, WEIGHTS[(lo | (hi << 1)) as usize]);
        }
        out
    }

    #[test]
    fn test_flat_block_exact() {
        let block = [[9u8, 99, 199, 250]; 16];
        let mut out = Vec::new();
        encode_4x4(&block, &mut out);
        assert_eq!(out.len(), 16);
        assert!(decode(&out).iter().all(|t| *t == block[0]));
    }

    #[test]
    fn test_endpoints_not_blue_contracted() {
        let mut block = [[0u8; 4]; 16];
        for (i, texel) in block.iter_mut().enumerate() {
            let v = (i * 17) as u8;
            *texel = [v, v, 255 - v, 255];
        }
        let mut out = Vec::new();
        encode_4x4(&block, &mut out);
        let bits = u128::from_le_bytes(out.as_slice().try_into().unwrap());
        let v = |k: usize| ((bits >> (17 + 8 * k)) & 0xFF) as u32;
        // r0 + g0 + b0 <= r1 + g1 + b1
        assert!(v(0) + v(2) + v(4) <= v(1) + v(3) + v(5));

        let decoded = decode(&out);
        assert!(decoded[0][0] < decoded[15][0]);
    }
}
