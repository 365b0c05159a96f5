//! ETC1 / ETC2 / EAC block encoders
//!
//! Color blocks use the ETC1 individual and differential modes only, which
//! are valid ETC2 RGB8 blocks as long as differential colors stay in range.
//! Blocks are big-endian 64-bit words; texel indices run column-major.

use super::Block;

const ETC1_MODIFIERS: [[i32; 2]; 8] = [[2, 8], [5, 17], [9, 29], [13, 42], [18, 60], [24, 80], [33, 106], [47, 183]];

const EAC_MODIFIERS: [[i32; 8]; 16] = [
    [-3, -6, -9, -15, 2, 5, 8, 14],
    [-3, -7, -10, -13, 2, 6, 9, 12],
    [-2, -5, -8, -13, 1, 4, 7, 12],
    [-2, -4, -6, -13, 1, 3, 5, 12],
    [-3, -6, -8, -12, 2, 5, 7, 11],
    [-3, -7, -9, -11, 2, 6, 8, 10],
    [-4, -7, -8, -11, 3, 6, 7, 10],
    [-3, -5, -8, -11, 2, 4, 7, 10],
    [-2, -6, -8, -10, 1, 5, 7, 9],
    [-2, -5, -8, -10, 1, 4, 7, 9],
    [-2, -4, -8, -10, 1, 3, 7, 9],
    [-2, -5, -7, -10, 1, 4, 6, 9],
    [-3, -4, -7, -10, 2, 3, 6, 9],
    [-1, -2, -3, -10, 0, 1, 2, 9],
    [-4, -6, -8, -9, 3, 5, 7, 8],
    [-3, -5, -7, -9, 2, 4, 6, 8],
];

/// Signed modifier for a 2-bit ETC1 texel index
fn etc1_modifier(table: usize, index: u32) -> i32 {
    let [a, b] = ETC1_MODIFIERS[table];
    match index {
        0 => a,
        1 => b,
        2 => -a,
        _ => -b,
    }
}

fn extend4(c: i32) -> i32 {
    (c << 4) | c
}

fn extend5(c: i32) -> i32 {
    (c << 3) | (c >> 2)
}

/// Texel positions (row-major block indices) of a sub-block
fn sub_block(flip: bool, second: bool) -> [usize; 8] {
    let mut out = [0usize; 8];
    let mut n = 0;
    for y in 0..4 {
        for x in 0..4 {
            let in_second = if flip { y >= 2 } else { x >= 2 };
            if in_second == second {
                out[n] = y * 4 + x;
                n += 1;
            }
        }
    }
    out
}

struct SubBlockFit {
    table: u32,
    indices: [(usize, u32); 8],
    error: u64,
}

/// Pick the modifier table and texel indices for one sub-block around `base`
fn fit_sub_block(block: &Block, texels: &[usize; 8], base: [i32; 3]) -> SubBlockFit {
    let mut best = SubBlockFit { table: 0, indices: [(0, 0); 8], error: u64::MAX };
    for table in 0..8 {
        let mut error = 0u64;
        let mut indices = [(0usize, 0u32); 8];
        for (slot, &t) in indices.iter_mut().zip(texels) {
            let mut best_index = 0;
            let mut best_err = u64::MAX;
            for index in 0..4 {
                let m = etc1_modifier(table, index);
                let err: u64 = (0..3)
                    .map(|c| {
                        let d = (base[c] + m).clamp(0, 255) - i32::from(block[t][c]);
                        (d * d) as u64
                    })
                    .sum();
                if err < best_err {
                    best_err = err;
                    best_index = index;
                }
            }
            *slot = (t, best_index);
            error += best_err;
        }
        if error < best.error {
            best = SubBlockFit { table: table as u32, indices, error };
        }
    }
    best
}

fn average(block: &Block, texels: &[usize; 8]) -> [i32; 3] {
    let mut sum = [0i32; 3];
    for &t in texels {
        for c in 0..3 {
            sum[c] += i32::from(block[t][c]);
        }
    }
    sum.map(|s| (s + 4) / 8)
}

/// Encode one ETC1 block for a given flip; returns (word, error)
fn encode_flip(block: &Block, flip: bool) -> (u64, u64) {
    let first = sub_block(flip, false);
    let second = sub_block(flip, true);
    let avg1 = average(block, &first);
    let avg2 = average(block, &second);

    let q5 = |v: i32| (v * 31 + 127) / 255;
    let q4 = |v: i32| (v * 15 + 127) / 255;
    let c1 = avg1.map(q5);
    let c2 = avg2.map(q5);
    let diff = [c2[0] - c1[0], c2[1] - c1[1], c2[2] - c1[2]];
    let differential = diff.iter().all(|d| (-4..=3).contains(d));

    let mut word = 0u64;
    let (base1, base2) = if differential {
        for c in 0..3 {
            let shift = 59 - 8 * c as u32;
            word |= (c1[c] as u64) << shift;
            word |= ((diff[c] & 0x7) as u64) << (shift - 3);
        }
        word |= 1 << 33;
        (c1.map(extend5), c2.map(extend5))
    } else {
        let i1 = avg1.map(q4);
        let i2 = avg2.map(q4);
        for c in 0..3 {
            let shift = 60 - 8 * c as u32;
            word |= (i1[c] as u64) << shift;
            word |= (i2[c] as u64) << (shift - 4);
        }
        (i1.map(extend4), i2.map(extend4))
    };
    if flip {
        word |= 1 << 32;
    }

    let fit1 = fit_sub_block(block, &first, base1);
    let fit2 = fit_sub_block(block, &second, base2);
    word |= u64::from(fit1.table) << 37;
    word |= u64::from(fit2.table) << 34;

    for (t, index) in fit1.indices.iter().chain(fit2.indices.iter()) {
        let (x, y) = (t % 4, t / 4);
        let bit = x * 4 + y;
        word |= u64::from(index >> 1) << (16 + bit);
        word |= u64::from(index & 1) << bit;
    }

    (word, fit1.error + fit2.error)
}

fn etc1_word(block: &Block) -> u64 {
    let (a, err_a) = encode_flip(block, false);
    let (b, err_b) = encode_flip(block, true);
    if err_b < err_a {
        b
    } else {
        a
    }
}

/// Decoded value of an EAC texel, on the 8-bit or 11-bit scale
fn eac_value(base: i32, multiplier: i32, modifier: i32, eleven_bit: bool) -> i32 {
    if eleven_bit {
        (base * 8 + 4 + modifier * multiplier * 8).clamp(0, 2047)
    } else {
        (base + modifier * multiplier).clamp(0, 255)
    }
}

/// Encode one EAC channel block
fn eac_word(values: [u8; 16], eleven_bit: bool) -> u64 {
    let targets: [i32; 16] = values.map(|v| {
        if eleven_bit {
            (i32::from(v) * 2047 + 127) / 255
        } else {
            i32::from(v)
        }
    });
    let scale = if eleven_bit { 8 } else { 1 };
    let lo = targets.iter().copied().min().unwrap_or(0);
    let hi = targets.iter().copied().max().unwrap_or(0);

    let mut best: (u64, u64) = (u64::MAX, 0);
    for (table, modifiers) in EAC_MODIFIERS.iter().enumerate() {
        let min_mod = modifiers[3];
        let max_mod = modifiers[7];
        let span = (max_mod - min_mod) * scale;
        let ideal = ((hi - lo) + span - 1) / span.max(1);
        for multiplier in (ideal - 1).clamp(1, 15)..=(ideal + 1).clamp(1, 15) {
            let center = (lo + hi) / 2 - (min_mod + max_mod) * multiplier * scale / 2;
            let base_guess = if eleven_bit { (center - 4) / 8 } else { center };
            for base in (base_guess - 1).max(0)..=(base_guess + 1).min(255) {
                let mut error = 0u64;
                let mut indices = 0u64;
                for (i, &target) in targets.iter().enumerate() {
                    let (index, err) = modifiers
                        .iter()
                        .enumerate()
                        .map(|(k, &m)| {
                            let d = eac_value(base, multiplier, m, eleven_bit) - target;
                            (k as u64, (d * d) as u64)
                        })
                        .min_by_key(|&(_, e)| e)
                        .unwrap_or((0, 0));
                    error += err;
                    let (x, y) = (i % 4, i / 4);
                    let pos = x * 4 + y;
                    indices |= index << (45 - 3 * pos);
                }
                if error < best.0 {
                    let word = ((base as u64) << 56)
                        | ((multiplier as u64) << 52)
                        | ((table as u64) << 48)
                        | indices;
                    best = (error, word);
                }
            }
        }
    }
    best.1
}

fn channel(block: &Block, c: usize) -> [u8; 16] {
    let mut values = [0u8; 16];
    for (v, texel) in values.iter_mut().zip(block) {
        *v = texel[c];
    }
    values
}

pub(super) fn encode_etc1(block: &Block, out: &mut Vec<u8>) {
    out.extend_from_slice(&etc1_word(block).to_be_bytes());
}

pub(super) fn encode_etc2_rgba8(block: &Block, out: &mut Vec<u8>) {
    out.extend_from_slice(&eac_word(channel(block, 3), false).to_be_bytes());
    out.extend_from_slice(&etc1_word(block).to_be_bytes());
}

pub(super) fn encode_eac_r11(block: &Block, out: &mut Vec<u8>) {
    out.extend_from_slice(&eac_word(channel(block, 0), true).to_be_bytes());
}

pub(super) fn encode_eac_rg11(block: &Block, out: &mut Vec<u8>) {
    out.extend_from_slice(&eac_word(channel(block, 0), true).to_be_bytes());
    out.extend_from_slice(&eac_word(channel(block, 1), true).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_etc1(word: u64) -> [[u8; 3]; 16] {
        let flip = word & (1 << 32) != 0;
        let differential = word & (1 << 33) != 0;
        let mut bases = [[0i32; 3]; 2];
        for c in 0..3 {
            if differential {
                let shift = 59 - 8 * c as u32;
                let c1 = ((word >> shift) & 0x1F) as i32;
                let d = ((word >> (shift - 3)) & 0x7) as i32;
                let d = if d >= 4 { d - 8 } else { d };
                bases[0][c] = extend5(c1);
                bases[1][c] = extend5(c1 + d);
            } else {
                let shift = 60 - 8 * c as u32;
                bases[0][c] = extend4(((word >> shift) & 0xF) as i32);
                bases[1][c] = extend4(((word >> (shift - 4)) & 0xF) as i32);
            }
        }
        let tables = [((word >> 37) & 7) as usize, ((word >> 34) & 7) as usize];
        let mut out = [[0u8; 3]; 16];
        for (t, texel) in out.iter_mut().enumerate() {
            let (x, y) = (t % 4, t / 4);
            let second = if flip { y >= 2 } else { x >= 2 };
            let s = usize::from(second);
            let bit = x * 4 + y;
            let index = (((word >> (16 + bit)) & 1) << 1 | ((word >> bit) & 1)) as u32;
            let m = etc1_modifier(tables[s], index);
            for c in 0..3 {
                texel[c] = (bases[s][c] + m).clamp(0, 255) as u8;
            }
        }
        out
    }

    fn decode_eac(word: u64, eleven_bit: bool) -> [i32; 16] {
        let base = (word >> 56) as i32;
        let multiplier = ((word >> 52) & 0xF) as i32;
        let table = ((word >> 48) & 0xF) as usize;
        let mut out = [0i32; 16];
        for (i, v) in out.iter_mut().enumerate() {
            let (x, y) = (i % 4, i / 4);
            let pos = x * 4 + y;
            let index = ((word >> (45 - 3 * pos)) & 7) as usize;
            *v = eac_value(base, multiplier, EAC_MODIFIERS[table][index], eleven_bit);
        }
        out
    }

    #[test]
    fn test_etc1_flat_block_is_close() {
        let block = [[100u8, 150, 200, 255]; 16];
        let word = etc1_word(&block);
        for texel in decode_etc1(word) {
            for c in 0..3 {
                assert!((i32::from(texel[c]) - i32::from(block[0][c])).abs() <= 6, "{texel:?}");
            }
        }
    }

    #[test]
    fn test_etc1_split_block_uses_both_halves() {
        let mut block = [[0u8, 0, 0, 255]; 16];
        for (i, texel) in block.iter_mut().enumerate() {
            if i % 4 >= 2 {
                *texel = [250, 250, 250, 255];
            }
        }
        let decoded = decode_etc1(etc1_word(&block));
        assert!(decoded[0][0] < 20);
        assert!(decoded[3][0] > 230);
    }

    #[test]
    fn test_eac_alpha_flat_exact() {
        let values = [77u8; 16];
        let decoded = decode_eac(eac_word(values, false), false);
        assert!(decoded.iter().all(|&v| v == 77));
    }

    #[test]
    fn test_eac_r11_gradient_is_close() {
        let mut values = [0u8; 16];
        for (i, v) in values.iter_mut().enumerate() {
            *v = (i * 16) as u8;
        }
        let word = eac_word(values, true);
        assert!((word >> 52) & 0xF >= 1);
        let decoded = decode_eac(word, true);
        for (v, d) in values.iter().zip(decoded) {
            let expected = i32::from(*v) * 2047 / 255;
            assert!((expected - d).abs() <= 320, "{expected} vs {d}");
        }
        assert!(decoded[0] < decoded[15]);
    }

    #[test]
    fn test_block_sizes() {
        let block = [[1u8, 2, 3, 4]; 16];
        let mut out = Vec::new();
        encode_etc2_rgba8(&block, &mut out);
        assert_eq!(out.len(), 16);
        out.clear();
        encode_eac_rg11(&block, &mut out);
        assert_eq!(out.len(), 16);
    }
}
