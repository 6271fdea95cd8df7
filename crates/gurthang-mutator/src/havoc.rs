//! The havoc primitive (spec §4.7 `CHUNK_DATA_HAVOC`, §9 design note): a
//! small deterministic set of bit/byte twiddles over a byte range, chosen
//! uniformly at random each call. Re-implementable in any language; the
//! shape here (a closed menu of ops dispatched by an integer roll) is the
//! one spec §9 describes, not borrowed from any single teacher file.

use rand::Rng;

const INTERESTING_8: [i8; 9] = [-128, -1, 0, 1, 16, 32, 64, 100, 127];
const INTERESTING_16: [i16; 10] = [-32768, -129, 128, 255, 256, 512, 1000, 1024, 4096, 32767];
const INTERESTING_32: [i32; 8] = [
    i32::MIN,
    -100_000,
    -32769,
    32768,
    65535,
    65536,
    100_000,
    i32::MAX,
];
const INTERESTING_64: [i64; 8] = [
    i64::MIN,
    i32::MIN as i64 - 1,
    i32::MAX as i64 + 1,
    -1,
    0,
    4_294_967_295,
    4_294_967_296,
    i64::MAX,
];

/// Applies exactly one havoc operation to `data` in place. No-op on an
/// empty slice.
pub fn havoc_once(data: &mut [u8], rng: &mut impl Rng) {
    if data.is_empty() {
        return;
    }

    match rng.gen_range(0..6) {
        0 => bit_flip(data, rng),
        1 => interesting_write(data, rng),
        2 => arith_add_sub(data, rng),
        3 => byte_xor(data, rng),
        4 if data.len() >= 2 => interesting_write(data, rng),
        _ => byte_xor(data, rng),
    }
}

fn bit_flip(data: &mut [u8], rng: &mut impl Rng) {
    let byte_idx = rng.gen_range(0..data.len());
    let bit = rng.gen_range(0..8);
    data[byte_idx] ^= 1 << bit;
}

fn byte_xor(data: &mut [u8], rng: &mut impl Rng) {
    let idx = rng.gen_range(0..data.len());
    let x = rng.gen_range(1u8..=255);
    data[idx] ^= x;
}

fn arith_add_sub(data: &mut [u8], rng: &mut impl Rng) {
    let width = pick_width_up_to_dword(data.len(), rng);
    let idx = rng.gen_range(0..=data.len() - width);
    let delta: i8 = rng.gen_range(-35..=35);

    match width {
        1 => data[idx] = (data[idx] as i8).wrapping_add(delta) as u8,
        2 => {
            let v = read_u16(data, idx, rng.gen_bool(0.5));
            write_u16(data, idx, v.wrapping_add(delta as i16 as u16), rng.gen_bool(0.5));
        }
        _ => {
            let v = read_u32(data, idx, rng.gen_bool(0.5));
            write_u32(data, idx, v.wrapping_add(delta as i32 as u32), rng.gen_bool(0.5));
        }
    }
}

fn interesting_write(data: &mut [u8], rng: &mut impl Rng) {
    let width = pick_width(data.len(), rng);
    let idx = rng.gen_range(0..=data.len() - width);
    let big_endian = rng.gen_bool(0.5);

    match width {
        1 => {
            let v = INTERESTING_8[rng.gen_range(0..INTERESTING_8.len())];
            data[idx] = v as u8;
        }
        2 => {
            let v = INTERESTING_16[rng.gen_range(0..INTERESTING_16.len())] as u16;
            write_u16(data, idx, v, big_endian);
        }
        4 => {
            let v = INTERESTING_32[rng.gen_range(0..INTERESTING_32.len())] as u32;
            write_u32(data, idx, v, big_endian);
        }
        _ => {
            let v = INTERESTING_64[rng.gen_range(0..INTERESTING_64.len())] as u64;
            write_u64(data, idx, v, big_endian);
        }
    }
}

/// Width pool for the interesting-value write, which spans byte/word/dword/qword.
fn pick_width(len: usize, rng: &mut impl Rng) -> usize {
    let mut choices = vec![1usize];
    if len >= 2 {
        choices.push(2);
    }
    if len >= 4 {
        choices.push(4);
    }
    if len >= 8 {
        choices.push(8);
    }
    choices[rng.gen_range(0..choices.len())]
}

/// Width pool for arithmetic add/sub, which spec §4.7 caps at dword.
fn pick_width_up_to_dword(len: usize, rng: &mut impl Rng) -> usize {
    let mut choices = vec![1usize];
    if len >= 2 {
        choices.push(2);
    }
    if len >= 4 {
        choices.push(4);
    }
    choices[rng.gen_range(0..choices.len())]
}

fn read_u16(data: &[u8], idx: usize, big_endian: bool) -> u16 {
    let bytes = [data[idx], data[idx + 1]];
    if big_endian {
        u16::from_be_bytes(bytes)
    } else {
        u16::from_le_bytes(bytes)
    }
}

fn write_u16(data: &mut [u8], idx: usize, value: u16, big_endian: bool) {
    let bytes = if big_endian {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    data[idx..idx + 2].copy_from_slice(&bytes);
}

fn read_u32(data: &[u8], idx: usize, big_endian: bool) -> u32 {
    let bytes = [data[idx], data[idx + 1], data[idx + 2], data[idx + 3]];
    if big_endian {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    }
}

fn write_u32(data: &mut [u8], idx: usize, value: u32, big_endian: bool) {
    let bytes = if big_endian {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    data[idx..idx + 4].copy_from_slice(&bytes);
}

fn write_u64(data: &mut [u8], idx: usize, value: u64, big_endian: bool) {
    let bytes = if big_endian {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    data[idx..idx + 8].copy_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn havoc_once_preserves_length() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut data = vec![0u8, 1, 2, 3, 4, 5, 6, 7];
        let len_before = data.len();
        for _ in 0..50 {
            havoc_once(&mut data, &mut rng);
            assert_eq!(data.len(), len_before);
        }
    }

    #[test]
    fn havoc_once_on_empty_is_noop() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut data: Vec<u8> = Vec::new();
        havoc_once(&mut data, &mut rng);
        assert!(data.is_empty());
    }

    #[test]
    fn havoc_once_on_single_byte_only_touches_that_byte() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut data = vec![0x42u8];
        havoc_once(&mut data, &mut rng);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn pick_width_offers_qword_on_long_buffers() {
        let mut rng = StdRng::seed_from_u64(11);
        let saw_eight = (0..200).any(|_| pick_width(8, &mut rng) == 8);
        assert!(saw_eight, "pick_width never returned 8 over 200 tries on a len-8 buffer");
    }

    #[test]
    fn interesting_write_at_width_eight_sets_a_qword_table_value() {
        let mut rng = StdRng::seed_from_u64(11);
        loop {
            let width = pick_width(8, &mut rng);
            if width != 8 {
                continue;
            }
            let mut data = vec![0u8; 8];
            let idx = rng.gen_range(0..=data.len() - width);
            let big_endian = rng.gen_bool(0.5);
            let v = INTERESTING_64[rng.gen_range(0..INTERESTING_64.len())] as u64;
            write_u64(&mut data, idx, v, big_endian);
            let roundtrip = if big_endian {
                u64::from_be_bytes(data[idx..idx + 8].try_into().unwrap())
            } else {
                u64::from_le_bytes(data[idx..idx + 8].try_into().unwrap())
            };
            assert_eq!(roundtrip, v);
            break;
        }
    }

    #[test]
    fn arith_add_sub_never_picks_qword_width() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            assert_ne!(pick_width_up_to_dword(8, &mut rng), 8);
        }
    }
}
