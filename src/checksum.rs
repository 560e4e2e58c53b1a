//! Byte-sum checksum of a memory range, and the verify pass built on top of it.
//!
//! The checksum is a plain wrapping sum of unsigned byte values, seeded by the
//! caller so that consecutive ranges can be chained. Memory is scanned one
//! aligned word at a time: the first word skips the bytes that precede the
//! requested start, and the last word keeps only the bytes that fall inside
//! the requested length.

use bit::BitIndex;

use crate::memory::Memory;

const WORD: u32 = 4;

/// Checksum `size` bytes starting at `start`, on top of `seed`.
///
/// `start` is rounded down to a word boundary and `size` rounded up to a
/// multiple of a word. The `start % 4` leading bytes of the first word are
/// left out, and when `size` is not a multiple of a word only its `size % 4`
/// low bytes are kept from the last word. When the first word is also the
/// last one, only the leading bytes are left out.
pub fn checksum<M: Memory + ?Sized>(memory: &M, start: u32, size: u32, seed: u32) -> u32 {
    let mut head_skip = (start % WORD) as usize;
    let tail_keep = (size % WORD) as usize;
    let padded = u64::from(size) + u64::from((WORD - size % WORD) % WORD);

    let mut addr = start - start % WORD;
    let mut scanned = 0u64;
    let mut sum = seed;

    while scanned < padded {
        let word = memory.read_word(addr).to_le_bytes();
        let bytes = if head_skip != 0 {
            let bytes = &word[head_skip..];
            head_skip = 0;
            bytes
        } else if tail_keep != 0 && padded - scanned <= u64::from(WORD) {
            &word[..tail_keep]
        } else {
            &word[..]
        };
        sum = bytes
            .iter()
            .fold(sum, |sum, &byte| sum.wrapping_add(u32::from(byte)));

        addr = addr.wrapping_add(WORD);
        scanned += u64::from(WORD);
    }

    sum
}

/// Packed misalignment argument of a verify request.
///
/// The low nibble is added to the start of the checksummed range, bits 16 to
/// 19 are subtracted from its length.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Misalignment(pub u32);

impl Misalignment {
    pub const NONE: Misalignment = Misalignment(0);

    pub fn new(start_offset: u8, trailing: u8) -> Self {
        let mut val = 0u32;
        val.set_bit_range(0..4, u32::from(start_offset & 0xF));
        val.set_bit_range(16..20, u32::from(trailing & 0xF));
        Misalignment(val)
    }

    /// Bytes to skip at the start of the checksummed range
    pub fn start_offset(self) -> u32 {
        self.0.bit_range(0..4)
    }

    /// Bytes to drop at the end of the checksummed range
    pub fn trailing(self) -> u32 {
        self.0.bit_range(16..20)
    }
}

impl From<u32> for Misalignment {
    fn from(val: u32) -> Self {
        Misalignment(val)
    }
}

/// Outcome of a verify pass
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// Checksum of the verified memory range
    pub checksum: u32,
    /// Address of the first byte that differs from the reference
    pub mismatch: Option<u32>,
}

impl Verification {
    pub fn is_match(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Encode for the host: checksum in the high word, and in the low word
    /// the address after the first mismatching byte, or zero on a full match.
    pub fn pack(&self) -> u64 {
        let address = match self.mismatch {
            Some(addr) => addr.wrapping_add(1),
            None => 0,
        };
        (u64::from(self.checksum) << 32) | u64::from(address)
    }
}

/// Compare memory at `flash_addr` with `reference`, byte by byte.
///
/// The checksum of the compared range, adjusted by `misalignment`, is computed
/// in the same pass. Comparison stops at the first differing byte.
pub fn verify<M: Memory + ?Sized>(
    memory: &M,
    flash_addr: u32,
    reference: &[u8],
    misalignment: Misalignment,
) -> Verification {
    let size = reference.len() as u32;
    let checksum = checksum(
        memory,
        flash_addr.wrapping_add(misalignment.start_offset()),
        size.wrapping_sub(misalignment.trailing()),
        0,
    );

    let mismatch = reference
        .iter()
        .zip(0u32..)
        .map(|(&expected, offset)| (expected, flash_addr.wrapping_add(offset)))
        .find(|&(expected, addr)| memory.read_byte(addr) != expected)
        .map(|(_, addr)| addr);

    Verification { checksum, mismatch }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::memory::RamRegion;
    use std::vec::Vec;

    const BASE: u32 = 0x1000;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(11)).collect()
    }

    fn byte_sum(bytes: &[u8], seed: u32) -> u32 {
        bytes
            .iter()
            .fold(seed, |sum, &b| sum.wrapping_add(u32::from(b)))
    }

    /// Sum computed the long way: bytes of the padded window minus the excluded ones
    fn reference_sum(bytes: &[u8], start: u32, size: u32, seed: u32) -> u32 {
        let head = (start % 4) as usize;
        let tail = (size % 4) as usize;
        let aligned = (start - start % 4 - BASE) as usize;
        let padded = ((size + 3) / 4 * 4) as usize;
        let window: Vec<u8> = (0..padded)
            .map(|i| bytes.get(aligned + i).copied().unwrap_or(0xFF))
            .collect();

        let mut sum = seed;
        for (index, chunk) in window.chunks(4).enumerate() {
            let last = index == window.len() / 4 - 1;
            let kept = if index == 0 && head != 0 {
                &chunk[head..]
            } else if last && tail != 0 {
                &chunk[..tail]
            } else {
                chunk
            };
            sum = byte_sum(kept, sum);
        }
        sum
    }

    #[test]
    fn aligned_word() {
        let bytes = [0x11, 0x22, 0x33, 0x44];
        let memory = RamRegion::new(BASE, &bytes);
        assert_eq!(checksum(&memory, BASE, 4, 0), 0xAA);
    }

    #[test]
    fn misaligned_start_skips_leading_bytes() {
        let bytes = [0x11, 0x22, 0x33, 0x44];
        let memory = RamRegion::new(BASE, &bytes);
        assert_eq!(checksum(&memory, BASE + 1, 3, 0), 0x99);
        assert_eq!(checksum(&memory, BASE + 3, 1, 0), 0x44);
    }

    #[test]
    fn misaligned_size_keeps_low_bytes_of_last_word() {
        let bytes = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        let memory = RamRegion::new(BASE, &bytes);
        assert_eq!(checksum(&memory, BASE, 5, 0), 0xAA + 0x55);
        assert_eq!(checksum(&memory, BASE, 7, 0), 0xAA + 0x55 + 0x66 + 0x77);
        assert_eq!(checksum(&memory, BASE, 1, 0), 0x11);
    }

    #[test]
    fn head_and_tail_adjust_distinct_words() {
        let bytes = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        let memory = RamRegion::new(BASE, &bytes);
        // first word skips one byte, last word keeps two
        assert_eq!(checksum(&memory, BASE + 1, 6, 0), 0x22 + 0x33 + 0x44 + 0x55 + 0x66);
    }

    #[test]
    fn head_rule_wins_on_a_single_word() {
        let bytes = [0x11, 0x22, 0x33, 0x44];
        let memory = RamRegion::new(BASE, &bytes);
        assert_eq!(checksum(&memory, BASE + 1, 2, 0), 0x22 + 0x33 + 0x44);
    }

    #[test]
    fn empty_range_returns_seed() {
        let memory = RamRegion::new(BASE, &[]);
        assert_eq!(checksum(&memory, BASE, 0, 0x1234), 0x1234);
    }

    #[test]
    fn aligned_ranges_sum_every_byte() {
        let bytes = pattern(256);
        let memory = RamRegion::new(BASE, &bytes);
        for words in 0..64u32 {
            let size = words * 4;
            let expected = byte_sum(&bytes[..size as usize], 7);
            assert_eq!(checksum(&memory, BASE, size, 7), expected);
        }
    }

    #[test]
    fn misaligned_ranges_match_manual_exclusion() {
        let bytes = pattern(64);
        let memory = RamRegion::new(BASE, &bytes);
        for start in BASE..BASE + 8 {
            for size in 1..40 {
                assert_eq!(
                    checksum(&memory, start, size, 3),
                    reference_sum(&bytes, start, size, 3),
                    "start {start:#x} size {size}"
                );
            }
        }
    }

    #[test]
    fn seed_chains_across_aligned_splits() {
        let bytes = pattern(128);
        let memory = RamRegion::new(BASE, &bytes);
        for split in (0..=128).step_by(4) {
            let first = checksum(&memory, BASE, split, 0xDEAD);
            let chained = checksum(&memory, BASE + split, 128 - split, first);
            assert_eq!(chained, checksum(&memory, BASE, 128, 0xDEAD));
        }
    }

    #[test]
    fn sum_wraps() {
        let bytes = [0xFF; 4];
        let memory = RamRegion::new(BASE, &bytes);
        assert_eq!(checksum(&memory, BASE, 4, u32::MAX), 0x3FB);
    }

    #[test]
    fn misalignment_fields() {
        let mis = Misalignment(0x0003_0002);
        assert_eq!(mis.start_offset(), 2);
        assert_eq!(mis.trailing(), 3);
        assert_eq!(Misalignment::new(2, 3), mis);
        assert_eq!(Misalignment(0xFFF0_FFF1).start_offset(), 1);
        assert_eq!(Misalignment(0xFFF0_FFF1).trailing(), 0);
    }

    #[test]
    fn verify_identical_buffers() {
        let bytes = pattern(32);
        let memory = RamRegion::new(BASE, &bytes);
        let result = verify(&memory, BASE, &bytes, Misalignment::NONE);
        assert!(result.is_match());
        assert_eq!(result.checksum, checksum(&memory, BASE, 32, 0));
        assert_eq!(result.pack() as u32, 0);
        assert_eq!((result.pack() >> 32) as u32, result.checksum);
    }

    #[test]
    fn verify_reports_address_after_mismatch() {
        let flash = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut reference = flash;
        reference[3] = 0xAA;
        let memory = RamRegion::new(BASE, &flash);

        let result = verify(&memory, BASE, &reference, Misalignment::NONE);
        assert_eq!(result.mismatch, Some(BASE + 3));
        assert_eq!(result.pack() as u32, BASE + 4);
        assert_eq!((result.pack() >> 32) as u32, 36);
    }

    #[test]
    fn verify_stops_at_first_mismatch() {
        let flash = pattern(64);
        for k in [0usize, 1, 17, 63] {
            let mut reference = flash.clone();
            reference[k] ^= 0x01;
            reference[63 - k / 2] ^= 0x80;
            let memory = RamRegion::new(BASE, &flash);
            let result = verify(&memory, BASE, &reference, Misalignment::NONE);
            let first = k.min(63 - k / 2) as u32;
            assert_eq!(result.pack() as u32, BASE + first + 1);
        }
    }

    #[test]
    fn verify_checksum_uses_misalignment() {
        let bytes = pattern(16);
        let memory = RamRegion::new(BASE, &bytes);
        let mis = Misalignment::new(1, 2);
        let result = verify(&memory, BASE, &bytes, mis);
        assert_eq!(result.checksum, checksum(&memory, BASE + 1, 14, 0));
        assert!(result.is_match());
    }
}
