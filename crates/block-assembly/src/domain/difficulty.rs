//! Compact difficulty targets and the consensus proof-of-work check
//!
//! **IMPORTANT**: the target is a CEILING:
//! - HIGHER target number = EASIER (more valid hashes below it)
//! - LOWER target number = HARDER (fewer valid hashes below it)
//!
//! Compact encoding: the top byte is the size in bytes of the target, bit 23
//! is a sign bit and the low 23 bits are the mantissa.

use crate::utils::hashing::hash_to_u256;
use primitive_types::{H256, U256};

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decoded compact target
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompactTarget {
    /// Target value (ceiling for the header hash)
    pub target: U256,
    /// Sign bit was set with a non-zero mantissa
    pub negative: bool,
    /// Encoded value does not fit in 256 bits
    pub overflow: bool,
}

impl CompactTarget {
    /// Decode compact `bits`
    pub fn from_compact(bits: u32) -> Self {
        let size = bits >> 24;
        let mut word = bits & MANTISSA_MASK;

        let target = if size <= 3 {
            word >>= 8 * (3 - size);
            U256::from(word)
        } else {
            let shift = 8 * (size - 3);
            if shift >= 256 {
                U256::zero()
            } else {
                U256::from(word) << shift as usize
            }
        };

        let negative = word != 0 && (bits & SIGN_BIT) != 0;
        let overflow = word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

        Self {
            target,
            negative,
            overflow,
        }
    }

    /// Usable as a proof-of-work ceiling under `pow_limit`
    pub fn is_valid_under(&self, pow_limit: U256) -> bool {
        !self.negative && !self.overflow && !self.target.is_zero() && self.target <= pow_limit
    }
}

/// Encode a target in compact form
pub fn target_to_compact(target: U256) -> u32 {
    let mut size = ((target.bits() + 7) / 8) as u32;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3)) as usize).low_u64() as u32
    };

    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Consensus proof-of-work check.
///
/// Rejects negative, zero, overflowing or above-limit targets, then requires
/// the header hash (as a little-endian integer) to not exceed the target.
pub fn check_proof_of_work(header_hash: &H256, bits: u32, pow_limit: U256) -> bool {
    let compact = CompactTarget::from_compact(bits);
    if !compact.is_valid_under(pow_limit) {
        return false;
    }
    hash_to_u256(header_hash) <= compact.target
}

/// Difficulty relative to the easiest allowed target (1.0 at the limit)
pub fn relative_difficulty(bits: u32, pow_limit: U256) -> f64 {
    let target = CompactTarget::from_compact(bits).target;
    if target.is_zero() {
        return 0.0;
    }
    u256_to_f64(pow_limit) / u256_to_f64(target)
}

/// Human-readable description of a target
pub fn describe_target(bits: u32) -> String {
    let target = CompactTarget::from_compact(bits).target;
    let leading_zero_bytes = target.leading_zeros() / 8;
    format!("bits {:08x}: ~{} leading zero bytes", bits, leading_zero_bytes)
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}
