//! Hashing utilities for block assembly
//!
//! Header and transaction hashes are double SHA-256. Hashes are kept in
//! serialized (little-endian) byte order; [`hash_to_u256`] reads them as the
//! integer the proof-of-work target is compared against.

use primitive_types::{H256, U256};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of data
#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute double SHA-256 hash
#[inline]
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first_hash = sha256(data);
    sha256(&first_hash)
}

/// Finish a running SHA-256 state and hash the digest once more
#[inline]
pub fn finalize_sha256d(state: Sha256) -> [u8; 32] {
    let first = state.finalize();
    sha256(&first)
}

/// Interpret a hash (serialized byte order) as a 256-bit integer
#[inline]
pub fn hash_to_u256(hash: &H256) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

/// Append a Bitcoin-style variable length integer
pub fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Merkle root over transaction hashes (odd levels duplicate the last node)
pub fn merkle_root(hashes: &[H256]) -> H256 {
    if hashes.is_empty() {
        return H256::zero();
    }

    let mut level: Vec<H256> = hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(pair[0].as_bytes());
                buf[32..].copy_from_slice(pair[1].as_bytes());
                H256::from(sha256d(&buf))
            })
            .collect();
    }
    level[0]
}
