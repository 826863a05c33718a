//! Utility modules for block assembly

pub mod hashing;

pub use hashing::{hash_to_u256, merkle_root, sha256, sha256d, write_compact_size};
