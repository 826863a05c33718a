//! Shared fixtures for unit tests

use crate::adapters::StaticChainContext;
use crate::domain::{
    Amount, ChainContext, ChainTip, Height, InputConfirmation, OutPoint, TransactionCandidate,
    TxInput,
};
use primitive_types::H256;

pub const TIP_HEIGHT: Height = 1_000;
pub const TIP_MTP: i64 = 1_700_000_000;
pub const REGTEST_BITS: u32 = 0x207f_ffff;

/// Transaction hash for test candidate `n` (ordering follows `n`)
pub fn tx_hash(n: u64) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_be_bytes());
    bytes[31] = 0x01;
    H256::from(bytes)
}

/// Confirmed output funding test candidate `n`
pub fn funding_outpoint(n: u64) -> OutPoint {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_be_bytes());
    bytes[31] = 0x02;
    OutPoint::new(H256::from(bytes), 0)
}

/// Candidate spending one confirmed output
pub fn candidate(n: u64, fee: Amount, weight: u64) -> TransactionCandidate {
    TransactionCandidate {
        hash: tx_hash(n),
        version: 2,
        fee,
        weight,
        sigop_cost: 4,
        inputs: vec![TxInput::final_input(funding_outpoint(n))],
        lock_time: 0,
        spends_coinbase: false,
    }
}

/// Candidate spending output 0 of each parent
pub fn child_of(n: u64, parents: &[&TransactionCandidate], fee: Amount, weight: u64) -> TransactionCandidate {
    TransactionCandidate {
        inputs: parents
            .iter()
            .map(|p| TxInput::final_input(OutPoint::new(p.hash, 0)))
            .collect(),
        ..candidate(n, fee, weight)
    }
}

pub fn tip() -> ChainTip {
    ChainTip {
        hash: H256::repeat_byte(0x77),
        height: TIP_HEIGHT,
        median_time_past: TIP_MTP,
        next_bits: REGTEST_BITS,
    }
}

pub fn context() -> ChainContext {
    ChainContext {
        tip: tip(),
        block_time: TIP_MTP + 600,
    }
}

/// Chain where every unknown output was confirmed long ago
pub fn chain() -> StaticChainContext {
    StaticChainContext::new(tip()).with_fallback(InputConfirmation {
        height: 1,
        median_time_past: TIP_MTP - 1_000_000,
        is_coinbase: false,
    })
}
