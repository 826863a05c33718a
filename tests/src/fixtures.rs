//! Shared builders for the integration flows and benchmarks

use async_trait::async_trait;
use block_assembly::adapters::StaticChainContext;
use block_assembly::domain::{
    finality::{SEQUENCE_FINAL, SEQUENCE_LOCKTIME_TYPE_FLAG},
    Amount, ChainTip, Height, InputConfirmation, OutPoint, TxInput,
};
use block_assembly::{
    BlockSubmitter, InclusionBatch, InclusionReporter, MinedBlock, Result, SubmissionReceipt,
    TransactionCandidate,
};
use parking_lot::Mutex;
use primitive_types::H256;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Height of the fixture chain tip
pub const TIP_HEIGHT: Height = 5_000;

/// Median time past of the fixture tip
pub const TIP_MTP: i64 = 1_700_000_000;

/// Easiest regtest-style difficulty
pub const REGTEST_BITS: u32 = 0x207f_ffff;

/// Deterministic transaction hash for `n`
pub fn tx_hash(n: u64) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_be_bytes());
    bytes[31] = 0xa1;
    H256::from(bytes)
}

/// Confirmed output funding transaction `n`
pub fn funding_outpoint(n: u64) -> OutPoint {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_be_bytes());
    bytes[31] = 0xb2;
    OutPoint::new(H256::from(bytes), 0)
}

/// Independent transaction spending one confirmed output
pub fn standalone(n: u64, fee: Amount, weight: u64) -> TransactionCandidate {
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

/// Transaction spending output 0 of every parent
pub fn spending(n: u64, parents: &[&TransactionCandidate], fee: Amount, weight: u64) -> TransactionCandidate {
    TransactionCandidate {
        inputs: parents
            .iter()
            .map(|p| TxInput::final_input(OutPoint::new(p.hash, 0)))
            .collect(),
        ..standalone(n, fee, weight)
    }
}

/// Require `blocks` confirmations on the first input (relative height lock)
pub fn with_relative_height_lock(mut tx: TransactionCandidate, blocks: u16) -> TransactionCandidate {
    if let Some(input) = tx.inputs.first_mut() {
        input.sequence = u32::from(blocks);
    }
    tx
}

/// Require 512-second relative time units on the first input
pub fn with_relative_time_lock(mut tx: TransactionCandidate, units: u16) -> TransactionCandidate {
    if let Some(input) = tx.inputs.first_mut() {
        input.sequence = SEQUENCE_LOCKTIME_TYPE_FLAG | u32::from(units);
    }
    tx
}

/// Absolute lock at `lock_time`, opted in through a non-final sequence
pub fn with_lock_time(mut tx: TransactionCandidate, lock_time: u32) -> TransactionCandidate {
    tx.lock_time = lock_time;
    if let Some(input) = tx.inputs.first_mut() {
        input.sequence = SEQUENCE_FINAL - 1;
    }
    tx
}

/// Fixture tip at `height`
pub fn tip_at(height: Height) -> ChainTip {
    let mut hash = [0u8; 32];
    hash[28..].copy_from_slice(&height.to_be_bytes());
    ChainTip {
        hash: H256::from(hash),
        height,
        median_time_past: TIP_MTP + (i64::from(height) - i64::from(TIP_HEIGHT)) * 600,
        next_bits: REGTEST_BITS,
    }
}

/// Chain where every unknown output was confirmed long ago
pub fn chain_at(height: Height) -> StaticChainContext {
    StaticChainContext::new(tip_at(height)).with_fallback(InputConfirmation {
        height: 1,
        median_time_past: TIP_MTP - 10_000_000,
        is_coinbase: false,
    })
}

/// Random pool of `count` transactions: roughly a third are children of an
/// earlier transaction. The same `seed_offset` always yields the same pool.
pub fn random_pool(count: u64, seed_offset: u64) -> Vec<TransactionCandidate> {
    let mut rng = StdRng::seed_from_u64(seed_offset);
    let mut pool: Vec<TransactionCandidate> = Vec::with_capacity(count as usize);
    for i in 0..count {
        let n = seed_offset + i;
        let fee = rng.gen_range(0..50_000);
        let weight = rng.gen_range(400..8_000);
        let tx = if !pool.is_empty() && rng.gen_ratio(1, 3) {
            let parent = pool[rng.gen_range(0..pool.len())].clone();
            spending(n, &[&parent], fee, weight)
        } else {
            standalone(n, fee, weight)
        };
        pool.push(tx);
    }
    pool
}

/// Submitter that records blocks and answers with a fixed verdict
#[derive(Default)]
pub struct RecordingSubmitter {
    /// Submitted blocks
    pub blocks: Mutex<Vec<MinedBlock>>,
    /// Reject every block
    pub reject: bool,
}

#[async_trait]
impl BlockSubmitter for RecordingSubmitter {
    async fn submit_block(&self, block: MinedBlock) -> Result<SubmissionReceipt> {
        let receipt = SubmissionReceipt {
            block_hash: block.hash,
            submitted_at: TIP_MTP,
            accepted: !self.reject,
        };
        self.blocks.lock().push(block);
        Ok(receipt)
    }
}

/// Reporter that records inclusion batches
#[derive(Default)]
pub struct RecordingReporter {
    /// Reported batches
    pub batches: Mutex<Vec<InclusionBatch>>,
}

#[async_trait]
impl InclusionReporter for RecordingReporter {
    async fn report_inclusion(&self, batch: InclusionBatch) -> Result<()> {
        self.batches.lock().push(batch);
        Ok(())
    }
}
