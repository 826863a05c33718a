//! Block template
//!
//! [`TemplateBuilder`] is the mutable block under construction, owned by the
//! selector for the duration of one round. [`TemplateBuilder::finalize`]
//! fills in the coinbase and the merkle root and freezes the result into an
//! immutable [`BlockTemplate`] for the mining loop.

use super::budget::BlockTotals;
use super::entities::{Amount, ChainContext, Height, TransactionCandidate};
use super::finality::SEQUENCE_FINAL;
use crate::error::{AssemblyError, Result};
use crate::utils::hashing::{merkle_root, sha256d, write_compact_size};
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Base units per coin
pub const COIN: Amount = 100_000_000;

/// Subsidy of the first halving era
pub const INITIAL_SUBSIDY: Amount = 50 * COIN;

/// Blocks between subsidy halvings
pub const DEFAULT_HALVING_INTERVAL: Height = 210_000;

/// Serialized header length without nonce and solution
pub const HEADER_PREIMAGE_LEN: usize = 4 + 32 + 32 + 32 + 4 + 4;

/// Block subsidy at `height`
pub fn block_subsidy(height: Height, halving_interval: Height) -> Amount {
    if halving_interval == 0 {
        return 0;
    }
    let halvings = height / halving_interval;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// Weight and sigop cost kept free for the coinbase
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseReservation {
    /// Reserved weight
    pub weight: u64,
    /// Reserved sigop cost
    pub sigop_cost: u64,
}

impl Default for CoinbaseReservation {
    fn default() -> Self {
        Self {
            weight: 4_000,
            sigop_cost: 400,
        }
    }
}

/// Parameters for building the coinbase and header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinbaseParams {
    /// Header version
    pub block_version: i32,
    /// Output script paid by the coinbase
    pub payout_script: Vec<u8>,
    /// Extra nonce committed in the coinbase input script
    pub extra_nonce: u32,
    /// Blocks between subsidy halvings
    pub halving_interval: Height,
}

impl Default for CoinbaseParams {
    fn default() -> Self {
        Self {
            block_version: 4,
            payout_script: Vec::new(),
            extra_nonce: 0,
            halving_interval: DEFAULT_HALVING_INTERVAL,
        }
    }
}

/// Block-reward transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseTransaction {
    /// Height committed in the input script
    pub height: Height,
    /// Subsidy plus collected fees
    pub value: Amount,
    /// Output script
    #[serde(with = "serde_bytes")]
    pub payout_script: Vec<u8>,
    /// Extra nonce committed in the input script
    pub extra_nonce: u32,
}

impl CoinbaseTransaction {
    /// Input script: height push followed by the extra nonce
    pub fn script_sig(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(10);
        let height = self.height.to_le_bytes();
        let used = height.iter().rposition(|b| *b != 0).map_or(1, |i| i + 1);
        script.push(used as u8);
        script.extend_from_slice(&height[..used]);
        script.push(4);
        script.extend_from_slice(&self.extra_nonce.to_le_bytes());
        script
    }

    /// Wire serialization (one null-prevout input, one output)
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(&1i32.to_le_bytes());

        write_compact_size(&mut out, 1);
        out.extend_from_slice(&[0u8; 32]);
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        let script_sig = self.script_sig();
        write_compact_size(&mut out, script_sig.len() as u64);
        out.extend_from_slice(&script_sig);
        out.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());

        write_compact_size(&mut out, 1);
        out.extend_from_slice(&self.value.to_le_bytes());
        write_compact_size(&mut out, self.payout_script.len() as u64);
        out.extend_from_slice(&self.payout_script);

        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    /// Transaction hash
    pub fn hash(&self) -> H256 {
        H256::from(sha256d(&self.serialize()))
    }
}

/// Block header with a 256-bit nonce and a variable-length puzzle solution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Header version
    pub version: i32,
    /// Hash of the tip being extended
    pub prev_hash: H256,
    /// Merkle root over coinbase and selected transactions
    pub merkle_root: H256,
    /// Reserved commitment field (zero)
    pub reserved: H256,
    /// Header time
    pub time: u32,
    /// Compact difficulty target
    pub bits: u32,
    /// Nonce (little-endian 256-bit integer)
    pub nonce: H256,
    /// Puzzle solution
    #[serde(with = "serde_bytes")]
    pub solution: Vec<u8>,
}

impl BlockHeader {
    /// Serialized header without nonce and solution
    pub fn preimage_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_PREIMAGE_LEN);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.prev_hash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        out.extend_from_slice(self.reserved.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out
    }

    /// Full serialization
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.preimage_bytes();
        out.extend_from_slice(self.nonce.as_bytes());
        write_compact_size(&mut out, self.solution.len() as u64);
        out.extend_from_slice(&self.solution);
        out
    }

    /// Header hash (double SHA-256 of the full serialization)
    pub fn hash(&self) -> H256 {
        H256::from(sha256d(&self.serialize()))
    }
}

/// Block under construction
#[derive(Clone, Debug)]
pub struct TemplateBuilder {
    context: ChainContext,
    reservation: CoinbaseReservation,
    transactions: Vec<TransactionCandidate>,
    included: HashSet<H256>,
    totals: BlockTotals,
}

impl TemplateBuilder {
    /// Empty block on top of `context`, with the coinbase reservation
    /// already counted against the budget
    pub fn new(context: ChainContext, reservation: CoinbaseReservation) -> Self {
        Self {
            context,
            reservation,
            transactions: Vec::new(),
            included: HashSet::new(),
            totals: BlockTotals {
                weight: reservation.weight,
                sigop_cost: reservation.sigop_cost,
                fees: 0,
            },
        }
    }

    /// Chain context the block is built against
    pub fn context(&self) -> &ChainContext {
        &self.context
    }

    /// Running totals
    pub fn totals(&self) -> &BlockTotals {
        &self.totals
    }

    /// Mutable totals for the budget enforcer
    pub(crate) fn totals_mut(&mut self) -> &mut BlockTotals {
        &mut self.totals
    }

    /// Coinbase reservation
    pub fn reservation(&self) -> CoinbaseReservation {
        self.reservation
    }

    /// Selected transactions in block order
    pub fn transactions(&self) -> &[TransactionCandidate] {
        &self.transactions
    }

    /// Number of selected transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// No transaction selected yet
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Whether `hash` is already in the block
    pub fn contains(&self, hash: &H256) -> bool {
        self.included.contains(hash)
    }

    /// Append one transaction. Totals are committed separately through the
    /// budget enforcer.
    pub(crate) fn push(&mut self, tx: TransactionCandidate) -> Result<()> {
        if !self.included.insert(tx.hash) {
            return Err(AssemblyError::DuplicateTransaction(tx.hash));
        }
        self.transactions.push(tx);
        Ok(())
    }

    /// Populate the coinbase, compute the merkle root and freeze the block
    pub fn finalize(self, params: &CoinbaseParams) -> Result<BlockTemplate> {
        let height = self.context.target_height();
        let subsidy = block_subsidy(height, params.halving_interval);
        let value = subsidy.checked_add(self.totals.fees).ok_or_else(|| {
            AssemblyError::Internal(format!(
                "coinbase value overflow: subsidy {} + fees {}",
                subsidy, self.totals.fees
            ))
        })?;

        let coinbase = CoinbaseTransaction {
            height,
            value,
            payout_script: params.payout_script.clone(),
            extra_nonce: params.extra_nonce,
        };

        let mut hashes = Vec::with_capacity(self.transactions.len() + 1);
        hashes.push(coinbase.hash());
        hashes.extend(self.transactions.iter().map(|tx| tx.hash));

        let header = BlockHeader {
            version: params.block_version,
            prev_hash: self.context.tip.hash,
            merkle_root: merkle_root(&hashes),
            reserved: H256::zero(),
            time: self.context.block_time.clamp(0, u32::MAX as i64) as u32,
            bits: self.context.tip.next_bits,
            nonce: H256::zero(),
            solution: Vec::new(),
        };

        Ok(BlockTemplate {
            header,
            height,
            coinbase,
            subsidy,
            transactions: self.transactions,
            total_weight: self.totals.weight,
            total_sigop_cost: self.totals.sigop_cost,
            total_fees: self.totals.fees,
        })
    }
}

/// Frozen candidate block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTemplate {
    /// Header with zero nonce and empty solution
    pub header: BlockHeader,

    /// Height of this block
    pub height: Height,

    /// Finalized coinbase (index 0 of the block)
    pub coinbase: CoinbaseTransaction,

    /// Subsidy part of the coinbase value
    pub subsidy: Amount,

    /// Selected transactions in block order, coinbase excluded
    pub transactions: Vec<TransactionCandidate>,

    /// Cumulative weight including the coinbase reservation
    pub total_weight: u64,

    /// Cumulative sigop cost including the coinbase reservation
    pub total_sigop_cost: u64,

    /// Cumulative fees of selected transactions
    pub total_fees: Amount,
}

impl BlockTemplate {
    /// Transaction hashes in block order, coinbase first
    pub fn ordered_hashes(&self) -> Vec<H256> {
        std::iter::once(self.coinbase.hash())
            .chain(self.transactions.iter().map(|tx| tx.hash))
            .collect()
    }

    /// Hashes of the selected transactions, coinbase excluded
    pub fn selected_hashes(&self) -> Vec<H256> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }

    /// Number of transactions including the coinbase
    pub fn transaction_count(&self) -> usize {
        self.transactions.len() + 1
    }
}
