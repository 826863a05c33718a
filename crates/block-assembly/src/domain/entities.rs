//! Domain entities for block assembly

use primitive_types::H256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Amount in base units
pub type Amount = u64;

/// Block height
pub type Height = u32;

/// Reference to a prior transaction output
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the transaction that created the output
    pub hash: H256,
    /// Output index within that transaction
    pub index: u32,
}

impl OutPoint {
    /// Create a new outpoint
    pub fn new(hash: H256, index: u32) -> Self {
        Self { hash, index }
    }
}

/// Transaction input as seen by the selector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Spent output
    pub prevout: OutPoint,

    /// Sequence number; carries the relative lock-time request
    pub sequence: u32,
}

impl TxInput {
    /// Input with a final sequence (no relative lock, no lock-time opt-in)
    pub fn final_input(prevout: OutPoint) -> Self {
        Self {
            prevout,
            sequence: crate::domain::finality::SEQUENCE_FINAL,
        }
    }
}

/// Pending transaction with precomputed selection metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    /// Transaction hash (unique identifier)
    pub hash: H256,

    /// Transaction version; relative locks apply from version 2
    pub version: i32,

    /// Declared fee
    pub fee: Amount,

    /// Block weight consumed by this transaction
    pub weight: u64,

    /// Signature-operation cost
    pub sigop_cost: u64,

    /// Inputs in order
    pub inputs: Vec<TxInput>,

    /// Absolute lock-time (height below the threshold, UNIX time above)
    pub lock_time: u32,

    /// Whether any input spends a block-reward output
    pub spends_coinbase: bool,
}

impl TransactionCandidate {
    /// Fee rate paid by this transaction alone
    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::from_fee_and_weight(self.fee, self.weight)
    }

    /// Whether any input spends an output of `parent`
    pub fn spends_from(&self, parent: &H256) -> bool {
        self.inputs.iter().any(|input| input.prevout.hash == *parent)
    }
}

/// Fee rate in base units per 1000 weight units
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(pub Amount);

impl FeeRate {
    /// Weight units the rate is expressed over
    pub const UNIT_WEIGHT: u64 = 1_000;

    /// Build a rate from a fee paid over a weight
    pub fn from_fee_and_weight(fee: Amount, weight: u64) -> Self {
        if weight == 0 {
            return Self(0);
        }
        let per_unit = (fee as u128 * Self::UNIT_WEIGHT as u128) / weight as u128;
        Self(per_unit.min(u64::MAX as u128) as u64)
    }

    /// Fee required at this rate for `weight` units.
    ///
    /// A non-zero rate never charges zero for non-zero weight.
    pub fn fee_for(&self, weight: u64) -> Amount {
        let fee = (self.0 as u128 * weight as u128) / Self::UNIT_WEIGHT as u128;
        let fee = fee.min(u64::MAX as u128) as u64;
        if fee == 0 && weight != 0 && self.0 > 0 {
            return 1;
        }
        fee
    }
}

/// Aggregate cost of a package (a candidate plus unselected ancestors)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAggregate {
    /// Sum of fees
    pub fee: Amount,
    /// Sum of weights
    pub weight: u64,
    /// Sum of sigop costs
    pub sigop_cost: u64,
    /// Number of transactions
    pub count: u32,
}

impl PackageAggregate {
    /// Aggregate of a single transaction
    pub fn of(tx: &TransactionCandidate) -> Self {
        Self {
            fee: tx.fee,
            weight: tx.weight,
            sigop_cost: tx.sigop_cost,
            count: 1,
        }
    }

    /// Add a transaction to the aggregate
    pub fn add(&mut self, tx: &TransactionCandidate) {
        self.fee = self.fee.saturating_add(tx.fee);
        self.weight = self.weight.saturating_add(tx.weight);
        self.sigop_cost = self.sigop_cost.saturating_add(tx.sigop_cost);
        self.count += 1;
    }

    /// Remove a transaction that has been selected into the block
    pub fn remove(&mut self, tx: &TransactionCandidate) {
        self.fee = self.fee.saturating_sub(tx.fee);
        self.weight = self.weight.saturating_sub(tx.weight);
        self.sigop_cost = self.sigop_cost.saturating_sub(tx.sigop_cost);
        self.count = self.count.saturating_sub(1);
    }

    /// Aggregate fee rate
    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::from_fee_and_weight(self.fee, self.weight)
    }

    /// Exact fee-rate comparison by cross multiplication (no rounding)
    pub fn cmp_fee_rate(&self, other: &Self) -> Ordering {
        let lhs = self.fee as u128 * other.weight as u128;
        let rhs = other.fee as u128 * self.weight as u128;
        lhs.cmp(&rhs)
    }
}

/// Chain tip the template is built on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    /// Tip block hash
    pub hash: H256,

    /// Tip height; the template targets `height + 1`
    pub height: Height,

    /// Median time past of the tip (last 11 blocks)
    pub median_time_past: i64,

    /// Compact difficulty bits required for the next block
    pub next_bits: u32,
}

impl ChainTip {
    /// Height of the block being assembled
    pub fn target_height(&self) -> Height {
        self.height.saturating_add(1)
    }
}

/// Where and when a spent output was confirmed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfirmation {
    /// Height of the confirming block
    pub height: Height,

    /// Median time past of the block preceding the confirming block
    pub median_time_past: i64,

    /// Output belongs to a coinbase transaction
    pub is_coinbase: bool,
}

/// Consensus lock-time evaluation switches
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockTimeFlags {
    /// Enforce relative (sequence) locks
    pub verify_sequence: bool,

    /// Use median time past instead of the block time as the time cutoff
    pub median_time_past: bool,
}

impl Default for LockTimeFlags {
    fn default() -> Self {
        Self {
            verify_sequence: true,
            median_time_past: true,
        }
    }
}

/// Everything the finality gate needs about one transaction's context
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceLockContext {
    /// Height of the block being assembled
    pub target_height: Height,

    /// Median time past of the tip
    pub tip_median_time_past: i64,

    /// Per input, confirmation data of the spent output
    pub inputs: Vec<InputConfirmation>,
}

/// Chain state a selection round is evaluated against
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainContext {
    /// Tip being extended
    pub tip: ChainTip,

    /// Header time of the block being assembled
    pub block_time: i64,
}

impl ChainContext {
    /// Height of the block being assembled
    pub fn target_height(&self) -> Height {
        self.tip.target_height()
    }

    /// Time cutoff for absolute time locks
    pub fn lock_time_cutoff(&self, flags: LockTimeFlags) -> i64 {
        if flags.median_time_past {
            self.tip.median_time_past
        } else {
            self.block_time
        }
    }
}
