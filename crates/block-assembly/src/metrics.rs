//! Metrics collection for block assembly

use crate::domain::RejectReason;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for block assembly
#[derive(Debug, Default)]
pub struct Metrics {
    /// Selection rounds completed
    pub rounds_completed: AtomicU64,

    /// Total transactions included in templates
    pub transactions_included: AtomicU64,

    /// Total fees collected in templates
    pub total_fees_collected: AtomicU64,

    /// Packages rejected below the fee floor
    pub rejected_fee_rate: AtomicU64,

    /// Packages rejected by weight or sigop budget
    pub rejected_budget: AtomicU64,

    /// Candidates rejected by the finality gate
    pub rejected_finality: AtomicU64,

    /// Candidates rejected for unknown inputs
    pub rejected_missing_inputs: AtomicU64,

    /// Candidates skipped because an ancestor was rejected
    pub rejected_descendants: AtomicU64,

    /// Nonces tried by the mining loop
    pub nonces_tried: AtomicU64,

    /// Candidate solutions rejected by the solver or the target
    pub solutions_rejected: AtomicU64,

    /// Blocks mined
    pub blocks_mined: AtomicU64,

    /// Mining runs cancelled
    pub mining_cancelled: AtomicU64,

    /// Total selection time (microseconds)
    pub selection_time_us: AtomicU64,

    /// Total mining time (milliseconds)
    pub mining_time_ms: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished selection round
    pub fn record_round(&self, tx_count: usize, fees: u64, duration_us: u64) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        self.transactions_included
            .fetch_add(tx_count as u64, Ordering::Relaxed);
        self.total_fees_collected.fetch_add(fees, Ordering::Relaxed);
        self.selection_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    /// Record one skipped candidate
    pub fn record_rejection(&self, reason: &RejectReason) {
        let counter = match reason {
            RejectReason::FeeRateBelowMinimum { .. } => &self.rejected_fee_rate,
            RejectReason::ResourceBudgetExceeded { .. } => &self.rejected_budget,
            RejectReason::Finality(_) => &self.rejected_finality,
            RejectReason::MissingInputs => &self.rejected_missing_inputs,
            RejectReason::AncestorRejected { .. } => &self.rejected_descendants,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a mining run
    pub fn record_mining(&self, nonces: u64, rejected: u64, duration_ms: u64) {
        self.nonces_tried.fetch_add(nonces, Ordering::Relaxed);
        self.solutions_rejected.fetch_add(rejected, Ordering::Relaxed);
        self.mining_time_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Record a mined block
    pub fn record_block_mined(&self) {
        self.blocks_mined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cancelled mining run
    pub fn record_mining_cancelled(&self) {
        self.mining_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get blocks mined
    pub fn get_blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    /// Get rounds completed
    pub fn get_rounds_completed(&self) -> u64 {
        self.rounds_completed.load(Ordering::Relaxed)
    }

    /// Get total rejections across all reasons
    pub fn get_total_rejections(&self) -> u64 {
        [
            &self.rejected_fee_rate,
            &self.rejected_budget,
            &self.rejected_finality,
            &self.rejected_missing_inputs,
            &self.rejected_descendants,
        ]
        .iter()
        .map(|c| c.load(Ordering::Relaxed))
        .sum()
    }

    /// Get average transactions per template
    pub fn get_avg_transactions_per_round(&self) -> f64 {
        let rounds = self.rounds_completed.load(Ordering::Relaxed);
        if rounds == 0 {
            return 0.0;
        }
        let txs = self.transactions_included.load(Ordering::Relaxed);
        txs as f64 / rounds as f64
    }

    /// Get average selection time (microseconds)
    pub fn get_avg_selection_time(&self) -> f64 {
        let rounds = self.rounds_completed.load(Ordering::Relaxed);
        if rounds == 0 {
            return 0.0;
        }
        let time = self.selection_time_us.load(Ordering::Relaxed);
        time as f64 / rounds as f64
    }
}
