//! Domain layer - Pure business logic for block assembly
//!
//! Everything here is synchronous and free of I/O; the service layer moves
//! it onto blocking threads.
//!
//! ## Entities
//!
//! - [`TransactionCandidate`]: pending transaction with selection metadata
//! - [`BlockTemplate`]: frozen candidate block with finalized coinbase
//! - [`PuzzleHashState`]: nonce-dependent hash state handed to the solver
//!
//! ## Services
//!
//! - [`PackageSelector`]: greedy ancestor-fee-rate package selection
//! - [`BudgetEnforcer`]: weight, sigop and fee-floor pre-checks
//! - [`finality`]: lock-time, sequence-lock and maturity gate
//! - [`MiningSession`] / [`mine_parallel`]: nonce search
//!
//! ## Invariants
//!
//! 1. Resource budget (weight and sigop cost)
//! 2. Topological order (ancestors precede descendants)
//! 3. No duplicate transactions
//! 4. Coinbase pays subsidy + fees exactly
//! 5. Header merkle root commits to the block's transactions

pub mod budget;
pub mod difficulty;
mod entities;
pub mod finality;
pub mod invariants;
pub mod mining;
pub mod selector;
pub mod template;

pub use budget::{BlockTotals, BudgetEnforcer, BudgetVerdict};
pub use difficulty::{check_proof_of_work, target_to_compact, CompactTarget};
pub use entities::*;
pub use finality::{FinalityFailure, LockPoints};
pub use invariants::validate_block_template;
pub use mining::{
    mine_parallel, CancelFlag, MinedBlock, MiningOutcome, MiningSession, MiningState, NonceRange,
    PuzzleHashState, PuzzleHeaderPreimage,
};
pub use selector::{
    CandidateArena, CandidateId, InclusionBatch, PackageQueue, PackageSelector, RejectReason,
    SelectionReport, SelectionStop, SkippedCandidate,
};
pub use template::{
    BlockHeader, BlockTemplate, CoinbaseParams, CoinbaseReservation, CoinbaseTransaction,
    TemplateBuilder,
};
