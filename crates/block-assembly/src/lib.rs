//! # Block Assembly - Proof-of-Work Block Production
//!
//! Turns a snapshot of pending transactions into a mined block:
//! - Ancestor-fee-rate package selection (child pays for parent)
//! - Lock-time, sequence-lock and coinbase-maturity gating
//! - Weight, sigop and fee-floor budget enforcement
//! - Coinbase construction and header finalization
//! - Cancellable multi-threaded nonce search behind a pluggable puzzle solver
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters (Outer)                                   │
//! │  - In-memory pool snapshot, static chain context    │
//! │  - Null-solution puzzle solver                      │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports (Middle)                                     │
//! │  - Inbound: BlockAssemblyService                    │
//! │  - Outbound: CandidatePoolView, ChainContextProvider│
//! │    PuzzleSolver, BlockSubmitter, InclusionReporter  │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (Inner - Pure Logic)                        │
//! │  - PackageSelector, BudgetEnforcer, finality gate   │
//! │  - TemplateBuilder, MiningSession                   │
//! │  - Invariants: budget, order, coinbase value        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Critical Invariants
//!
//! 1. **Resource Budget**: template weight ≤ max weight, sigop cost ≤ max sigop cost
//! 2. **Topological Order**: every in-block ancestor precedes its descendants
//! 3. **Finality**: every included transaction is final at the target height
//! 4. **No Duplicates**: unique transaction hashes
//! 5. **Coinbase Value**: coinbase pays exactly subsidy + fees
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let assembler = BlockAssembler::new(AssemblerConfig::default(), ports)?;
//! let produced = assembler.produce_block().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Reference adapters for the outbound ports
pub mod adapters;
/// Domain models and business logic
pub mod domain;
pub mod ports;
pub mod service;
pub mod utils;

mod config;
mod error;
mod metrics;

#[cfg(test)]
mod test_utils;

pub use config::{AssemblerConfig, ConsensusConfig, MiningConfig, SelectorConfig};
pub use error::{AssemblyError, Result};
pub use metrics::Metrics;

pub use domain::{
    BlockHeader, BlockTemplate, BudgetEnforcer, ChainContext, ChainTip, FeeRate, InclusionBatch,
    MinedBlock, PackageSelector, SelectionReport, TransactionCandidate,
};

pub use ports::{
    AssembledTemplate, AssemblyStatus, BlockAssemblyService, BlockSubmitter, CandidatePoolView,
    ChainContextProvider, InclusionReporter, ProducedBlock, PuzzleSolver, SubmissionReceipt,
};

pub use service::{AssemblerPorts, BlockAssembler};

/// Consensus maximum block weight
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// Default block weight limit used by the selector
pub const DEFAULT_BLOCK_MAX_WEIGHT: u64 = MAX_BLOCK_WEIGHT - 1_000_000;

/// Consensus maximum block sigop cost
pub const MAX_BLOCK_SIGOPS_COST: u64 = 80_000;

/// Default minimum package fee rate (base units per 1000 weight)
pub const DEFAULT_BLOCK_MIN_FEE_RATE: u64 = 1_000;

/// Default number of packages popped per round
pub const DEFAULT_MAX_CANDIDATES_CONSIDERED: usize = 1_000_000;
