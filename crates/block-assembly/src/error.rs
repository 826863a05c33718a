//! Error types for the block assembly subsystem

use primitive_types::H256;
use thiserror::Error;

/// Result type alias for block assembly operations
pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Errors that can occur during template assembly and mining
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Package would push the block over its weight or sigop budget
    #[error(
        "Resource budget exceeded: weight {weight}/{max_weight}, sigop cost {sigop_cost}/{max_sigop_cost}"
    )]
    ResourceBudgetExceeded {
        /// Block weight after adding the package
        weight: u64,
        /// Configured maximum block weight
        max_weight: u64,
        /// Sigop cost after adding the package
        sigop_cost: u64,
        /// Configured maximum sigop cost
        max_sigop_cost: u64,
    },

    /// Package fee does not cover the minimum inclusion fee rate
    #[error("Fee rate below minimum: package pays {fee}, minimum for {weight} weight is {required}")]
    FeeRateBelowMinimum {
        /// Aggregate package fee
        fee: u64,
        /// Aggregate package weight
        weight: u64,
        /// Fee required at the configured minimum rate
        required: u64,
    },

    /// Absolute lock-time, sequence lock or coinbase maturity not satisfied
    #[error("Finality violation for {tx_hash:?}: {reason}")]
    FinalityViolation {
        /// Offending transaction
        tx_hash: H256,
        /// Which rule failed
        reason: String,
    },

    /// An input references an output unknown to both the pool and the chain
    #[error("Missing inputs for {tx_hash:?}")]
    MissingInputs {
        /// Offending transaction
        tx_hash: H256,
    },

    /// Mining was cancelled before a solution was found
    #[error("Puzzle solve cancelled after {nonces_tried} nonces")]
    PuzzleSolveCancelled {
        /// Nonces attempted before cancellation
        nonces_tried: u64,
    },

    /// The assigned nonce range was exhausted; the header preimage must change
    #[error("Nonce space exhausted after {nonces_tried} nonces")]
    NonceSpaceExhausted {
        /// Nonces attempted
        nonces_tried: u64,
    },

    /// External puzzle solver failure
    #[error("Solver error: {0}")]
    Solver(String),

    /// The pool snapshot contradicts itself (unknown ancestor, cycle, duplicate)
    #[error("Inconsistent pool snapshot: {0}")]
    InconsistentSnapshot(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Topological invariant broken in a produced template
    #[error("Ordering violation: {child:?} precedes its ancestor {ancestor:?}")]
    OrderingViolation {
        /// Transaction placed too early
        child: H256,
        /// Ancestor placed after (or missing)
        ancestor: H256,
    },

    /// Same transaction appears twice in a template
    #[error("Duplicate transaction {0:?}")]
    DuplicateTransaction(H256),

    /// Coinbase value does not match subsidy plus fees
    #[error("Coinbase value mismatch: expected {expected}, got {actual}")]
    CoinbaseValueMismatch {
        /// Subsidy plus fees
        expected: u64,
        /// Value carried by the coinbase
        actual: u64,
    },

    /// Chain context collaborator failure
    #[error("Chain context error: {0}")]
    ChainContext(String),

    /// Block submission failure
    #[error("Submission error: {0}")]
    Submission(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssemblyError {
    /// Rejections the selector recovers from locally by skipping the package
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ResourceBudgetExceeded { .. }
                | Self::FeeRateBelowMinimum { .. }
                | Self::FinalityViolation { .. }
                | Self::MissingInputs { .. }
                | Self::PuzzleSolveCancelled { .. }
        )
    }

    /// Errors that require the caller to rebuild the template or fix config
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::NonceSpaceExhausted { .. }
                | Self::InvalidConfig(_)
                | Self::InconsistentSnapshot(_)
                | Self::OrderingViolation { .. }
                | Self::DuplicateTransaction(_)
                | Self::CoinbaseValueMismatch { .. }
                | Self::Internal(_)
        )
    }
}
