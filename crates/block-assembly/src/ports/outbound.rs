//! Outbound ports (driven side - SPI)
//!
//! The pool view, chain context and puzzle solver are called from the
//! blocking selection and mining threads and are therefore synchronous.
//! Submission and inclusion reporting cross process boundaries and are
//! async.

use crate::domain::{
    CancelFlag, ChainTip, InclusionBatch, InputConfirmation, MinedBlock, OutPoint,
    PuzzleHashState, TransactionCandidate,
};
use crate::error::Result;
use async_trait::async_trait;
use primitive_types::H256;

/// Port: read-only snapshot of the pending transaction pool
///
/// Implementations must keep the snapshot stable for the duration of one
/// selection round.
pub trait CandidatePoolView: Send + Sync {
    /// Candidates ordered by ancestor-package fee rate, best first
    fn iter_by_ancestor_fee_rate(&self) -> Box<dyn Iterator<Item = &TransactionCandidate> + '_>;

    /// Transitive unconfirmed ancestors of `hash` (excluding itself), or
    /// `None` if `hash` is not in the snapshot
    fn ancestors_of(&self, hash: &H256) -> Option<Vec<H256>>;

    /// Transitive unconfirmed descendants of `hash` (excluding itself), or
    /// `None` if `hash` is not in the snapshot
    fn descendants_of(&self, hash: &H256) -> Option<Vec<H256>>;

    /// Number of candidates
    fn len(&self) -> usize;

    /// Snapshot is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Port: chain state needed for template construction
pub trait ChainContextProvider: Send + Sync {
    /// Current best tip, with the bits required for the next block
    fn chain_tip(&self) -> Result<ChainTip>;

    /// Confirmation data for a confirmed output, `None` if unknown or spent
    fn input_confirmation(&self, outpoint: &OutPoint) -> Option<InputConfirmation>;
}

/// Port: memory-hard puzzle solver and verifier
pub trait PuzzleSolver: Send + Sync {
    /// Search solutions for one nonce.
    ///
    /// Each candidate is passed to `on_candidate`; a `true` return means it
    /// was accepted and the solver must stop. Returns `Ok(true)` when a
    /// candidate was accepted, `Ok(false)` when the search space for this
    /// nonce is exhausted, and `PuzzleSolveCancelled` if `cancel` was raised.
    fn solve(
        &self,
        state: &PuzzleHashState,
        cancel: &CancelFlag,
        on_candidate: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<bool>;

    /// Check a solution against the nonce-dependent hash state
    fn verify(&self, state: &PuzzleHashState, solution: &[u8]) -> bool;

    /// Solver name for logs
    fn name(&self) -> &str {
        "puzzle-solver"
    }
}

/// Port: hand a mined block onward
#[async_trait]
pub trait BlockSubmitter: Send + Sync {
    /// Submit a block whose header passed the proof-of-work check
    async fn submit_block(&self, block: MinedBlock) -> Result<SubmissionReceipt>;
}

/// Port: tell the pool owner which transactions a template included
#[async_trait]
pub trait InclusionReporter: Send + Sync {
    /// Report one round's inclusion batch
    async fn report_inclusion(&self, batch: InclusionBatch) -> Result<()>;
}

/// Block submission receipt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Block hash
    pub block_hash: H256,

    /// Submission timestamp (UNIX seconds)
    pub submitted_at: i64,

    /// Acceptance status
    pub accepted: bool,
}
