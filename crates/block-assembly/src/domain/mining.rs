//! Mining loop
//!
//! `Idle → Hashing → {Found, Cancelled, Exhausted}`.
//!
//! The header preimage (everything but nonce and solution) is hashed once
//! into a SHA-256 midstate. For every nonce the midstate is cloned and
//! extended with the 32-byte little-endian nonce; the solver receives that
//! state and reports candidate solutions through a callback. A candidate
//! ends the search only if the solver verifies it AND the header hash meets
//! the compact target.

use super::difficulty::{check_proof_of_work, describe_target, relative_difficulty};
use super::template::{BlockHeader, BlockTemplate};
use crate::error::{AssemblyError, Result};
use crate::ports::PuzzleSolver;
use crate::utils::hashing::{finalize_sha256d, write_compact_size};
use primitive_types::{H256, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation signal, checked at every nonce boundary and inside
/// the solver
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelFlag {
    /// New, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag that is also raised whenever `self` is
    pub fn linked(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    /// Raise the flag
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether this flag or its parent was raised
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.load(Ordering::Relaxed))
    }

    /// Lower this flag (the parent is untouched)
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Serialized header without nonce and solution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PuzzleHeaderPreimage {
    bytes: Vec<u8>,
}

impl PuzzleHeaderPreimage {
    /// Preimage of `header`
    pub fn from_header(header: &BlockHeader) -> Self {
        Self {
            bytes: header.preimage_bytes(),
        }
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 state after absorbing the preimage
    pub fn midstate(&self) -> Sha256 {
        let mut state = Sha256::new();
        state.update(&self.bytes);
        state
    }
}

/// Nonce-dependent hash state handed to the solver
#[derive(Clone)]
pub struct PuzzleHashState {
    state: Sha256,
    nonce: U256,
}

impl std::fmt::Debug for PuzzleHashState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PuzzleHashState")
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

impl PuzzleHashState {
    /// Extend the preimage midstate with `nonce`
    pub fn new(midstate: &Sha256, nonce: U256) -> Self {
        let mut state = midstate.clone();
        state.update(nonce_to_h256(nonce).as_bytes());
        Self { state, nonce }
    }

    /// Nonce this state was built for
    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// Nonce as the 32 header bytes
    pub fn nonce_bytes(&self) -> H256 {
        nonce_to_h256(self.nonce)
    }

    /// Running hash state (preimage and nonce absorbed)
    pub fn hash_state(&self) -> Sha256 {
        self.state.clone()
    }

    /// Header hash for `solution`
    pub fn header_hash(&self, solution: &[u8]) -> H256 {
        let mut state = self.state.clone();
        let mut len = Vec::with_capacity(9);
        write_compact_size(&mut len, solution.len() as u64);
        state.update(&len);
        state.update(solution);
        H256::from(finalize_sha256d(state))
    }
}

/// Nonce as header bytes (little-endian)
pub fn nonce_to_h256(nonce: U256) -> H256 {
    let mut bytes = [0u8; 32];
    nonce.to_little_endian(&mut bytes);
    H256::from(bytes)
}

/// Inclusive nonce interval assigned to one worker
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRange {
    /// First nonce
    pub start: U256,
    /// Last nonce
    pub end: U256,
}

impl NonceRange {
    /// Range from `start` to `end`, both inclusive
    pub fn new(start: U256, end: U256) -> Self {
        Self { start, end }
    }

    /// The whole 256-bit nonce space
    pub fn full() -> Self {
        Self::new(U256::zero(), U256::MAX)
    }

    /// Split into at most `parts` disjoint ranges covering this one
    pub fn split(&self, parts: usize) -> Vec<NonceRange> {
        if self.end < self.start {
            return Vec::new();
        }
        let width = self.end - self.start;
        let requested = U256::from(parts.max(1) as u64);
        let parts = if width < requested {
            width.max(U256::one())
        } else {
            requested
        };
        let step = width / parts;
        let count = parts.low_u64();

        (0..count)
            .map(|i| {
                let start = self.start + step * U256::from(i);
                let end = if i + 1 == count {
                    self.end
                } else {
                    self.start + step * U256::from(i + 1) - U256::one()
                };
                NonceRange::new(start, end)
            })
            .collect()
    }
}

/// Mining state machine
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiningState {
    /// Not started
    Idle,
    /// Iterating nonces
    Hashing,
    /// A valid solution was found
    Found,
    /// Stopped by the cancel flag
    Cancelled,
    /// Nonce range ran out
    Exhausted,
}

/// Successful mining result
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiningOutcome {
    /// Header with the winning nonce and solution
    pub header: BlockHeader,
    /// Header hash
    pub hash: H256,
    /// Nonces tried (all workers)
    pub nonces_tried: u64,
    /// Candidate solutions that failed verification or the target
    pub solutions_rejected: u64,
}

/// Block ready for submission
#[derive(Clone, Debug)]
pub struct MinedBlock {
    /// Template the block was mined from
    pub template: Arc<BlockTemplate>,
    /// Final header
    pub header: BlockHeader,
    /// Header hash
    pub hash: H256,
}

impl MinedBlock {
    /// Assemble from a template and a mining outcome
    pub fn new(template: Arc<BlockTemplate>, outcome: &MiningOutcome) -> Self {
        Self {
            template,
            header: outcome.header.clone(),
            hash: outcome.hash,
        }
    }

    /// Height of the block
    pub fn height(&self) -> u32 {
        self.template.height
    }
}

/// Single-worker mining over one nonce range
pub struct MiningSession<'a> {
    solver: &'a dyn PuzzleSolver,
    pow_limit: U256,
    cancel: CancelFlag,
    state: MiningState,
    nonces_tried: u64,
    solutions_rejected: u64,
}

impl<'a> MiningSession<'a> {
    /// New idle session
    pub fn new(solver: &'a dyn PuzzleSolver, pow_limit: U256, cancel: CancelFlag) -> Self {
        Self {
            solver,
            pow_limit,
            cancel,
            state: MiningState::Idle,
            nonces_tried: 0,
            solutions_rejected: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> MiningState {
        self.state
    }

    /// Nonces tried so far
    pub fn nonces_tried(&self) -> u64 {
        self.nonces_tried
    }

    /// Candidates rejected so far
    pub fn solutions_rejected(&self) -> u64 {
        self.solutions_rejected
    }

    fn cancelled(&mut self) -> AssemblyError {
        self.state = MiningState::Cancelled;
        AssemblyError::PuzzleSolveCancelled {
            nonces_tried: self.nonces_tried,
        }
    }

    fn exhausted(&mut self) -> AssemblyError {
        self.state = MiningState::Exhausted;
        AssemblyError::NonceSpaceExhausted {
            nonces_tried: self.nonces_tried,
        }
    }

    /// Iterate `range` until a valid solution, cancellation or exhaustion
    pub fn run(&mut self, header: &BlockHeader, range: NonceRange) -> Result<MiningOutcome> {
        self.state = MiningState::Hashing;
        let midstate = PuzzleHeaderPreimage::from_header(header).midstate();
        let bits = header.bits;
        let pow_limit = self.pow_limit;
        let solver = self.solver;

        if range.end < range.start {
            return Err(self.exhausted());
        }

        let mut nonce = range.start;
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let hash_state = PuzzleHashState::new(&midstate, nonce);
            self.nonces_tried += 1;

            let mut found: Option<(Vec<u8>, H256)> = None;
            let mut rejected = 0u64;
            let solved = solver.solve(&hash_state, &self.cancel, &mut |solution: &[u8]| {
                if !solver.verify(&hash_state, solution) {
                    rejected += 1;
                    return false;
                }
                let hash = hash_state.header_hash(solution);
                if check_proof_of_work(&hash, bits, pow_limit) {
                    found = Some((solution.to_vec(), hash));
                    true
                } else {
                    rejected += 1;
                    false
                }
            });
            self.solutions_rejected += rejected;

            match solved {
                Ok(_) => {}
                Err(AssemblyError::PuzzleSolveCancelled { .. }) => return Err(self.cancelled()),
                Err(e) => {
                    self.state = MiningState::Idle;
                    return Err(match e {
                        AssemblyError::Solver(_) => e,
                        other => AssemblyError::Solver(format!("{}: {}", solver.name(), other)),
                    });
                }
            }

            if let Some((solution, hash)) = found {
                self.state = MiningState::Found;
                let mut mined = header.clone();
                mined.nonce = hash_state.nonce_bytes();
                mined.solution = solution;
                return Ok(MiningOutcome {
                    header: mined,
                    hash,
                    nonces_tried: self.nonces_tried,
                    solutions_rejected: self.solutions_rejected,
                });
            }

            if nonce >= range.end {
                return Err(self.exhausted());
            }
            nonce = match nonce.checked_add(U256::one()) {
                Some(next) => next,
                None => return Err(self.exhausted()),
            };
        }
    }
}

/// Mine `header` with `workers` threads over disjoint parts of `range`.
///
/// The first valid solution raises a round-local cancel flag that stops the
/// other workers; raising `cancel` stops all of them.
#[tracing::instrument(skip(solver, header, cancel), fields(solver = solver.name(), bits = header.bits))]
pub fn mine_parallel(
    solver: &dyn PuzzleSolver,
    header: &BlockHeader,
    pow_limit: U256,
    workers: usize,
    range: NonceRange,
    cancel: &CancelFlag,
) -> Result<MiningOutcome> {
    let ranges = range.split(workers);
    if ranges.is_empty() {
        return Err(AssemblyError::NonceSpaceExhausted { nonces_tried: 0 });
    }
    let round = cancel.linked();

    tracing::debug!(
        workers = ranges.len(),
        target = %describe_target(header.bits),
        difficulty = relative_difficulty(header.bits, pow_limit),
        "starting proof-of-work search"
    );

    let results: Vec<Result<MiningOutcome>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .iter()
            .map(|range| {
                let round = round.clone();
                let range = *range;
                scope.spawn(move || {
                    let mut session = MiningSession::new(solver, pow_limit, round.clone());
                    let result = session.run(header, range);
                    if result.is_ok() {
                        round.cancel();
                    }
                    result
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(AssemblyError::Internal("mining worker panicked".into())))
            })
            .collect()
    });

    let mut nonces_tried = 0u64;
    let mut solutions_rejected = 0u64;
    let mut winner: Option<MiningOutcome> = None;
    let mut failure: Option<AssemblyError> = None;
    let mut all_exhausted = true;

    for result in results {
        match result {
            Ok(outcome) => {
                nonces_tried += outcome.nonces_tried;
                solutions_rejected += outcome.solutions_rejected;
                all_exhausted = false;
                if winner.is_none() {
                    winner = Some(outcome);
                }
            }
            Err(AssemblyError::PuzzleSolveCancelled { nonces_tried: n }) => {
                nonces_tried += n;
                all_exhausted = false;
            }
            Err(AssemblyError::NonceSpaceExhausted { nonces_tried: n }) => {
                nonces_tried += n;
            }
            Err(e) => {
                all_exhausted = false;
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(mut outcome) = winner {
        outcome.nonces_tried = nonces_tried;
        outcome.solutions_rejected = solutions_rejected;
        tracing::info!(hash = ?outcome.hash, nonces_tried, "proof-of-work solution found");
        return Ok(outcome);
    }
    if let Some(e) = failure {
        return Err(e);
    }
    if all_exhausted {
        tracing::warn!(nonces_tried, "nonce range exhausted without a solution");
        return Err(AssemblyError::NonceSpaceExhausted { nonces_tried });
    }
    Err(AssemblyError::PuzzleSolveCancelled { nonces_tried })
}
