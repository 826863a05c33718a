//! Trivial puzzle solver
//!
//! The puzzle accepts exactly one solution per nonce: the empty one. Mining
//! then degenerates to plain double SHA-256 nonce grinding, which is what
//! regtest-style networks and tests need.

use crate::domain::{CancelFlag, PuzzleHashState};
use crate::error::{AssemblyError, Result};
use crate::ports::PuzzleSolver;

/// Solver whose only solution is the empty byte string
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSolutionSolver;

impl PuzzleSolver for NullSolutionSolver {
    fn solve(
        &self,
        _state: &PuzzleHashState,
        cancel: &CancelFlag,
        on_candidate: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(AssemblyError::PuzzleSolveCancelled { nonces_tried: 0 });
        }
        Ok(on_candidate(&[]))
    }

    fn verify(&self, _state: &PuzzleHashState, solution: &[u8]) -> bool {
        solution.is_empty()
    }

    fn name(&self) -> &str {
        "null-solution"
    }
}
