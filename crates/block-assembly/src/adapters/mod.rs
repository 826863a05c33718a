//! Reference adapters
//!
//! In-memory implementations of the outbound ports, used by embedders that
//! own no pool or chain index of their own and by the test suites.

mod chain;
mod pool;
mod solver;

pub use chain::StaticChainContext;
pub use pool::InMemoryPoolSnapshot;
pub use solver::NullSolutionSolver;
