//! Budget enforcer
//!
//! Pre-checks a whole package against the block's weight and sigop limits
//! and the minimum inclusion fee rate. Packages are admitted whole or not at
//! all.

use super::entities::{Amount, FeeRate, PackageAggregate};
use crate::error::AssemblyError;

/// Running block totals
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockTotals {
    /// Cumulative weight (including coinbase reservation)
    pub weight: u64,
    /// Cumulative sigop cost (including coinbase reservation)
    pub sigop_cost: u64,
    /// Cumulative fees of selected transactions
    pub fees: Amount,
}

/// Outcome of checking a package against the budget
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BudgetVerdict {
    /// Package fits and pays enough
    Admit,
    /// Package fee rate is below the minimum
    BelowMinimumFeeRate {
        /// Fee the package would have to pay
        required: Amount,
    },
    /// Package would push weight or sigop cost past the limit
    ExceedsLimits {
        /// Weight after adding the package
        weight: u64,
        /// Sigop cost after adding the package
        sigop_cost: u64,
    },
}

/// Block resource limits and fee floor
#[derive(Clone, Debug)]
pub struct BudgetEnforcer {
    max_weight: u64,
    max_sigop_cost: u64,
    min_fee_rate: FeeRate,
}

impl BudgetEnforcer {
    /// Create a new enforcer
    pub fn new(max_weight: u64, max_sigop_cost: u64, min_fee_rate: FeeRate) -> Self {
        Self {
            max_weight,
            max_sigop_cost,
            min_fee_rate,
        }
    }

    /// Configured maximum block weight
    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }

    /// Configured maximum sigop cost
    pub fn max_sigop_cost(&self) -> u64 {
        self.max_sigop_cost
    }

    /// Configured minimum fee rate
    pub fn min_fee_rate(&self) -> FeeRate {
        self.min_fee_rate
    }

    /// Whether the package pays at least the minimum fee rate
    pub fn meets_fee_floor(&self, package: &PackageAggregate) -> Result<(), Amount> {
        let required = self.min_fee_rate.fee_for(package.weight);
        if package.fee < required {
            Err(required)
        } else {
            Ok(())
        }
    }

    /// Whether the package fits into the remaining weight and sigop budget
    pub fn fits(&self, totals: &BlockTotals, package: &PackageAggregate) -> Result<(), (u64, u64)> {
        let weight = totals.weight.saturating_add(package.weight);
        let sigop_cost = totals.sigop_cost.saturating_add(package.sigop_cost);
        if weight > self.max_weight || sigop_cost > self.max_sigop_cost {
            Err((weight, sigop_cost))
        } else {
            Ok(())
        }
    }

    /// Fee floor first, then resource limits.
    pub fn check(&self, totals: &BlockTotals, package: &PackageAggregate) -> BudgetVerdict {
        if let Err(required) = self.meets_fee_floor(package) {
            return BudgetVerdict::BelowMinimumFeeRate { required };
        }
        if let Err((weight, sigop_cost)) = self.fits(totals, package) {
            return BudgetVerdict::ExceedsLimits { weight, sigop_cost };
        }
        BudgetVerdict::Admit
    }

    /// Structured error for a rejected verdict
    pub fn to_error(&self, package: &PackageAggregate, verdict: BudgetVerdict) -> Option<AssemblyError> {
        match verdict {
            BudgetVerdict::Admit => None,
            BudgetVerdict::BelowMinimumFeeRate { required } => {
                Some(AssemblyError::FeeRateBelowMinimum {
                    fee: package.fee,
                    weight: package.weight,
                    required,
                })
            }
            BudgetVerdict::ExceedsLimits { weight, sigop_cost } => {
                Some(AssemblyError::ResourceBudgetExceeded {
                    weight,
                    max_weight: self.max_weight,
                    sigop_cost,
                    max_sigop_cost: self.max_sigop_cost,
                })
            }
        }
    }

    /// Commit an admitted package to the running totals
    pub fn commit(&self, totals: &mut BlockTotals, package: &PackageAggregate) {
        totals.weight = totals.weight.saturating_add(package.weight);
        totals.sigop_cost = totals.sigop_cost.saturating_add(package.sigop_cost);
        totals.fees = totals.fees.saturating_add(package.fee);
    }

    /// Whether less than `margin` weight remains
    pub fn nearly_full(&self, totals: &BlockTotals, margin: u64) -> bool {
        totals.weight > self.max_weight.saturating_sub(margin)
    }
}
