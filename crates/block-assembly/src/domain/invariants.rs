//! Invariant checkers for block assembly
//!
//! These functions enforce the invariants that MUST hold for every
//! finalized template before it is handed to the mining loop.

use super::budget::BudgetEnforcer;
use super::entities::Height;
use super::template::{block_subsidy, BlockTemplate};
use crate::error::{AssemblyError, Result};
use crate::utils::hashing::merkle_root;
use primitive_types::H256;
use std::collections::{HashMap, HashSet};

/// INVARIANT-1: Resource Budget
/// Cumulative weight and sigop cost MUST NOT exceed the block limits.
pub fn check_resource_budget(template: &BlockTemplate, budget: &BudgetEnforcer) -> Result<()> {
    if template.total_weight > budget.max_weight()
        || template.total_sigop_cost > budget.max_sigop_cost()
    {
        return Err(AssemblyError::ResourceBudgetExceeded {
            weight: template.total_weight,
            max_weight: budget.max_weight(),
            sigop_cost: template.total_sigop_cost,
            max_sigop_cost: budget.max_sigop_cost(),
        });
    }
    Ok(())
}

/// INVARIANT-2: Topological Order
/// A transaction spending another included transaction MUST come after it.
pub fn check_topological_order(template: &BlockTemplate) -> Result<()> {
    let positions: HashMap<H256, usize> = template
        .transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| (tx.hash, i))
        .collect();

    for (i, tx) in template.transactions.iter().enumerate() {
        for input in &tx.inputs {
            if let Some(&parent_pos) = positions.get(&input.prevout.hash) {
                if parent_pos >= i {
                    return Err(AssemblyError::OrderingViolation {
                        child: tx.hash,
                        ancestor: input.prevout.hash,
                    });
                }
            }
        }
    }
    Ok(())
}

/// INVARIANT-3: No Duplicates
/// No transaction hash appears more than once.
pub fn check_no_duplicates(template: &BlockTemplate) -> Result<()> {
    let mut seen = HashSet::with_capacity(template.transactions.len());
    for tx in &template.transactions {
        if !seen.insert(tx.hash) {
            return Err(AssemblyError::DuplicateTransaction(tx.hash));
        }
    }
    Ok(())
}

/// INVARIANT-4: Coinbase Value
/// The coinbase MUST pay exactly subsidy plus the fees of included
/// transactions.
pub fn check_coinbase_value(template: &BlockTemplate, halving_interval: Height) -> Result<()> {
    let fees = template
        .transactions
        .iter()
        .try_fold(0u64, |acc, tx| acc.checked_add(tx.fee))
        .ok_or_else(|| AssemblyError::Internal("fee sum overflow".into()))?;

    let expected = block_subsidy(template.height, halving_interval)
        .checked_add(fees)
        .ok_or_else(|| AssemblyError::Internal("coinbase value overflow".into()))?;

    if template.coinbase.value != expected || template.total_fees != fees {
        return Err(AssemblyError::CoinbaseValueMismatch {
            expected,
            actual: template.coinbase.value,
        });
    }
    Ok(())
}

/// INVARIANT-5: Merkle Commitment
/// The header commits to the coinbase followed by every transaction.
pub fn check_merkle_root(template: &BlockTemplate) -> Result<()> {
    let computed = merkle_root(&template.ordered_hashes());
    if computed != template.header.merkle_root {
        return Err(AssemblyError::Internal(format!(
            "merkle root mismatch: header {:?}, computed {:?}",
            template.header.merkle_root, computed
        )));
    }
    Ok(())
}

/// Validate all invariants for a finalized template
pub fn validate_block_template(
    template: &BlockTemplate,
    budget: &BudgetEnforcer,
    halving_interval: Height,
) -> Result<()> {
    check_resource_budget(template, budget)?;
    check_no_duplicates(template)?;
    check_topological_order(template)?;
    check_coinbase_value(template, halving_interval)?;
    check_merkle_root(template)?;
    Ok(())
}
