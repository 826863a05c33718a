//! Static chain context
//!
//! Fixed tip plus a table of confirmed outputs. Outputs not in the table
//! resolve to an optional fallback confirmation.

use crate::domain::{ChainTip, InputConfirmation, OutPoint};
use crate::error::Result;
use crate::ports::ChainContextProvider;
use std::collections::HashMap;

/// Chain context backed by in-memory tables
#[derive(Clone, Debug)]
pub struct StaticChainContext {
    tip: ChainTip,
    confirmations: HashMap<OutPoint, InputConfirmation>,
    fallback: Option<InputConfirmation>,
}

impl StaticChainContext {
    /// Context with no known outputs
    pub fn new(tip: ChainTip) -> Self {
        Self {
            tip,
            confirmations: HashMap::new(),
            fallback: None,
        }
    }

    /// Register a confirmed output
    pub fn with_confirmation(mut self, outpoint: OutPoint, confirmation: InputConfirmation) -> Self {
        self.confirmations.insert(outpoint, confirmation);
        self
    }

    /// Confirmation reported for outputs not registered explicitly
    pub fn with_fallback(mut self, confirmation: InputConfirmation) -> Self {
        self.fallback = Some(confirmation);
        self
    }

    /// Replace the tip
    pub fn set_tip(&mut self, tip: ChainTip) {
        self.tip = tip;
    }

    /// Current tip
    pub fn tip(&self) -> &ChainTip {
        &self.tip
    }
}

impl ChainContextProvider for StaticChainContext {
    fn chain_tip(&self) -> Result<ChainTip> {
        Ok(self.tip.clone())
    }

    fn input_confirmation(&self, outpoint: &OutPoint) -> Option<InputConfirmation> {
        self.confirmations.get(outpoint).copied().or(self.fallback)
    }
}
