//! In-memory rule collection and its reversible edits.

use std::collections::HashSet;

use clashdash_rules::{Fault, Rule, RuleId};
use serde::Serialize;

use crate::error::StoreError;

/// Ordered rules for one device plus the master switch.
///
/// Order is the on-device order and is never sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub master_enabled: bool,
    /// Decode faults from the last load.
    pub faults: Vec<Fault>,
}

/// Exact inverse of one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    /// Remove the entry inserted at this index.
    Remove(usize),
    /// Put back the previous value at this index.
    Replace(usize, Rule),
    /// Re-insert a removed entry at its original index.
    Restore(usize, Rule),
    /// Restore the previous ordering.
    Reorder(Vec<Rule>),
    /// Restore the previous master flag.
    Master(bool),
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, master_enabled: bool, faults: Vec<Fault>) -> Self {
        Self {
            rules,
            master_enabled,
            faults,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn position(&self, id: RuleId) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    fn require(&self, id: RuleId) -> Result<usize, StoreError> {
        self.position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn insert(&mut self, rule: Rule, at_front: bool) -> Undo {
        let index = if at_front { 0 } else { self.rules.len() };
        self.rules.insert(index, rule);
        Undo::Remove(index)
    }

    /// Replace the entry with the same id, in place.
    pub fn replace(&mut self, rule: Rule) -> Result<Undo, StoreError> {
        let index = self.require(rule.id)?;
        let previous = std::mem::replace(&mut self.rules[index], rule);
        Ok(Undo::Replace(index, previous))
    }

    pub fn remove(&mut self, id: RuleId) -> Result<Undo, StoreError> {
        let index = self.require(id)?;
        let removed = self.rules.remove(index);
        Ok(Undo::Restore(index, removed))
    }

    pub fn toggle(&mut self, id: RuleId) -> Result<Undo, StoreError> {
        let index = self.require(id)?;
        let previous = self.rules[index].clone();
        self.rules[index].enabled = !previous.enabled;
        Ok(Undo::Replace(index, previous))
    }

    /// Rearrange to `order`, which must name every current rule exactly once.
    pub fn reorder(&mut self, order: &[RuleId]) -> Result<Undo, StoreError> {
        if order.len() != self.rules.len() {
            return Err(StoreError::Validation(format!(
                "new order names {} rules, store holds {}",
                order.len(),
                self.rules.len()
            )));
        }
        let mut seen = HashSet::with_capacity(order.len());
        if let Some(dup) = order.iter().find(|id| !seen.insert(**id)) {
            return Err(StoreError::Validation(format!(
                "rule {dup} appears twice in new order"
            )));
        }

        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            let index = self.require(*id)?;
            reordered.push(self.rules[index].clone());
        }
        let previous = std::mem::replace(&mut self.rules, reordered);
        Ok(Undo::Reorder(previous))
    }

    pub fn set_master(&mut self, enabled: bool) -> Undo {
        let previous = std::mem::replace(&mut self.master_enabled, enabled);
        Undo::Master(previous)
    }

    pub fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::Remove(index) => {
                self.rules.remove(index);
            }
            Undo::Replace(index, rule) => self.rules[index] = rule,
            Undo::Restore(index, rule) => self.rules.insert(index, rule),
            Undo::Reorder(rules) => self.rules = rules,
            Undo::Master(enabled) => self.master_enabled = enabled,
        }
    }
}
