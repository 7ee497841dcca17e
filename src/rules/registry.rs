//! RuleRegistry: rule descriptors keyed by source `(index, type)`

use super::descriptor::RuleDescriptor;
use crate::config::ConfigError;
use crate::graph::TypeKey;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Read-only set of rules consulted by the engine.
///
/// Several rules may share a source key as long as each writes to a
/// different target.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<TypeKey, Vec<Arc<RuleDescriptor>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of rules, rejecting duplicates.
    pub fn from_rules(rules: impl IntoIterator<Item = RuleDescriptor>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for rule in rules {
            registry.register(rule)?;
        }
        Ok(registry)
    }

    /// Add a rule. Fails if a rule for the same `(source, target)` exists.
    pub fn register(&mut self, rule: RuleDescriptor) -> Result<(), ConfigError> {
        let slot = self.rules.entry(rule.source().clone()).or_default();
        if slot.iter().any(|r| r.target() == rule.target()) {
            return Err(ConfigError::DuplicateRule(rule.name()));
        }
        slot.push(Arc::new(rule));
        Ok(())
    }

    /// Rules whose source is `key`, in registration order.
    pub fn rules_for(&self, key: &TypeKey) -> &[Arc<RuleDescriptor>] {
        self.rules.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Source keys whose rules differ between `self` and `other`.
    pub fn changed_sources(&self, other: &RuleRegistry) -> Vec<TypeKey> {
        let keys: BTreeSet<&TypeKey> = self.rules.keys().chain(other.rules.keys()).collect();
        keys.into_iter()
            .filter(|key| {
                let mine = self.rules_for(key);
                let theirs = other.rules_for(key);
                mine.len() != theirs.len()
                    || mine.iter().zip(theirs).any(|(a, b)| !a.same_definition(b))
            })
            .cloned()
            .collect()
    }

    /// `(source, target)` pairs present in `self` but not in `other`.
    pub fn retired_in(&self, other: &RuleRegistry) -> Vec<(TypeKey, TypeKey)> {
        self.iter()
            .filter(|rule| {
                !other
                    .rules_for(rule.source())
                    .iter()
                    .any(|r| r.target() == rule.target())
            })
            .map(|rule| (rule.source().clone(), rule.target().clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RuleDescriptor>> {
        self.rules.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
