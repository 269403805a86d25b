//! Passive rule store: the ordered rule list, default policy, and version.
//!
//! The store enforces no concurrency of its own. All live mutation goes
//! through [`crate::manager::PolicyManager`], which clones the current
//! store, mutates the clone, and publishes it as a fresh snapshot.

use serde::{Deserialize, Serialize};

use crate::rule::{DefaultPolicy, Rule};
use crate::{Error, Result};

/// An ordered rule list plus default policy and version counter.
///
/// Serializes to the stable snapshot blob
/// `{"version", "defaultPolicy", "rules"[]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStore {
    version: u64,
    #[serde(rename = "defaultPolicy", default)]
    default_policy: DefaultPolicy,
    #[serde(default)]
    rules: Vec<Rule>,
}

impl PolicyStore {
    /// Empty store at version 1.
    #[must_use]
    pub fn new(default_policy: DefaultPolicy) -> Self {
        Self {
            version: 1,
            default_policy,
            rules: Vec::new(),
        }
    }

    /// Store seeded with an ordered rule list, at version 1.
    #[must_use]
    pub fn with_rules(default_policy: DefaultPolicy, rules: Vec<Rule>) -> Self {
        Self {
            version: 1,
            default_policy,
            rules,
        }
    }

    /// The ordered rule list.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rule at `index`, if in range.
    #[must_use]
    pub fn rule(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    /// Number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// The default policy applied when no rule matches.
    #[must_use]
    pub fn default_policy(&self) -> DefaultPolicy {
        self.default_policy
    }

    /// Snapshot version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Append a rule at the end.
    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Insert a rule at `index`; `None` or an index past the end appends.
    pub fn insert_rule(&mut self, index: Option<usize>, rule: Rule) {
        match index {
            Some(i) if i < self.rules.len() => self.rules.insert(i, rule),
            _ => self.rules.push(rule),
        }
    }

    /// Replace the rule at `index`.
    pub fn update_rule(&mut self, index: usize, rule: Rule) -> Result<()> {
        let len = self.rules.len();
        match self.rules.get_mut(index) {
            Some(slot) => {
                *slot = rule;
                Ok(())
            }
            None => Err(Error::OutOfRange { index, len }),
        }
    }

    /// Remove the rule at `index`.
    pub fn delete_rule(&mut self, index: usize) -> Result<()> {
        if index < self.rules.len() {
            self.rules.remove(index);
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index,
                len: self.rules.len(),
            })
        }
    }

    /// Replace the default policy.
    pub fn set_default_policy(&mut self, default_policy: DefaultPolicy) {
        self.default_policy = default_policy;
    }

    /// Validate every rule (non-empty target/subject, non-zero rights).
    pub fn validate(&self) -> Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate(index)?;
        }
        Ok(())
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(DefaultPolicy::Deny)
    }
}
