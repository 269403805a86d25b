//! First-match access evaluator over an immutable policy snapshot.
//!
//! The evaluator never fails: every query resolves to a boolean. Malformed
//! rules are rejected at load time and never reach it. Rule order matters:
//! evaluation halts at the first rule whose target, subject, and rights
//! match, and that rule's deny flag decides the outcome, so a deny placed
//! before an allow overrides it.

use std::sync::Arc;

use crate::context::{AccessContext, Entry};
use crate::matcher;
use crate::rule::Right;
use crate::store::PolicyStore;

/// Immutable decision engine over one policy snapshot.
///
/// Cheap to clone; readers hold it for the duration of one decision while
/// the manager may already be publishing a successor snapshot.
#[derive(Debug, Clone)]
pub struct AccessEvaluator {
    store: Arc<PolicyStore>,
}

impl AccessEvaluator {
    /// Evaluator over `store`.
    #[must_use]
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// The snapshot this evaluator decides against.
    #[must_use]
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Whether `ctx.operation` on `ctx.target_dn` is permitted.
    ///
    /// Walks the rules in order; the first rule matching target, subject,
    /// and operation decides. With no matching rule the default policy
    /// decides.
    #[must_use]
    pub fn check_access(&self, ctx: &AccessContext) -> bool {
        for rule in self.store.rules() {
            if matcher::matches(rule, ctx) {
                return !rule.deny;
            }
        }
        self.store.default_policy().is_allow()
    }

    /// As [`check_access`](Self::check_access), but the matching rule must
    /// also admit `attribute`.
    #[must_use]
    pub fn check_attribute_access(&self, ctx: &AccessContext, attribute: &str) -> bool {
        for rule in self.store.rules() {
            if matcher::matches(rule, ctx) && matcher::matches_attribute(rule, attribute) {
                return !rule.deny;
            }
        }
        self.store.default_policy().is_allow()
    }

    /// Project `entry` down to the attributes readable under `ctx`.
    ///
    /// The check runs with operation [`Right::Read`] regardless of
    /// `ctx.operation`; attribute order and the DN are preserved.
    /// `None` maps to `None`.
    #[must_use]
    pub fn filter_attributes(&self, ctx: &AccessContext, entry: Option<&Entry>) -> Option<Entry> {
        let entry = entry?;
        let read_ctx = ctx.with_operation(Right::Read);
        let mut filtered = Entry::new(entry.dn.clone());
        for attr in entry.attributes() {
            if self.check_attribute_access(&read_ctx, &attr.name) {
                filtered.set_attribute(attr.name.clone(), attr.values.clone());
            }
        }
        Some(filtered)
    }

    /// Keep only the attribute names readable under `ctx`, preserving
    /// order.
    #[must_use]
    pub fn filter_attribute_list(&self, ctx: &AccessContext, attributes: &[String]) -> Vec<String> {
        let read_ctx = ctx.with_operation(Right::Read);
        attributes
            .iter()
            .filter(|name| self.check_attribute_access(&read_ctx, name))
            .cloned()
            .collect()
    }

    /// Whether `bind_dn` may read `target_dn`.
    #[must_use]
    pub fn can_read(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.check_access(&AccessContext::new(bind_dn, target_dn, Right::Read))
    }

    /// Whether `bind_dn` may modify `target_dn`.
    #[must_use]
    pub fn can_write(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.check_access(&AccessContext::new(bind_dn, target_dn, Right::Write))
    }

    /// Whether `bind_dn` may add entries under `target_dn`.
    #[must_use]
    pub fn can_add(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.check_access(&AccessContext::new(bind_dn, target_dn, Right::Add))
    }

    /// Whether `bind_dn` may delete `target_dn`.
    #[must_use]
    pub fn can_delete(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.check_access(&AccessContext::new(bind_dn, target_dn, Right::Delete))
    }

    /// Whether `bind_dn` may search under `target_dn`.
    #[must_use]
    pub fn can_search(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.check_access(&AccessContext::new(bind_dn, target_dn, Right::Search))
    }

    /// Whether `bind_dn` may compare attribute values on `target_dn`.
    #[must_use]
    pub fn can_compare(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.check_access(&AccessContext::new(bind_dn, target_dn, Right::Compare))
    }
}
