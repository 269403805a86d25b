//! Rule matcher: decides whether one rule applies to an access context.
//!
//! DNs are compared byte-wise after ASCII lowercasing. This is a deliberate
//! simplification: the engine does not parse RFC 4514 DN syntax, so rule
//! authors must write DNs in canonical comma-separated form with no escape
//! sequences. Non-ASCII bytes are compared raw.

use crate::context::AccessContext;
use crate::rule::{Rule, Scope};

/// Reserved subject token matching an empty bind DN.
pub const SUBJECT_ANONYMOUS: &str = "anonymous";
/// Reserved subject token matching any non-empty bind DN.
pub const SUBJECT_AUTHENTICATED: &str = "authenticated";
/// Reserved subject token matching a bind DN equal to the target DN.
pub const SUBJECT_SELF: &str = "self";
/// Wildcard matching any subject, target, or attribute name.
pub const WILDCARD: &str = "*";

/// ASCII-lowercase fold used for every DN comparison in the engine.
///
/// Only ASCII letters fold; other bytes compare raw. A future version
/// should substitute a proper DN canonicaliser here.
#[must_use]
pub fn fold_dn(dn: &str) -> String {
    dn.to_ascii_lowercase()
}

/// Whether `rule` covers the operation and entry in `ctx` (target, subject,
/// and rights; attribute granularity is checked separately by
/// [`matches_attribute`]).
#[must_use]
pub fn matches(rule: &Rule, ctx: &AccessContext) -> bool {
    matches_target(rule, &ctx.target_dn)
        && matches_subject(rule, &ctx.bind_dn, &ctx.target_dn)
        && rule.rights.contains(ctx.operation)
}

/// Whether the rule's target and scope admit `target_dn`.
#[must_use]
pub fn matches_target(rule: &Rule, target_dn: &str) -> bool {
    if rule.target == WILDCARD {
        return true;
    }

    let candidate = fold_dn(target_dn);
    let target = fold_dn(&rule.target);

    match rule.scope {
        Scope::Base => candidate == target,
        Scope::One => is_one_level_child(&candidate, &target),
        Scope::Subtree => {
            // An empty target owns the whole tree under Subtree.
            target.is_empty()
                || candidate == target
                || is_descendant(&candidate, &target)
        }
    }
}

/// Whether the rule's subject admits the requester identity.
#[must_use]
pub fn matches_subject(rule: &Rule, bind_dn: &str, target_dn: &str) -> bool {
    let subject = fold_dn(&rule.subject);
    match subject.as_str() {
        SUBJECT_ANONYMOUS => bind_dn.is_empty(),
        SUBJECT_AUTHENTICATED => !bind_dn.is_empty(),
        SUBJECT_SELF => !bind_dn.is_empty() && fold_dn(bind_dn) == fold_dn(target_dn),
        WILDCARD => true,
        _ => subject == fold_dn(bind_dn),
    }
}

/// Whether the rule's attribute set admits `attribute`.
///
/// An empty set means any attribute. Names are case-sensitive literals;
/// a `*` entry matches any name.
#[must_use]
pub fn matches_attribute(rule: &Rule, attribute: &str) -> bool {
    rule.attributes.is_empty()
        || rule
            .attributes
            .iter()
            .any(|a| a == WILDCARD || a == attribute)
}

/// `candidate` ends with `,target` (strict descendant).
fn is_descendant(candidate: &str, target: &str) -> bool {
    candidate
        .strip_suffix(target)
        .is_some_and(|prefix| prefix.ends_with(','))
}

/// `candidate` extends `target` by exactly one RDN: it ends with
/// `,target` and the remaining prefix is non-empty and comma-free.
fn is_one_level_child(candidate: &str, target: &str) -> bool {
    let Some(prefix) = candidate
        .strip_suffix(target)
        .and_then(|p| p.strip_suffix(','))
    else {
        return false;
    };
    !prefix.is_empty() && !prefix.contains(',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Right, Rights};

    fn rule(target: &str, subject: &str, scope: Scope) -> Rule {
        Rule {
            target: target.to_string(),
            subject: subject.to_string(),
            scope,
            rights: Rights::ALL,
            attributes: Vec::new(),
            deny: false,
        }
    }

    // ── Target: wildcard ──────────────────────────────────────────────

    #[test]
    fn wildcard_target_matches_any_dn() {
        let r = rule("*", "*", Scope::Base);
        assert!(matches_target(&r, "dc=example,dc=com"));
        assert!(matches_target(&r, ""));
    }

    // ── Target: base scope ────────────────────────────────────────────

    #[test]
    fn base_matches_exact_dn_only() {
        let r = rule("dc=example,dc=com", "*", Scope::Base);
        assert!(matches_target(&r, "dc=example,dc=com"));
        assert!(!matches_target(&r, "ou=users,dc=example,dc=com"));
        assert!(!matches_target(&r, "dc=com"));
    }

    #[test]
    fn base_folds_ascii_case() {
        let r = rule("DC=Example,DC=Com", "*", Scope::Base);
        assert!(matches_target(&r, "dc=example,dc=com"));
    }

    // ── Target: one-level scope ───────────────────────────────────────

    #[test]
    fn one_matches_immediate_child() {
        let r = rule("dc=example,dc=com", "*", Scope::One);
        assert!(matches_target(&r, "ou=users,dc=example,dc=com"));
    }

    #[test]
    fn one_rejects_target_itself() {
        let r = rule("dc=example,dc=com", "*", Scope::One);
        assert!(!matches_target(&r, "dc=example,dc=com"));
    }

    #[test]
    fn one_rejects_grandchild() {
        let r = rule("dc=example,dc=com", "*", Scope::One);
        assert!(!matches_target(&r, "uid=alice,ou=users,dc=example,dc=com"));
    }

    #[test]
    fn one_rejects_suffix_without_separator() {
        // "xdc=example,dc=com" is not a child, just a string suffix.
        let r = rule("dc=example,dc=com", "*", Scope::One);
        assert!(!matches_target(&r, "xdc=example,dc=com"));
    }

    #[test]
    fn one_with_empty_target_matches_nothing() {
        let r = rule("", "*", Scope::One);
        assert!(!matches_target(&r, "dc=com"));
        assert!(!matches_target(&r, ""));
    }

    // ── Target: subtree scope ─────────────────────────────────────────

    #[test]
    fn subtree_matches_target_and_descendants() {
        let r = rule("dc=example,dc=com", "*", Scope::Subtree);
        assert!(matches_target(&r, "dc=example,dc=com"));
        assert!(matches_target(&r, "ou=users,dc=example,dc=com"));
        assert!(matches_target(&r, "uid=alice,ou=users,dc=example,dc=com"));
    }

    #[test]
    fn subtree_rejects_sibling_tree() {
        let r = rule("dc=example,dc=com", "*", Scope::Subtree);
        assert!(!matches_target(&r, "dc=other,dc=com"));
        assert!(!matches_target(&r, "xdc=example,dc=com"));
    }

    #[test]
    fn subtree_with_empty_target_matches_everything() {
        let r = rule("", "*", Scope::Subtree);
        assert!(matches_target(&r, "dc=anything"));
        assert!(matches_target(&r, ""));
    }

    // ── Scope containment ─────────────────────────────────────────────

    #[test]
    fn base_match_implies_subtree_match() {
        let targets = ["dc=example,dc=com", "ou=a,dc=b"];
        let candidates = ["dc=example,dc=com", "ou=a,dc=b", "uid=x,ou=a,dc=b"];
        for t in targets {
            for c in candidates {
                let base = matches_target(&rule(t, "*", Scope::Base), c);
                let one = matches_target(&rule(t, "*", Scope::One), c);
                let sub = matches_target(&rule(t, "*", Scope::Subtree), c);
                if base {
                    assert!(sub, "base matched but subtree did not: {t} vs {c}");
                }
                if one {
                    assert!(sub, "one matched but subtree did not: {t} vs {c}");
                }
            }
        }
    }

    // ── Subject tokens ────────────────────────────────────────────────

    #[test]
    fn anonymous_matches_empty_bind() {
        let r = rule("*", "anonymous", Scope::Subtree);
        assert!(matches_subject(&r, "", "dc=com"));
        assert!(!matches_subject(&r, "cn=admin", "dc=com"));
    }

    #[test]
    fn authenticated_matches_non_empty_bind() {
        let r = rule("*", "authenticated", Scope::Subtree);
        assert!(matches_subject(&r, "cn=admin", "dc=com"));
        assert!(!matches_subject(&r, "", "dc=com"));
    }

    #[test]
    fn self_matches_own_entry_only() {
        let r = rule("*", "self", Scope::Subtree);
        let alice = "uid=alice,ou=users,dc=example,dc=com";
        let bob = "uid=bob,ou=users,dc=example,dc=com";
        assert!(matches_subject(&r, alice, alice));
        assert!(!matches_subject(&r, alice, bob));
    }

    #[test]
    fn self_never_matches_anonymous() {
        // Anonymous bind with empty target DN must not count as "self".
        let r = rule("*", "self", Scope::Subtree);
        assert!(!matches_subject(&r, "", ""));
    }

    #[test]
    fn self_token_folds_case() {
        let r = rule("*", "SELF", Scope::Subtree);
        assert!(matches_subject(&r, "UID=Alice,DC=Com", "uid=alice,dc=com"));
    }

    #[test]
    fn wildcard_subject_matches_anyone() {
        let r = rule("*", "*", Scope::Subtree);
        assert!(matches_subject(&r, "", "dc=com"));
        assert!(matches_subject(&r, "cn=x", "dc=com"));
    }

    #[test]
    fn literal_dn_subject_is_case_insensitive() {
        let r = rule("*", "CN=Admin,DC=Example,DC=Com", Scope::Subtree);
        assert!(matches_subject(&r, "cn=admin,dc=example,dc=com", "dc=com"));
        assert!(!matches_subject(&r, "cn=other,dc=example,dc=com", "dc=com"));
    }

    // ── Attribute sets ────────────────────────────────────────────────

    #[test]
    fn empty_attribute_set_matches_any() {
        let r = rule("*", "*", Scope::Subtree);
        assert!(matches_attribute(&r, "cn"));
        assert!(matches_attribute(&r, "userPassword"));
    }

    #[test]
    fn listed_attributes_are_case_sensitive_literals() {
        let mut r = rule("*", "*", Scope::Subtree);
        r.attributes = vec!["cn".to_string(), "mail".to_string()];
        assert!(matches_attribute(&r, "cn"));
        assert!(matches_attribute(&r, "mail"));
        assert!(!matches_attribute(&r, "CN"));
        assert!(!matches_attribute(&r, "userPassword"));
    }

    #[test]
    fn star_inside_attribute_set_matches_any() {
        let mut r = rule("*", "*", Scope::Subtree);
        r.attributes = vec!["cn".to_string(), "*".to_string()];
        assert!(matches_attribute(&r, "userPassword"));
    }

    // ── Full match (target + subject + rights) ────────────────────────

    #[test]
    fn matches_requires_rights_membership() {
        let mut r = rule("*", "*", Scope::Subtree);
        r.rights = Right::Read.into();
        let read = AccessContext::new("", "dc=com", Right::Read);
        let write = AccessContext::new("", "dc=com", Right::Write);
        assert!(matches(&r, &read));
        assert!(!matches(&r, &write));
    }

    #[test]
    fn matcher_is_case_invariant_end_to_end() {
        // Decisions for DN pairs differing only in ASCII case are identical.
        let r = rule("OU=Users,DC=Example,DC=Com", "CN=Admin,DC=Com", Scope::Subtree);
        let lower = AccessContext::new("cn=admin,dc=com", "uid=x,ou=users,dc=example,dc=com", Right::Read);
        let upper = AccessContext::new("CN=ADMIN,DC=COM", "UID=X,OU=USERS,DC=EXAMPLE,DC=COM", Right::Read);
        assert_eq!(matches(&r, &lower), matches(&r, &upper));
        assert!(matches(&r, &lower));
    }
}
