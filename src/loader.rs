//! Policy-file loader: environment substitution, a restricted line parser
//! for the YAML-like policy grammar, validation, and the matching renderer.
//!
//! The format is line-oriented; indentation determines structure and `#`
//! starts a comment. The parser is deliberately restricted to exactly the
//! policy grammar — it is not a YAML engine and accepts nothing beyond:
//!
//! ```text
//! version: 1
//! defaultPolicy: "deny"
//! rules:
//!   - target: "dc=example,dc=com"
//!     subject: "*"
//!     scope: "subtree"
//!     rights: [read, search]
//!     attributes:
//!       - cn
//!       - mail
//!     deny: false
//! ```
//!
//! Before parsing, `${NAME}` and `${NAME:-default}` occurrences in the raw
//! text are replaced from the process environment.

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::rule::{DefaultPolicy, Rights, Rule, Scope};
use crate::store::PolicyStore;
use crate::{Error, Result};

/// Load, substitute, parse, and validate a policy file.
///
/// A missing file is the distinguished [`Error::FileNotFound`]; other I/O
/// failures surface as [`Error::Io`]. The returned store carries the
/// file's `version` value.
pub fn load_policy_file(path: &Path) -> Result<PolicyStore> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_policy_text(&text)
}

/// Substitute environment variables and parse policy text into a
/// validated store.
pub fn parse_policy_text(text: &str) -> Result<PolicyStore> {
    let expanded = expand_env(text);
    let raw = parse_document(&expanded)?;
    convert(&raw)
}

// ── Environment substitution ──────────────────────────────────────────

fn env_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env substitution pattern is valid")
    })
}

/// Replace `${NAME}` with NAME's value (empty if unset) and
/// `${NAME:-default}` with NAME's value when set and non-empty, else
/// `default`.
#[must_use]
pub fn expand_env(text: &str) -> String {
    env_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            let value = env::var(&caps[1]).unwrap_or_default();
            match caps.get(2) {
                Some(default) if value.is_empty() => default.as_str().to_string(),
                _ => value,
            }
        })
        .into_owned()
}

// ── Line parser ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RawDocument {
    version: Option<String>,
    default_policy: Option<String>,
    rules: Vec<RawRule>,
}

#[derive(Debug, Default)]
struct RawRule {
    target: Option<String>,
    subject: Option<String>,
    scope: Option<String>,
    rights: Vec<String>,
    attributes: Vec<String>,
    deny: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ListKey {
    Rights,
    Attributes,
}

fn parse_document(text: &str) -> Result<RawDocument> {
    let mut doc = RawDocument::default();
    let mut in_rules = false;
    // Indent of the `- ` lines that begin rules; fixed by the first one.
    let mut rule_indent: Option<usize> = None;
    // Open block list (`rights:` / `attributes:` with no inline value).
    let mut open_list: Option<ListKey> = None;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = lineno + 1;
        let stripped = strip_comment(raw_line);
        if stripped.trim().is_empty() {
            continue;
        }

        let indent = stripped.len() - stripped.trim_start().len();
        let content = stripped.trim();

        if let Some(item) = content.strip_prefix('-').map(str::trim_start) {
            // Sequence item: a new rule at the rule indent, or a block-list
            // value deeper inside the current rule.
            if !in_rules {
                return Err(syntax(line, "sequence item outside of rules"));
            }
            let rindent = *rule_indent.get_or_insert(indent);
            if indent == rindent {
                open_list = None;
                let mut rule = RawRule::default();
                if !item.is_empty() {
                    let (key, value) = split_key_value(item, line)?;
                    open_list = set_rule_field(&mut rule, key, value, line)?;
                }
                doc.rules.push(rule);
            } else if indent > rindent {
                let Some(list) = open_list else {
                    return Err(syntax(line, "list item without an open list"));
                };
                let rule = doc
                    .rules
                    .last_mut()
                    .ok_or_else(|| syntax(line, "list item outside of a rule"))?;
                let value = unquote(item).to_string();
                match list {
                    ListKey::Rights => rule.rights.push(value),
                    ListKey::Attributes => rule.attributes.push(value),
                }
            } else {
                return Err(syntax(line, "sequence item dedented past its rule"));
            }
            continue;
        }

        let (key, value) = split_key_value(content, line)?;

        if indent == 0 {
            in_rules = false;
            open_list = None;
            match key {
                "version" => doc.version = Some(unquote(value).to_string()),
                "defaultPolicy" => doc.default_policy = Some(unquote(value).to_string()),
                "rules" => {
                    match value {
                        "" | "[]" => {}
                        _ => return Err(syntax(line, "rules must be a sequence")),
                    }
                    in_rules = true;
                    rule_indent = None;
                }
                other => {
                    return Err(syntax(line, format!("unknown key '{other}'")));
                }
            }
            continue;
        }

        // Indented key line: a field of the current rule.
        if !in_rules {
            return Err(syntax(line, "indented key outside of rules"));
        }
        let rule = doc
            .rules
            .last_mut()
            .ok_or_else(|| syntax(line, "rule field before any rule"))?;
        open_list = set_rule_field(rule, key, value, line)?;
    }

    Ok(doc)
}

/// Assign one `key: value` pair into a rule. Returns the list key when the
/// value opens a block list.
fn set_rule_field(
    rule: &mut RawRule,
    key: &str,
    value: &str,
    line: usize,
) -> Result<Option<ListKey>> {
    match key {
        "target" => rule.target = Some(unquote(value).to_string()),
        "subject" => rule.subject = Some(unquote(value).to_string()),
        "scope" => rule.scope = Some(unquote(value).to_string()),
        "rights" => {
            if value.is_empty() {
                return Ok(Some(ListKey::Rights));
            }
            rule.rights = parse_inline_list(value, line)?;
        }
        "attributes" => {
            if value.is_empty() {
                return Ok(Some(ListKey::Attributes));
            }
            rule.attributes = parse_inline_list(value, line)?;
        }
        "deny" => rule.deny = Some(parse_bool(unquote(value), line)?),
        other => {
            return Err(syntax(line, format!("unknown rule key '{other}'")));
        }
    }
    Ok(None)
}

/// Split `key: value`; the value may be empty.
fn split_key_value(content: &str, line: usize) -> Result<(&str, &str)> {
    let Some((key, value)) = content.split_once(':') else {
        return Err(syntax(line, "expected 'key: value'"));
    };
    Ok((key.trim(), value.trim()))
}

/// `[a, b, c]` with optional quoting per element. `[]` yields an empty
/// list.
fn parse_inline_list(value: &str, line: usize) -> Result<Vec<String>> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| syntax(line, "expected an inline [a, b, c] list"))?;
    Ok(inner
        .split(',')
        .map(|item| unquote(item.trim()).to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

fn parse_bool(value: &str, line: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(true),
        "false" | "no" => Ok(false),
        other => Err(syntax(line, format!("expected a boolean, got '{other}'"))),
    }
}

/// Truncate at the first `#` that is not inside a quoted string.
fn strip_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn syntax(line: usize, message: impl Into<String>) -> Error {
    Error::InvalidFormat {
        line,
        message: message.into(),
    }
}

// ── Conversion & validation ───────────────────────────────────────────

fn convert(raw: &RawDocument) -> Result<PolicyStore> {
    let version = match &raw.version {
        None => return Err(Error::InvalidVersion("missing".to_string())),
        Some(text) => match text.parse::<u64>() {
            Ok(v) if v >= 1 => v,
            _ => return Err(Error::InvalidVersion(text.clone())),
        },
    };

    // Empty means "no override" and falls back to deny.
    let default_policy = match raw.default_policy.as_deref() {
        None | Some("") => DefaultPolicy::Deny,
        Some(text) => DefaultPolicy::parse(text)?,
    };

    let mut rules = Vec::with_capacity(raw.rules.len());
    for (index, raw_rule) in raw.rules.iter().enumerate() {
        let rule = Rule {
            target: raw_rule.target.clone().unwrap_or_default(),
            subject: raw_rule.subject.clone().unwrap_or_default(),
            scope: Scope::parse(raw_rule.scope.as_deref().unwrap_or(""))?,
            rights: Rights::from_names(&raw_rule.rights)?,
            attributes: raw_rule.attributes.clone(),
            deny: raw_rule.deny.unwrap_or(false),
        };
        rule.validate(index)?;
        rules.push(rule);
    }

    let mut store = PolicyStore::with_rules(default_policy, rules);
    store.set_version(version);
    Ok(store)
}

// ── Renderer ──────────────────────────────────────────────────────────

/// Render a store back into the policy-file grammar, so a file round-trips
/// through load → save → load.
#[must_use]
pub fn render_policy_file(store: &PolicyStore) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    out.push_str("# Access control policy\n");
    let _ = writeln!(out, "version: {}", store.version());
    let _ = writeln!(out, "defaultPolicy: \"{}\"", store.default_policy());

    if store.rules().is_empty() {
        out.push_str("rules: []\n");
        return out;
    }

    out.push_str("rules:\n");
    for rule in store.rules() {
        let _ = writeln!(out, "  - target: \"{}\"", rule.target);
        let _ = writeln!(out, "    subject: \"{}\"", rule.subject);
        let _ = writeln!(out, "    scope: \"{}\"", rule.scope);
        let _ = writeln!(out, "    rights: [{}]", rule.rights.names().join(", "));
        if !rule.attributes.is_empty() {
            let _ = writeln!(out, "    attributes: [{}]", rule.attributes.join(", "));
        }
        let _ = writeln!(out, "    deny: {}", rule.deny);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::rule::Right;

    // ── Full-document parsing ─────────────────────────────────────────

    #[test]
    fn parses_complete_document() {
        let text = r#"
# Cluster policy
version: 2
defaultPolicy: "deny"
rules:
  - target: "dc=example,dc=com"
    subject: "cn=admin,dc=example,dc=com"
    scope: "subtree"
    rights: [all]
  - target: "*"
    subject: "self"
    scope: "sub"
    rights: [read, write]
    attributes: [cn, mail]
    deny: false
"#;
        let store = parse_policy_text(text).unwrap();
        assert_eq!(store.version(), 2);
        assert_eq!(store.default_policy(), DefaultPolicy::Deny);
        assert_eq!(store.rule_count(), 2);

        let first = store.rule(0).unwrap();
        assert_eq!(first.target, "dc=example,dc=com");
        assert!(first.rights.is_all());
        assert_eq!(first.scope, Scope::Subtree);

        let second = store.rule(1).unwrap();
        assert_eq!(second.rights, Right::Read | Right::Write);
        assert_eq!(second.attributes, vec!["cn", "mail"]);
        assert!(!second.deny);
    }

    #[test]
    fn parses_block_lists() {
        let text = "
version: 1
rules:
  - target: \"*\"
    subject: \"*\"
    rights:
      - read
      - search
    attributes:
      - cn
      - \"mail\"
";
        let store = parse_policy_text(text).unwrap();
        let rule = store.rule(0).unwrap();
        assert_eq!(rule.rights, Right::Read | Right::Search);
        assert_eq!(rule.attributes, vec!["cn", "mail"]);
    }

    #[test]
    fn first_field_may_ride_the_dash_line() {
        let text = "version: 1\nrules:\n  - target: \"dc=a\"\n    subject: \"*\"\n    rights: [all]\n";
        let store = parse_policy_text(text).unwrap();
        assert_eq!(store.rule(0).unwrap().target, "dc=a");
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = "
# header comment
version: 1   # trailing comment

defaultPolicy: \"allow\"
rules: []
";
        let store = parse_policy_text(text).unwrap();
        assert_eq!(store.version(), 1);
        assert_eq!(store.default_policy(), DefaultPolicy::Allow);
        assert_eq!(store.rule_count(), 0);
    }

    #[test]
    fn hash_inside_quotes_is_not_a_comment() {
        let text = "version: 1\nrules:\n  - target: \"ou=a#b,dc=c\"\n    subject: \"*\"\n    rights: [all]\n";
        let store = parse_policy_text(text).unwrap();
        assert_eq!(store.rule(0).unwrap().target, "ou=a#b,dc=c");
    }

    #[test]
    fn missing_rules_key_means_no_rules() {
        let store = parse_policy_text("version: 1\ndefaultPolicy: \"deny\"\n").unwrap();
        assert_eq!(store.rule_count(), 0);
    }

    #[test]
    fn boolean_aliases() {
        for (text, expected) in [("yes", true), ("TRUE", true), ("no", false), ("False", false)] {
            let doc = format!(
                "version: 1\nrules:\n  - target: \"*\"\n    subject: \"*\"\n    rights: [all]\n    deny: {text}\n"
            );
            let store = parse_policy_text(&doc).unwrap();
            assert_eq!(store.rule(0).unwrap().deny, expected, "deny: {text}");
        }
    }

    // ── Syntax errors ─────────────────────────────────────────────────

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = parse_policy_text("version: 1\nbanner: \"hi\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { line: 2, .. }));
    }

    #[test]
    fn unknown_rule_key_is_rejected() {
        let text = "version: 1\nrules:\n  - target: \"*\"\n    colour: \"red\"\n";
        let err = parse_policy_text(text).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { line: 4, .. }));
    }

    #[test]
    fn sequence_item_outside_rules_is_rejected() {
        let err = parse_policy_text("- target: \"*\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { line: 1, .. }));
    }

    #[test]
    fn list_item_without_open_list_is_rejected() {
        let text = "version: 1\nrules:\n  - target: \"*\"\n      - read\n";
        let err = parse_policy_text(text).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { line: 4, .. }));
    }

    #[test]
    fn malformed_bool_is_rejected() {
        let text = "version: 1\nrules:\n  - target: \"*\"\n    subject: \"*\"\n    rights: [all]\n    deny: maybe\n";
        assert!(parse_policy_text(text).is_err());
    }

    // ── Validation errors ─────────────────────────────────────────────

    #[test]
    fn missing_version_is_rejected() {
        let err = parse_policy_text("defaultPolicy: \"deny\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(ref s) if s == "missing"));
    }

    #[test]
    fn zero_version_is_rejected() {
        let err = parse_policy_text("version: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(ref s) if s == "0"));
    }

    #[test]
    fn empty_default_policy_normalises_to_deny() {
        let store = parse_policy_text("version: 1\ndefaultPolicy: \"\"\n").unwrap();
        assert_eq!(store.default_policy(), DefaultPolicy::Deny);
    }

    #[test]
    fn unknown_default_policy_is_rejected() {
        let err = parse_policy_text("version: 1\ndefaultPolicy: \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidPolicy(ref s) if s == "sometimes"));
    }

    #[test]
    fn unknown_right_carries_offending_text() {
        let text = "version: 1\nrules:\n  - target: \"*\"\n    subject: \"*\"\n    rights: [fly]\n";
        let err = parse_policy_text(text).unwrap_err();
        assert!(matches!(err, Error::InvalidRight(ref s) if s == "fly"));
    }

    #[test]
    fn unknown_scope_carries_offending_text() {
        let text = "version: 1\nrules:\n  - target: \"*\"\n    subject: \"*\"\n    scope: \"galaxy\"\n    rights: [all]\n";
        let err = parse_policy_text(text).unwrap_err();
        assert!(matches!(err, Error::InvalidScope(ref s) if s == "galaxy"));
    }

    #[test]
    fn rule_missing_rights_reports_its_index() {
        let text = "version: 1\nrules:\n  - target: \"*\"\n    subject: \"*\"\n    rights: [all]\n  - target: \"dc=a\"\n    subject: \"*\"\n";
        let err = parse_policy_text(text).unwrap_err();
        assert!(matches!(err, Error::MissingRights(1)));
    }

    #[test]
    fn rule_missing_target_reports_its_index() {
        let text = "version: 1\nrules:\n  - subject: \"*\"\n    rights: [all]\n";
        let err = parse_policy_text(text).unwrap_err();
        assert!(matches!(err, Error::MissingTarget(0)));
    }

    // ── Environment substitution ──────────────────────────────────────

    #[test]
    fn unset_variable_expands_to_empty() {
        assert_eq!(expand_env("x${LDAP_ACL_TEST_SURELY_UNSET}y"), "xy");
    }

    #[test]
    fn unset_variable_with_default_uses_default() {
        assert_eq!(
            expand_env("${LDAP_ACL_TEST_SURELY_UNSET:-cn=admin,dc=example,dc=com}"),
            "cn=admin,dc=example,dc=com"
        );
    }

    #[test]
    fn set_variable_wins_over_default() {
        // PATH is set and non-empty in any test environment.
        let expanded = expand_env("${PATH:-fallback}");
        assert_eq!(expanded, env::var("PATH").unwrap());
        assert_ne!(expanded, "fallback");
    }

    #[test]
    fn substitution_happens_before_parsing() {
        let text = "version: 1\nrules:\n  - target: \"${LDAP_ACL_TEST_SURELY_UNSET:-dc=fallback}\"\n    subject: \"*\"\n    rights: [all]\n";
        let store = parse_policy_text(text).unwrap();
        assert_eq!(store.rule(0).unwrap().target, "dc=fallback");
    }

    #[test]
    fn text_without_placeholders_is_untouched() {
        let text = "version: 1\n# no $ here\n";
        assert_eq!(expand_env(text), text);
    }

    // ── Renderer round-trip ───────────────────────────────────────────

    #[test]
    fn rendered_file_round_trips() {
        let text = r#"
version: 3
defaultPolicy: "allow"
rules:
  - target: "ou=sensitive,dc=example,dc=com"
    subject: "anonymous"
    scope: "subtree"
    rights: [all]
    deny: true
  - target: "*"
    subject: "*"
    scope: "one"
    rights: [read]
    attributes: [cn, mail]
"#;
        let store = parse_policy_text(text).unwrap();
        let rendered = render_policy_file(&store);
        let reparsed = parse_policy_text(&rendered).unwrap();
        assert_eq!(reparsed, store);
    }

    #[test]
    fn empty_store_renders_and_reparses() {
        let store = PolicyStore::new(DefaultPolicy::Deny);
        let reparsed = parse_policy_text(&render_policy_file(&store)).unwrap();
        assert_eq!(reparsed, store);
    }

    // ── File loading ──────────────────────────────────────────────────

    #[test]
    fn missing_file_is_distinguished() {
        let err = load_policy_file(Path::new("/nonexistent/acl.yaml")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acl.yaml");
        std::fs::write(&path, "version: 1\ndefaultPolicy: \"allow\"\nrules: []\n").unwrap();
        let store = load_policy_file(&path).unwrap();
        assert_eq!(store.default_policy(), DefaultPolicy::Allow);
    }
}
