//! Policy rule model: rights, scopes, default policy, and the rule itself.
//!
//! A [`Rule`] is immutable once published into a snapshot. Rules are plain
//! data; all matching logic lives in [`crate::matcher`] and all ordering
//! semantics in [`crate::evaluator`].

use std::fmt;

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// A single directory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Right {
    /// Read entry attributes
    Read,
    /// Modify existing entries
    Write,
    /// Add new entries
    Add,
    /// Delete entries
    Delete,
    /// Search under a base DN
    Search,
    /// Compare an attribute value
    Compare,
}

impl Right {
    const ATOMS: [Right; 6] = [
        Right::Read,
        Right::Write,
        Right::Add,
        Right::Delete,
        Right::Search,
        Right::Compare,
    ];

    fn bit(self) -> u8 {
        match self {
            Right::Read => 1 << 0,
            Right::Write => 1 << 1,
            Right::Add => 1 << 2,
            Right::Delete => 1 << 3,
            Right::Search => 1 << 4,
            Right::Compare => 1 << 5,
        }
    }

    /// Canonical lowercase name of the right atom.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Right::Read => "read",
            Right::Write => "write",
            Right::Add => "add",
            Right::Delete => "delete",
            Right::Search => "search",
            Right::Compare => "compare",
        }
    }
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`Right`] atoms.
///
/// `all` denotes the full set. Membership is subset semantics: a rule's
/// right set admits an operation iff the operation is contained in it.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rights(u8);

impl Rights {
    /// The empty set. Rejected by validation; exists as an intermediate
    /// value while parsing and for `Default`.
    pub const NONE: Rights = Rights(0);

    /// The full set of all six operations.
    pub const ALL: Rights = Rights(0b0011_1111);

    /// Whether `right` is a member of this set.
    #[must_use]
    pub fn contains(self, right: Right) -> bool {
        self.0 & right.bit() != 0
    }

    /// Whether every member of `other` is a member of this set.
    #[must_use]
    pub fn has(self, other: Rights) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the set covers all six operations.
    #[must_use]
    pub fn is_all(self) -> bool {
        self == Rights::ALL
    }

    /// Iterate the atoms in this set in canonical order.
    pub fn atoms(self) -> impl Iterator<Item = Right> {
        Right::ATOMS.into_iter().filter(move |r| self.contains(*r))
    }

    /// Canonical names for serialization: `["all"]` for the full set,
    /// otherwise the member atoms in canonical order.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        if self.is_all() {
            vec!["all"]
        } else {
            self.atoms().map(Right::name).collect()
        }
    }

    /// Parse one right atom (case-insensitive). `all` yields the full set.
    pub fn parse_atom(atom: &str) -> Result<Rights> {
        match atom.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Right::Read.into()),
            "write" => Ok(Right::Write.into()),
            "add" => Ok(Right::Add.into()),
            "delete" => Ok(Right::Delete.into()),
            "search" => Ok(Right::Search.into()),
            "compare" => Ok(Right::Compare.into()),
            "all" => Ok(Rights::ALL),
            _ => Err(Error::InvalidRight(atom.trim().to_string())),
        }
    }

    /// Parse a list of atoms into their union.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Rights> {
        let mut rights = Rights::NONE;
        for name in names {
            rights = rights | Rights::parse_atom(name.as_ref())?;
        }
        Ok(rights)
    }
}

impl From<Right> for Rights {
    fn from(right: Right) -> Self {
        Rights(right.bit())
    }
}

impl std::ops::BitOr for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Rights) -> Rights {
        Rights(self.0 | rhs.0)
    }
}

impl std::ops::BitOr<Right> for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Right) -> Rights {
        Rights(self.0 | rhs.bit())
    }
}

impl std::ops::BitOr for Right {
    type Output = Rights;

    fn bitor(self, rhs: Right) -> Rights {
        Rights(self.bit() | rhs.bit())
    }
}

impl fmt::Debug for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rights[{}]", self.names().join(", "))
    }
}

impl Serialize for Rights {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let names = self.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Rights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Rights::from_names(&names).map_err(D::Error::custom)
    }
}

/// Extent of the DN match for a rule's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Scope {
    /// The target DN only
    Base,
    /// Immediate children of the target DN only
    One,
    /// The target DN and all descendants
    #[default]
    Subtree,
}

impl Scope {
    /// Parse a scope atom (case-insensitive). `onelevel` and `sub` are
    /// accepted aliases; the empty string yields the default `Subtree`.
    pub fn parse(value: &str) -> Result<Scope> {
        match value.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Scope::Base),
            "one" | "onelevel" => Ok(Scope::One),
            "sub" | "subtree" | "" => Ok(Scope::Subtree),
            _ => Err(Error::InvalidScope(value.trim().to_string())),
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Base => "base",
            Scope::One => "one",
            Scope::Subtree => "subtree",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Scope::parse(&value).map_err(D::Error::custom)
    }
}

/// What the evaluator answers when no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum DefaultPolicy {
    /// Permit unmatched operations
    Allow,
    /// Refuse unmatched operations
    #[default]
    Deny,
}

impl DefaultPolicy {
    /// Parse `allow` or `deny` (case-insensitive). Anything else is
    /// rejected; the loader handles the empty-string "no override" case
    /// separately.
    pub fn parse(value: &str) -> Result<DefaultPolicy> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(DefaultPolicy::Allow),
            "deny" => Ok(DefaultPolicy::Deny),
            _ => Err(Error::InvalidPolicy(value.trim().to_string())),
        }
    }

    /// Whether unmatched operations are permitted.
    #[must_use]
    pub fn is_allow(self) -> bool {
        matches!(self, DefaultPolicy::Allow)
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultPolicy::Allow => "allow",
            DefaultPolicy::Deny => "deny",
        }
    }
}

impl fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DefaultPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DefaultPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        DefaultPolicy::parse(&value).map_err(D::Error::custom)
    }
}

/// A single allow/deny policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// DN the rule applies to, or `*` for any DN.
    pub target: String,
    /// Requester the rule applies to: `anonymous`, `authenticated`,
    /// `self`, `*`, or a literal DN (case-insensitive).
    pub subject: String,
    /// DN match extent for the target.
    #[serde(default)]
    pub scope: Scope,
    /// Operations the rule covers. Must be non-empty.
    pub rights: Rights,
    /// Attribute names the rule covers. Empty means any attribute; a
    /// literal `*` inside the set also means any.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// When true a match denies access, otherwise it allows.
    #[serde(default)]
    pub deny: bool,
}

impl Rule {
    /// Allow rule over the whole subtree of `target` with no attribute
    /// restriction.
    pub fn new(
        target: impl Into<String>,
        subject: impl Into<String>,
        rights: impl Into<Rights>,
    ) -> Self {
        Self {
            target: target.into(),
            subject: subject.into(),
            scope: Scope::Subtree,
            rights: rights.into(),
            attributes: Vec::new(),
            deny: false,
        }
    }

    /// Structural validation applied before any accepted mutation.
    ///
    /// `index` is the rule's position in the list being validated; it is
    /// carried in the error so admin callers can point at the bad rule.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.target.is_empty() {
            return Err(Error::MissingTarget(index));
        }
        if self.subject.is_empty() {
            return Err(Error::MissingSubject(index));
        }
        if self.rights.is_empty() {
            return Err(Error::MissingRights(index));
        }
        Ok(())
    }
}
