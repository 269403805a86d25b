//! Access context and the opaque entry carrier used by attribute filtering.

use serde::{Deserialize, Serialize};

use crate::rule::Right;

/// One access decision request: who is asking, what they touch, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    /// Authenticated identity of the requester; empty means anonymous.
    pub bind_dn: String,
    /// DN of the entry being touched.
    pub target_dn: String,
    /// The single operation being performed.
    pub operation: Right,
    /// Attribute names involved in the operation, when relevant.
    pub attributes: Vec<String>,
}

impl AccessContext {
    /// Context with no attribute list.
    pub fn new(bind_dn: impl Into<String>, target_dn: impl Into<String>, operation: Right) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            target_dn: target_dn.into(),
            operation,
            attributes: Vec::new(),
        }
    }

    /// Same requester and entry, different operation.
    #[must_use]
    pub fn with_operation(&self, operation: Right) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    /// Whether the requester is anonymous.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.bind_dn.is_empty()
    }
}

/// One named attribute and its ordered values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttribute {
    /// Attribute name as stored (original case preserved).
    pub name: String,
    /// Values in storage order.
    pub values: Vec<String>,
}

/// A directory entry as seen by the attribute-filter helpers: a DN plus an
/// ordered attribute list with case-insensitive name lookup.
///
/// The engine treats entries as opaque; it never interprets object classes
/// or schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: String,
    attributes: Vec<EntryAttribute>,
}

impl Entry {
    /// Entry with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Set an attribute, replacing any existing values under a
    /// case-insensitively equal name. Insertion order is preserved for
    /// new names.
    pub fn set_attribute(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(&name))
        {
            existing.values = values;
        } else {
            self.attributes.push(EntryAttribute { name, values });
        }
    }

    /// Builder-style [`set_attribute`](Self::set_attribute).
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.set_attribute(name, values);
        self
    }

    /// Values for `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.values.as_slice())
    }

    /// Whether the entry carries `name`, compared case-insensitively.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Attributes in storage order.
    pub fn attributes(&self) -> impl Iterator<Item = &EntryAttribute> {
        self.attributes.iter()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the entry has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
