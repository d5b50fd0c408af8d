//! Hierarchical names used to scope diagnostics.
//!
//! A [`Name`] is an immutable chain of leaves. Cloning is cheap (shared
//! `Arc` links) and equality/hashing are structural over the whole chain, so
//! two independently built names with the same leaves compare equal.
use std::{fmt, sync::Arc};

#[derive(Debug, PartialEq, Eq, Hash)]
struct Link {
    parent: Option<Name>,
    leaf: String,
}

/// Immutable hierarchical identifier (`gateway/routes/api`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(Arc<Link>);

impl Name {
    /// Create a root name with a single leaf.
    pub fn of(leaf: impl Into<String>) -> Self {
        Self(Arc::new(Link {
            parent: None,
            leaf: leaf.into(),
        }))
    }

    /// Build a name from a sequence of leaves, root first.
    ///
    /// Returns `None` for an empty sequence.
    pub fn from_leaves<I, S>(leaves: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = leaves.into_iter();
        let mut name = Self::of(iter.next()?);
        for leaf in iter {
            name = name.child(leaf);
        }
        Some(name)
    }

    /// Create a child of this name.
    pub fn child(&self, leaf: impl Into<String>) -> Self {
        Self(Arc::new(Link {
            parent: Some(self.clone()),
            leaf: leaf.into(),
        }))
    }

    /// Derive a sibling whose leaf is this leaf decorated with `decoration`
    /// (`handler` becomes `handler@timer`). Used to name wrappers and other
    /// synthetic objects derived from a configured one.
    pub fn decorated(&self, decoration: &str) -> Self {
        let leaf = format!("{}@{decoration}", self.0.leaf);
        match &self.0.parent {
            Some(parent) => parent.child(leaf),
            None => Self::of(leaf),
        }
    }

    pub fn parent(&self) -> Option<&Name> {
        self.0.parent.as_ref()
    }

    pub fn leaf(&self) -> &str {
        &self.0.leaf
    }

    /// Leaves from the root down to this name.
    pub fn leaves(&self) -> Vec<&str> {
        let mut leaves = Vec::new();
        let mut current = Some(self);
        while let Some(name) = current {
            leaves.push(name.leaf());
            current = name.parent();
        }
        leaves.reverse();
        leaves
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.0.parent {
            write!(f, "{parent}/")?;
        }
        f.write_str(&self.0.leaf)
    }
}
