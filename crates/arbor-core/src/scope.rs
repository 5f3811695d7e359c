use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::lens::{FieldLens, IndexLens, Lens};

/// Channel-map entry that applies to every channel not listed explicitly.
pub const WILDCARD: &str = "*";

/// Which slice of a larger value a component (or one of its channels) sees.
#[derive(Clone)]
pub enum Scope {
    Field(String),
    Index(usize),
    Lens(Rc<dyn Lens>),
}

impl Scope {
    pub fn lens(lens: impl Lens + 'static) -> Self {
        Scope::Lens(Rc::new(lens))
    }

    /// Resolves the descriptor into a concrete accessor. Lens scopes resolve
    /// to themselves.
    pub fn resolve(&self) -> Rc<dyn Lens> {
        match self {
            Scope::Field(name) => Rc::new(FieldLens(name.clone())),
            Scope::Index(index) => Rc::new(IndexLens(*index)),
            Scope::Lens(lens) => lens.clone(),
        }
    }

    /// A textual form for channels that namespace by name rather than by lens.
    pub fn label(&self) -> Option<String> {
        match self {
            Scope::Field(name) => Some(name.clone()),
            Scope::Index(index) => Some(index.to_string()),
            Scope::Lens(_) => None,
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Scope::Index(index) => f.debug_tuple("Index").field(index).finish(),
            Scope::Lens(_) => f.write_str("Lens(..)"),
        }
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Scope::Field(name.to_owned())
    }
}

impl From<String> for Scope {
    fn from(name: String) -> Self {
        Scope::Field(name)
    }
}

impl From<usize> for Scope {
    fn from(index: usize) -> Self {
        Scope::Index(index)
    }
}

/// Per-channel scopes handed to [`isolate`](crate::isolate::isolate).
///
/// An entry of `None` leaves that channel unisolated. Channels without an
/// entry fall back to the [`WILDCARD`] entry, if any.
#[derive(Clone, Debug, Default)]
pub struct ScopeMap {
    entries: HashMap<String, Option<Scope>>,
}

impl ScopeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every channel gets `scope`.
    pub fn all(scope: impl Into<Scope>) -> Self {
        Self::new().with(WILDCARD, scope)
    }

    pub fn with(mut self, channel: impl Into<String>, scope: impl Into<Scope>) -> Self {
        self.entries.insert(channel.into(), Some(scope.into()));
        self
    }

    /// Explicitly leaves `channel` unisolated, overriding the wildcard.
    pub fn without(mut self, channel: impl Into<String>) -> Self {
        self.entries.insert(channel.into(), None);
        self
    }

    pub fn insert(&mut self, channel: impl Into<String>, scope: Option<Scope>) {
        self.entries.insert(channel.into(), scope);
    }

    pub fn scope_for(&self, channel: &str) -> Option<&Scope> {
        match self.entries.get(channel) {
            Some(entry) => entry.as_ref(),
            None => self.entries.get(WILDCARD).and_then(Option::as_ref),
        }
    }

    /// Entries of `other` take precedence.
    pub fn merged(mut self, other: ScopeMap) -> Self {
        self.entries.extend(other.entries);
        self
    }
}
