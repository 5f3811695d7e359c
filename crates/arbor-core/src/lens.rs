//! Copy-on-write accessors over [`State`] values.
//!
//! A lens projects an outer value down to an inner slice (`get`) and folds an
//! updated slice back into a fresh copy of the outer value (`set`). `None`
//! stands for an absent value on either side: getting through an absent outer
//! value yields absent, and setting an absent inner value deletes the slice.
//!
//! Round trip: `get(set(outer, Some(v))) == Some(v)`.

use std::rc::Rc;

use serde_json::{Map, Value};

/// Application state: any serde-shaped value.
pub type State = Value;

pub trait Lens {
    fn get(&self, outer: Option<&State>) -> Option<State>;
    fn set(&self, outer: Option<State>, inner: Option<State>) -> Option<State>;
}

impl<L: Lens + ?Sized> Lens for Rc<L> {
    fn get(&self, outer: Option<&State>) -> Option<State> {
        (**self).get(outer)
    }

    fn set(&self, outer: Option<State>, inner: Option<State>) -> Option<State> {
        (**self).set(outer, inner)
    }
}

/// Sees (and replaces) the whole value.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityLens;

impl Lens for IdentityLens {
    fn get(&self, outer: Option<&State>) -> Option<State> {
        outer.cloned()
    }

    fn set(&self, _outer: Option<State>, inner: Option<State>) -> Option<State> {
        inner
    }
}

/// Addresses one object key. On arrays the key is read as a position, so the
/// stringified index `"2"` and `IndexLens(2)` see the same element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLens(pub String);

/// Addresses one array position. On objects the stringified index is used as
/// the key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexLens(pub usize);

impl Lens for FieldLens {
    fn get(&self, outer: Option<&State>) -> Option<State> {
        match outer? {
            Value::Array(items) => items.get(self.0.parse::<usize>().ok()?).cloned(),
            Value::Object(map) => map.get(&self.0).cloned(),
            _ => None,
        }
    }

    fn set(&self, outer: Option<State>, inner: Option<State>) -> Option<State> {
        match (outer, self.0.parse::<usize>()) {
            (Some(Value::Array(items)), Ok(index)) => Some(set_position(items, index, inner)),
            // A named field does not address anything in a sequence.
            (Some(Value::Array(items)), Err(_)) => Some(Value::Array(items)),
            (outer, _) => set_key(outer, &self.0, inner),
        }
    }
}

impl Lens for IndexLens {
    fn get(&self, outer: Option<&State>) -> Option<State> {
        match outer? {
            Value::Array(items) => items.get(self.0).cloned(),
            Value::Object(map) => map.get(&self.0.to_string()).cloned(),
            _ => None,
        }
    }

    fn set(&self, outer: Option<State>, inner: Option<State>) -> Option<State> {
        match outer {
            Some(Value::Array(items)) => Some(set_position(items, self.0, inner)),
            outer => set_key(outer, &self.0.to_string(), inner),
        }
    }
}

fn set_position(mut items: Vec<State>, index: usize, inner: Option<State>) -> State {
    match inner {
        Some(value) => {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            if items[index] != value {
                items[index] = value;
            }
        }
        None => {
            if index < items.len() {
                items.remove(index);
            }
        }
    }
    Value::Array(items)
}

fn set_key(outer: Option<State>, key: &str, inner: Option<State>) -> Option<State> {
    let mut map = match outer {
        Some(Value::Object(map)) => map,
        // Nothing to delete from.
        None if inner.is_none() => return None,
        _ => Map::new(),
    };
    match inner {
        Some(value) => {
            map.insert(key.to_owned(), value);
        }
        None => {
            map.remove(key);
        }
    }
    Some(Value::Object(map))
}

/// A lens built from a pair of closures.
pub struct FnLens<G, S> {
    get: G,
    set: S,
}

impl<G, S> FnLens<G, S>
where
    G: Fn(Option<&State>) -> Option<State>,
    S: Fn(Option<State>, Option<State>) -> Option<State>,
{
    pub fn new(get: G, set: S) -> Self {
        Self { get, set }
    }
}

impl<G, S> Lens for FnLens<G, S>
where
    G: Fn(Option<&State>) -> Option<State>,
    S: Fn(Option<State>, Option<State>) -> Option<State>,
{
    fn get(&self, outer: Option<&State>) -> Option<State> {
        (self.get)(outer)
    }

    fn set(&self, outer: Option<State>, inner: Option<State>) -> Option<State> {
        (self.set)(outer, inner)
    }
}

/// Applies `outer` then `inner`, like two `select`s in a row.
pub struct ComposedLens {
    outer: Rc<dyn Lens>,
    inner: Rc<dyn Lens>,
}

pub fn compose(outer: Rc<dyn Lens>, inner: Rc<dyn Lens>) -> ComposedLens {
    ComposedLens { outer, inner }
}

impl Lens for ComposedLens {
    fn get(&self, outer: Option<&State>) -> Option<State> {
        let middle = self.outer.get(outer);
        self.inner.get(middle.as_ref())
    }

    fn set(&self, outer: Option<State>, inner: Option<State>) -> Option<State> {
        let middle = self.outer.get(outer.as_ref());
        let middle = self.inner.set(middle, inner);
        self.outer.set(outer, middle)
    }
}
