use std::rc::Rc;

use arbor_core::{Lens, State};
use serde_json::Value;

/// Derives an item's key from the item and its position.
pub type KeyFn = Rc<dyn Fn(&State, usize) -> String>;

/// Locates an array element by derived key instead of by position, so an
/// isolated item keeps reading and writing its own element while siblings
/// are inserted, removed, or reordered around it.
#[derive(Clone)]
pub struct InstanceLens {
    key_fn: KeyFn,
    key: String,
}

pub fn for_key(key_fn: KeyFn, key: impl Into<String>) -> InstanceLens {
    InstanceLens {
        key_fn,
        key: key.into(),
    }
}

impl InstanceLens {
    pub fn key(&self) -> &str {
        &self.key
    }

    fn matches(&self, item: &State, index: usize) -> bool {
        (self.key_fn)(item, index) == self.key
    }
}

impl Lens for InstanceLens {
    fn get(&self, outer: Option<&State>) -> Option<State> {
        let items = outer?.as_array()?;
        items
            .iter()
            .enumerate()
            .find(|(index, item)| self.matches(item, *index))
            .map(|(_, item)| item.clone())
    }

    fn set(&self, outer: Option<State>, inner: Option<State>) -> Option<State> {
        match (outer, inner) {
            (Some(Value::Array(items)), None) => Some(Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .filter(|(index, item)| !self.matches(item, *index))
                    .map(|(_, item)| item)
                    .collect(),
            )),
            (Some(Value::Array(items)), Some(replacement)) => Some(Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        if self.matches(&item, index) {
                            replacement.clone()
                        } else {
                            item
                        }
                    })
                    .collect(),
            )),
            (_, Some(item)) => Some(Value::Array(vec![item])),
            // Nothing to delete from.
            (outer, None) => outer,
        }
    }
}
