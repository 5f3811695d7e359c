use std::collections::HashMap;
use std::rc::Rc;

use arbor_core::{
    BoxedComponent, IdentityLens, Scope, ScopeMap, Sinks, Sources, State, Stream, isolate_shared,
};
use serde_json::Value;

use crate::DEFAULT_CHANNEL;
use crate::instance_lens::{KeyFn, for_key};
use crate::instances::{CollectionMode, Instance, InstanceTable, Instances};
use crate::source::StateSource;

/// Key of the single instance a non-array state produces when no key
/// function is configured.
pub const SCALAR_KEY: &str = "this";

/// Extra scopes for one item, on top of the state channel's own scope.
#[derive(Clone, Debug)]
pub enum ItemScope {
    /// One scope for every channel.
    Broadcast(Scope),
    PerChannel(ScopeMap),
}

impl From<Scope> for ItemScope {
    fn from(scope: Scope) -> Self {
        ItemScope::Broadcast(scope)
    }
}

impl From<&str> for ItemScope {
    fn from(name: &str) -> Self {
        ItemScope::Broadcast(name.into())
    }
}

impl From<String> for ItemScope {
    fn from(name: String) -> Self {
        ItemScope::Broadcast(name.into())
    }
}

impl From<ScopeMap> for ItemScope {
    fn from(scopes: ScopeMap) -> Self {
        ItemScope::PerChannel(scopes)
    }
}

type ItemScopeFn = Rc<dyn Fn(&str) -> ItemScope>;

/// Builds a component that runs one `item` per element of the state it is
/// given, matched across updates by key.
///
/// ```ignore
/// let list = Collection::new(todo_item, |items: Instances| {
///     Sinks::new().with("state", items.pick_merge::<Reducer>("state"))
/// })
/// .item_key(|todo, _| todo["id"].to_string())
/// .build();
/// ```
pub struct Collection {
    item: BoxedComponent,
    collect_sinks: Rc<dyn Fn(Instances) -> Sinks>,
    item_key: Option<KeyFn>,
    item_scope: Option<ItemScopeFn>,
    channel: String,
}

impl Collection {
    pub fn new(
        item: impl Fn(Sources) -> Sinks + 'static,
        collect_sinks: impl Fn(Instances) -> Sinks + 'static,
    ) -> Self {
        Self {
            item: Rc::new(item),
            collect_sinks: Rc::new(collect_sinks),
            item_key: None,
            item_scope: None,
            channel: DEFAULT_CHANNEL.to_owned(),
        }
    }

    /// Derives each element's key from the element and its index. Without
    /// one, the index itself is the key.
    pub fn item_key(mut self, f: impl Fn(&State, usize) -> String + 'static) -> Self {
        self.item_key = Some(Rc::new(f));
        self
    }

    pub fn item_scope<S: Into<ItemScope>>(mut self, f: impl Fn(&str) -> S + 'static) -> Self {
        self.item_scope = Some(Rc::new(move |key: &str| -> ItemScope { f(key).into() }));
        self
    }

    /// Where the state channel is mounted in sources and sinks.
    pub fn channel(mut self, name: impl Into<String>) -> Self {
        self.channel = name.into();
        self
    }

    pub fn build(self) -> impl Fn(Sources) -> Sinks + 'static {
        let engine = Rc::new(Engine {
            item: self.item,
            item_key: self.item_key,
            item_scope: self.item_scope,
            channel: self.channel,
        });
        let collect_sinks = self.collect_sinks;
        move |sources: Sources| {
            let Some(state) = sources.get::<StateSource>(&engine.channel) else {
                log::warn!(
                    "collection: no state source under `{}`; no items will be created",
                    engine.channel
                );
                return collect_sinks(Instances::new(
                    Stream::once(InstanceTable::default()).remember(),
                ));
            };
            let engine = engine.clone();
            let tables = state
                .stream()
                .fold(InstanceTable::default(), move |table, state: &State| {
                    engine.step(table, state, &sources)
                });
            collect_sinks(Instances::new(tables))
        }
    }
}

struct Engine {
    item: BoxedComponent,
    item_key: Option<KeyFn>,
    item_scope: Option<ItemScopeFn>,
    channel: String,
}

impl Engine {
    fn step(&self, prev: InstanceTable, state: &State, sources: &Sources) -> InstanceTable {
        match state {
            Value::Array(items) => self.step_array(prev, items, sources),
            _ => self.step_scalar(prev, state, sources),
        }
    }

    fn step_array(&self, prev: InstanceTable, items: &[State], sources: &Sources) -> InstanceTable {
        let mut previous = prev.by_key;
        if prev.mode == CollectionMode::Scalar {
            log::debug!("collection `{}`: switching to array mode", self.channel);
            for key in previous.keys() {
                log::debug!("collection `{}`: removing `{key}`", self.channel);
            }
            previous.clear();
        }

        let mut by_key: HashMap<String, Instance> = HashMap::with_capacity(items.len());
        let mut order = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key = match &self.item_key {
                Some(key_fn) => key_fn(item, index),
                None => index.to_string(),
            };
            // A key repeated within one snapshot resolves to the same instance.
            let instance = match by_key.get(&key).or_else(|| previous.get(&key)) {
                Some(instance) => instance.clone(),
                None => {
                    let scope = match &self.item_key {
                        Some(key_fn) => Scope::lens(for_key(key_fn.clone(), key.clone())),
                        None => Scope::Field(index.to_string()),
                    };
                    log::debug!("collection `{}`: creating `{key}`", self.channel);
                    self.instantiate(&key, scope, sources)
                }
            };
            by_key.insert(key, instance.clone());
            order.push(instance);
        }

        for key in previous.keys().filter(|key| !by_key.contains_key(*key)) {
            log::debug!("collection `{}`: removing `{key}`", self.channel);
        }
        InstanceTable {
            by_key,
            order,
            mode: CollectionMode::Array,
        }
    }

    fn step_scalar(&self, prev: InstanceTable, state: &State, sources: &Sources) -> InstanceTable {
        let key = match &self.item_key {
            Some(key_fn) => key_fn(state, 0),
            None => SCALAR_KEY.to_owned(),
        };
        let reused = match prev.mode {
            CollectionMode::Scalar => prev.by_key.get(&key).cloned(),
            CollectionMode::Array => None,
        };
        let instance = match reused {
            Some(instance) => instance,
            None => {
                if prev.mode == CollectionMode::Array {
                    log::debug!("collection `{}`: switching to scalar mode", self.channel);
                }
                for stale in prev.by_key.keys() {
                    log::debug!("collection `{}`: removing `{stale}`", self.channel);
                }
                log::debug!("collection `{}`: creating `{key}`", self.channel);
                self.instantiate(&key, Scope::lens(IdentityLens), sources)
            }
        };
        InstanceTable {
            by_key: HashMap::from([(key, instance.clone())]),
            order: vec![instance],
            mode: CollectionMode::Scalar,
        }
    }

    fn instantiate(&self, key: &str, channel_scope: Scope, sources: &Sources) -> Instance {
        let mut scopes = match self.item_scope.as_ref().map(|f| f(key)) {
            Some(ItemScope::Broadcast(scope)) => ScopeMap::all(scope),
            Some(ItemScope::PerChannel(scopes)) => scopes,
            None => ScopeMap::new(),
        };
        scopes.insert(self.channel.clone(), Some(channel_scope));
        let sinks = isolate_shared(self.item.clone(), scopes)(sources.clone());
        Instance::new(key, sinks)
    }
}
