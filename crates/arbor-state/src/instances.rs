//! Live instance tables and the operators that aggregate one output channel
//! across whichever instances are currently alive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use arbor_core::{ChannelError, Emitter, Sinks, Stream, Subscription};
use smallvec::SmallVec;

/// Whether the table was last built from an array or from a single value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CollectionMode {
    #[default]
    Array,
    Scalar,
}

/// One running item component, tagged with its key.
#[derive(Clone)]
pub struct Instance(Rc<InstanceRecord>);

struct InstanceRecord {
    key: String,
    sinks: Sinks,
}

impl Instance {
    pub(crate) fn new(key: impl Into<String>, sinks: Sinks) -> Self {
        Self(Rc::new(InstanceRecord {
            key: key.into(),
            sinks,
        }))
    }

    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn sinks(&self) -> &Sinks {
        &self.0.sinks
    }

    /// Whether both handles refer to the same instantiation.
    pub fn same(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The instance's `selector` channel. A missing channel never emits; a
    /// channel of another type is skipped.
    fn channel<T: Clone + 'static>(&self, selector: &str) -> Option<Stream<T>> {
        match self.sinks().try_get::<T>(selector) {
            Ok(stream) => Some(stream),
            Err(ChannelError::Missing(_)) => {
                log::trace!("instance `{}` has no `{selector}` channel", self.key());
                Some(Stream::never())
            }
            Err(err) => {
                log::warn!("instance `{}`: {err}", self.key());
                None
            }
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("key", &self.0.key)
            .field("sinks", &self.0.sinks)
            .finish()
    }
}

/// Snapshot of the live instances: lookup by key, plus the instances in the
/// order of the state they were built from.
#[derive(Clone, Debug, Default)]
pub struct InstanceTable {
    pub(crate) by_key: HashMap<String, Instance>,
    pub(crate) order: Vec<Instance>,
    pub(crate) mode: CollectionMode,
}

impl InstanceTable {
    /// Number of positions, which equals the length of the source array.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of distinct live instances.
    pub fn live(&self) -> usize {
        self.by_key.len()
    }

    pub fn mode(&self) -> CollectionMode {
        self.mode
    }

    pub fn get(&self, key: &str) -> Option<&Instance> {
        self.by_key.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.order.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(Instance::key)
    }

    fn holds(&self, instance: &Instance) -> bool {
        self.by_key
            .get(instance.key())
            .is_some_and(|live| live.same(instance))
    }
}

/// Handle over a collection's instance tables, given to `collect_sinks`.
#[derive(Clone, Debug)]
pub struct Instances {
    tables: Stream<InstanceTable>,
}

impl Instances {
    pub fn new(tables: Stream<InstanceTable>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> Stream<InstanceTable> {
        self.tables.clone()
    }

    /// Merges channel `selector` of every live instance. Instances are
    /// subscribed when they appear and unsubscribed when they leave the
    /// table; a removed instance's later emissions are dropped.
    pub fn pick_merge<T: Clone + 'static>(&self, selector: &str) -> Stream<T> {
        let tables = self.tables.clone();
        let selector: Rc<str> = selector.into();
        Stream::create(move |out: Emitter<T>| {
            let live: Rc<RefCell<HashMap<String, (Instance, Subscription)>>> = Rc::default();
            let selector = selector.clone();
            let tables_sub = tables.subscribe({
                let live = live.clone();
                move |table: &InstanceTable| {
                    drop(evict_stale(&live, table));
                    for instance in table.iter() {
                        if live.borrow().contains_key(instance.key()) {
                            continue;
                        }
                        let Some(channel) = instance.channel::<T>(&selector) else {
                            continue;
                        };
                        log::trace!("pick_merge `{selector}`: subscribing `{}`", instance.key());
                        let out = out.clone();
                        let sub = channel.subscribe(move |v| out.emit(v.clone()));
                        live.borrow_mut()
                            .insert(instance.key().to_owned(), (instance.clone(), sub));
                    }
                }
            });
            Subscription::new(move || {
                drop(tables_sub);
                let subs = std::mem::take(&mut *live.borrow_mut());
                drop(subs);
            })
        })
    }

    /// Combines channel `selector` of every live instance into a sequence in
    /// table order. Emits whenever one of them emits or the instance set
    /// changes, once every instance has emitted at least once; an instance
    /// without the channel holds the output back. An empty instance set
    /// combines to an empty sequence.
    pub fn pick_combine<T: Clone + 'static>(&self, selector: &str) -> Stream<Vec<T>> {
        let tables = self.tables.clone();
        let selector: Rc<str> = selector.into();
        Stream::create(move |out: Emitter<Vec<T>>| {
            let combined: Rc<Combined<T>> = Rc::new(Combined {
                order: RefCell::new(None),
                latest: RefCell::new(HashMap::new()),
                live: RefCell::new(HashMap::new()),
                settling: Cell::new(false),
            });
            let selector = selector.clone();
            let tables_sub = tables.subscribe({
                let combined = combined.clone();
                let out = out.clone();
                move |table: &InstanceTable| {
                    combined.settling.set(true);
                    for key in evict_stale(&combined.live, table).iter().map(|(k, _)| k) {
                        combined.latest.borrow_mut().remove(key);
                    }
                    for instance in table.iter() {
                        if combined.live.borrow().contains_key(instance.key()) {
                            continue;
                        }
                        let Some(channel) = instance.channel::<T>(&selector) else {
                            continue;
                        };
                        log::trace!("pick_combine `{selector}`: subscribing `{}`", instance.key());
                        let key = instance.key().to_owned();
                        let sub = channel.subscribe({
                            let combined = Rc::downgrade(&combined);
                            let out = out.clone();
                            move |v: &T| {
                                let Some(combined) = combined.upgrade() else {
                                    return;
                                };
                                combined.latest.borrow_mut().insert(key.clone(), v.clone());
                                if !combined.settling.get() {
                                    combined.emit_if_ready(&out);
                                }
                            }
                        });
                        combined
                            .live
                            .borrow_mut()
                            .insert(instance.key().to_owned(), (instance.clone(), sub));
                    }

                    let order: Vec<Instance> = {
                        let live = combined.live.borrow();
                        table
                            .iter()
                            .filter(|instance| live.contains_key(instance.key()))
                            .cloned()
                            .collect()
                    };
                    let changed = combined.order.borrow().as_ref().is_none_or(|prev| {
                        prev.len() != order.len()
                            || prev.iter().zip(&order).any(|(a, b)| !a.same(b))
                    });
                    *combined.order.borrow_mut() = Some(order);
                    combined.settling.set(false);
                    if changed {
                        combined.emit_if_ready(&out);
                    }
                }
            });
            Subscription::new(move || {
                drop(tables_sub);
                let subs = std::mem::take(&mut *combined.live.borrow_mut());
                drop(subs);
            })
        })
    }
}

struct Combined<T> {
    order: RefCell<Option<Vec<Instance>>>,
    latest: RefCell<HashMap<String, T>>,
    live: RefCell<HashMap<String, (Instance, Subscription)>>,
    // Set while a new table is being applied; one emission follows instead.
    settling: Cell<bool>,
}

impl<T: Clone + 'static> Combined<T> {
    fn emit_if_ready(&self, out: &Emitter<Vec<T>>) {
        let ready: Option<Vec<T>> = {
            let order = self.order.borrow();
            let latest = self.latest.borrow();
            order
                .iter()
                .flatten()
                .map(|instance| latest.get(instance.key()).cloned())
                .collect()
        };
        if let Some(values) = ready {
            out.emit(values);
        }
    }
}

/// Removes (and returns, for the caller to drop outside the borrow) every
/// subscription whose instance is no longer in `table`.
fn evict_stale(
    live: &RefCell<HashMap<String, (Instance, Subscription)>>,
    table: &InstanceTable,
) -> SmallVec<[(String, Subscription); 4]> {
    let mut live = live.borrow_mut();
    let stale: SmallVec<[String; 4]> = live
        .iter()
        .filter(|(_, (instance, _))| !table.holds(instance))
        .map(|(key, _)| key.clone())
        .collect();
    stale
        .into_iter()
        .filter_map(|key| {
            let (_, sub) = live.remove(&key)?;
            log::trace!("unsubscribing removed instance `{key}`");
            Some((key, sub))
        })
        .collect()
}
