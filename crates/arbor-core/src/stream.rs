//! Push-based, single-threaded streams.
//!
//! A [`Stream`] is a cheap, cloneable handle to a shared node in a dataflow
//! graph. Nodes are lazy: a derived stream attaches to its upstream when it
//! gains its first listener and detaches when it loses its last one, so a
//! graph that nobody observes does no work and holds no upstream
//! registrations.
//!
//! Remembered streams memoize the last emitted value and replay it to late
//! subscribers. A derived remembered stream forgets its value when it stops;
//! the next start re-derives it from upstream.
//!
//! A value emitted into a stream that is still dispatching an earlier value
//! is queued until that earlier value has reached every listener.
//!
//! ```rust
//! use arbor_core::stream::Stream;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let (tx, numbers) = Stream::<i32>::source();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let sub = numbers.filter(|n| n % 2 == 0).map(|n| n * 10).subscribe({
//!     let seen = seen.clone();
//!     move |n| seen.borrow_mut().push(*n)
//! });
//!
//! for n in 1..=4 {
//!     tx.emit(n);
//! }
//! assert_eq!(*seen.borrow(), vec![20, 40]);
//! drop(sub);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::subscription::Subscription;

new_key_type! {
    /// Identity of one listener registration on one stream.
    pub struct ListenerKey;
}

type Listener<T> = Rc<dyn Fn(&T)>;
type Attach<T> = Rc<dyn Fn(Emitter<T>) -> Subscription>;

struct Inner<T: 'static> {
    listeners: RefCell<SlotMap<ListenerKey, Listener<T>>>,
    // How to connect to upstream; `None` for sources and unresolved proxies.
    attach: RefCell<Option<Attach<T>>>,
    upstream: RefCell<Option<Subscription>>,
    attaching: Cell<bool>,
    // Values emitted while a dispatch is running wait here, so every
    // listener observes the same order.
    dispatching: Cell<bool>,
    pending: RefCell<VecDeque<T>>,
    memory: Option<RefCell<Option<T>>>,
}

impl<T: Clone + 'static> Inner<T> {
    fn new(remember: bool, attach: Option<Attach<T>>) -> Rc<Self> {
        Rc::new(Self {
            listeners: RefCell::new(SlotMap::with_key()),
            attach: RefCell::new(attach),
            upstream: RefCell::new(None),
            attaching: Cell::new(false),
            dispatching: Cell::new(false),
            pending: RefCell::new(VecDeque::new()),
            memory: remember.then(|| RefCell::new(None)),
        })
    }

    fn emit(&self, value: T) {
        if self.dispatching.replace(true) {
            self.pending.borrow_mut().push_back(value);
            return;
        }
        let mut next = Some(value);
        while let Some(value) = next {
            self.deliver(value);
            next = self.pending.borrow_mut().pop_front();
        }
        self.dispatching.set(false);
    }

    fn deliver(&self, value: T) {
        if let Some(memory) = &self.memory {
            *memory.borrow_mut() = Some(value.clone());
        }
        let keys: SmallVec<[ListenerKey; 8]> = self.listeners.borrow().keys().collect();
        for key in keys {
            // A listener removed by an earlier listener must not see this value.
            let listener = self.listeners.borrow().get(key).cloned();
            if let Some(listener) = listener {
                listener(&value);
            }
        }
    }

    fn start(self: &Rc<Self>) {
        if self.attaching.get() || self.upstream.borrow().is_some() {
            return;
        }
        let Some(attach) = self.attach.borrow().clone() else {
            return;
        };
        self.attaching.set(true);
        let sub = attach(Emitter(self.clone()));
        self.attaching.set(false);
        if self.listeners.borrow().is_empty() {
            drop(sub);
        } else {
            *self.upstream.borrow_mut() = Some(sub);
        }
    }

    fn stop(&self) {
        let upstream = self.upstream.borrow_mut().take();
        if self.attach.borrow().is_some()
            && let Some(memory) = &self.memory
        {
            memory.borrow_mut().take();
        }
        drop(upstream);
    }

    fn remove(&self, key: ListenerKey) {
        let now_empty = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.remove(key).is_some() && listeners.is_empty()
        };
        if now_empty {
            self.stop();
        }
    }
}

/// Handle used by a producer to push values into a stream.
pub struct Emitter<T: 'static>(Rc<Inner<T>>);

impl<T: 'static> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Clone + 'static> Emitter<T> {
    pub fn emit(&self, value: T) {
        self.0.emit(value)
    }

    /// Whether anything is currently listening.
    pub fn has_listeners(&self) -> bool {
        !self.0.listeners.borrow().is_empty()
    }
}

pub struct Stream<T: 'static> {
    inner: Rc<Inner<T>>,
}

impl<T: 'static> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("remembered", &self.inner.memory.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// A stream driven by hand through the returned [`Emitter`].
    pub fn source() -> (Emitter<T>, Self) {
        let inner = Inner::new(false, None);
        (Emitter(inner.clone()), Self { inner })
    }

    /// Like [`Stream::source`], but late subscribers receive the last value.
    pub fn remembered_source() -> (Emitter<T>, Self) {
        let inner = Inner::new(true, None);
        (Emitter(inner.clone()), Self { inner })
    }

    /// A lazy stream: `attach` runs on every start and its returned
    /// subscription is dropped on stop.
    pub fn create(attach: impl Fn(Emitter<T>) -> Subscription + 'static) -> Self {
        Self {
            inner: Inner::new(false, Some(Rc::new(attach))),
        }
    }

    pub fn create_remembered(attach: impl Fn(Emitter<T>) -> Subscription + 'static) -> Self {
        Self {
            inner: Inner::new(true, Some(Rc::new(attach))),
        }
    }

    pub fn never() -> Self {
        Self {
            inner: Inner::new(false, None),
        }
    }

    /// Emits `value` to the listener that starts the stream.
    pub fn once(value: T) -> Self {
        Self::create(move |out| {
            out.emit(value.clone());
            Subscription::empty()
        })
    }

    /// A placeholder to be wired up later with [`Stream::imitate`].
    pub fn proxy() -> Self {
        Self::never()
    }

    /// Makes this stream forward everything `target` emits. Used to close
    /// cycles where a stream must exist before the one that feeds it.
    pub fn imitate(&self, target: &Stream<T>) {
        let target = target.clone();
        let attach: Attach<T> =
            Rc::new(move |out: Emitter<T>| target.subscribe(move |v| out.emit(v.clone())));
        let previous = self.inner.upstream.borrow_mut().take();
        *self.inner.attach.borrow_mut() = Some(attach);
        drop(previous);
        if !self.inner.listeners.borrow().is_empty() {
            self.inner.start();
        }
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let listener: Listener<T> = Rc::new(f);
        let (key, first) = {
            let mut listeners = self.inner.listeners.borrow_mut();
            let key = listeners.insert(listener.clone());
            (key, listeners.len() == 1)
        };

        let replay = self
            .inner
            .memory
            .as_ref()
            .and_then(|memory| memory.borrow().clone());
        if let Some(value) = replay {
            listener(&value);
        }

        if first {
            self.inner.start();
        }

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(key);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn is_active(&self) -> bool {
        self.listener_count() > 0
    }

    pub fn is_remembered(&self) -> bool {
        self.inner.memory.is_some()
    }

    /// The memoized value of a remembered stream.
    pub fn current(&self) -> Option<T> {
        self.inner
            .memory
            .as_ref()
            .and_then(|memory| memory.borrow().clone())
    }

    pub fn ptr_eq(&self, other: &Stream<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> Stream<U> {
        let upstream = self.clone();
        let f = Rc::new(f);
        Stream::create(move |out| {
            let f = f.clone();
            upstream.subscribe(move |v| out.emit(f(v)))
        })
    }

    pub fn filter(&self, pred: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        let upstream = self.clone();
        let pred = Rc::new(pred);
        Stream::create(move |out| {
            let pred = pred.clone();
            upstream.subscribe(move |v| {
                if pred(v) {
                    out.emit(v.clone());
                }
            })
        })
    }

    pub fn filter_map<U: Clone + 'static>(
        &self,
        f: impl Fn(&T) -> Option<U> + 'static,
    ) -> Stream<U> {
        let upstream = self.clone();
        let f = Rc::new(f);
        Stream::create(move |out| {
            let f = f.clone();
            upstream.subscribe(move |v| {
                if let Some(u) = f(v) {
                    out.emit(u);
                }
            })
        })
    }

    /// Accumulates into a remembered stream. The seed is emitted on start and
    /// the accumulator restarts from the seed whenever the stream restarts.
    pub fn fold<A: Clone + 'static>(
        &self,
        seed: A,
        f: impl Fn(A, &T) -> A + 'static,
    ) -> Stream<A> {
        let upstream = self.clone();
        let f = Rc::new(f);
        Stream::create_remembered(move |out| {
            let acc = Rc::new(RefCell::new(Some(seed.clone())));
            out.emit(seed.clone());
            let f = f.clone();
            upstream.subscribe(move |v| {
                let prev = acc.borrow_mut().take();
                let Some(prev) = prev else {
                    log::warn!("fold: upstream emitted while the accumulator was in use; skipped");
                    return;
                };
                let next = f(prev, v);
                *acc.borrow_mut() = Some(next.clone());
                out.emit(next);
            })
        })
    }

    pub fn remember(&self) -> Stream<T> {
        if self.is_remembered() {
            return self.clone();
        }
        let upstream = self.clone();
        Stream::create_remembered(move |out| upstream.subscribe(move |v| out.emit(v.clone())))
    }

    /// Suppresses the first `n` emissions after each start.
    pub fn skip(&self, n: usize) -> Stream<T> {
        let upstream = self.clone();
        Stream::create(move |out| {
            let seen = Cell::new(0usize);
            upstream.subscribe(move |v| {
                if seen.get() < n {
                    seen.set(seen.get() + 1);
                } else {
                    out.emit(v.clone());
                }
            })
        })
    }

    /// Drops values equal to the one emitted just before them.
    pub fn dedup(&self) -> Stream<T>
    where
        T: PartialEq,
    {
        let upstream = self.clone();
        Stream::create(move |out| {
            let last: RefCell<Option<T>> = RefCell::new(None);
            upstream.subscribe(move |v| {
                if last.borrow().as_ref() == Some(v) {
                    return;
                }
                *last.borrow_mut() = Some(v.clone());
                out.emit(v.clone());
            })
        })
    }

    pub fn compose<U>(&self, f: impl FnOnce(&Stream<T>) -> Stream<U>) -> Stream<U> {
        f(self)
    }
}

/// Forwards every emission of every input stream.
pub fn merge<T: Clone + 'static>(streams: Vec<Stream<T>>) -> Stream<T> {
    Stream::create(move |out| {
        let subs = streams
            .iter()
            .map(|stream| {
                let out = out.clone();
                stream.subscribe(move |v| out.emit(v.clone()))
            })
            .collect();
        Subscription::all(subs)
    })
}

/// Emits the latest value of every input, in input order, each time any
/// input emits once all of them have emitted at least once. With no inputs
/// nothing is emitted.
pub fn combine<T: Clone + 'static>(streams: Vec<Stream<T>>) -> Stream<Vec<T>> {
    Stream::create(move |out| {
        let latest: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; streams.len()]));
        let subs = streams
            .iter()
            .enumerate()
            .map(|(i, stream)| {
                let out = out.clone();
                let latest = latest.clone();
                stream.subscribe(move |v| {
                    let ready = {
                        let mut latest = latest.borrow_mut();
                        latest[i] = Some(v.clone());
                        latest.iter().cloned().collect::<Option<Vec<T>>>()
                    };
                    if let Some(values) = ready {
                        out.emit(values);
                    }
                })
            })
            .collect();
        Subscription::all(subs)
    })
}
