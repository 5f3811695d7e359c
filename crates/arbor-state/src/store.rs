use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use arbor_core::{Emitter, State, Stream, Subscription};

use crate::source::StateSource;

/// A pure state transition. Returning `None` deletes the slice it was given.
pub type Reducer = Rc<dyn Fn(Option<State>) -> Option<State>>;

pub fn reducer(f: impl Fn(Option<State>) -> Option<State> + 'static) -> Reducer {
    Rc::new(f)
}

/// Reactive cell folding a stream of reducers into a current value.
///
/// The store subscribes to its reducers as soon as it is created and stays
/// subscribed until dropped. It publishes a value only when the fold result
/// is present and differs from the last published one; late subscribers to
/// [`StateStore::published`] receive the last published value.
///
/// Reducers arriving while a published value is still propagating are queued
/// and applied in arrival order once that propagation has finished.
pub struct StateStore {
    cell: Rc<StoreCell>,
    published: Stream<State>,
    _reducers: Subscription,
}

struct StoreCell {
    name: Rc<str>,
    current: RefCell<Option<State>>,
    last_published: RefCell<Option<State>>,
    queue: RefCell<VecDeque<Reducer>>,
    draining: Cell<bool>,
    out: Emitter<State>,
}

impl StoreCell {
    fn dispatch(&self, reducer: Reducer) {
        self.queue.borrow_mut().push_back(reducer);
        if self.draining.replace(true) {
            return;
        }
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(reducer) = next else {
                break;
            };
            let prev = self.current.borrow().clone();
            let value = reducer(prev);
            *self.current.borrow_mut() = value.clone();

            let Some(value) = value else {
                log::trace!("store `{}`: state is absent", self.name);
                continue;
            };
            if self.last_published.borrow().as_ref() == Some(&value) {
                continue;
            }
            log::trace!("store `{}`: publishing", self.name);
            *self.last_published.borrow_mut() = Some(value.clone());
            self.out.emit(value);
        }
        self.draining.set(false);
    }
}

impl StateStore {
    pub fn new(name: impl Into<Rc<str>>, reducers: &Stream<Reducer>) -> Self {
        let (out, published) = Stream::remembered_source();
        let cell = Rc::new(StoreCell {
            name: name.into(),
            current: RefCell::new(None),
            last_published: RefCell::new(None),
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            out,
        });
        let sub = reducers.subscribe({
            let cell = cell.clone();
            move |reducer: &Reducer| cell.dispatch(reducer.clone())
        });
        Self {
            cell,
            published,
            _reducers: sub,
        }
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Applies `reducer` as if it had arrived on the reducer stream.
    pub fn dispatch(&self, reducer: Reducer) {
        self.cell.dispatch(reducer);
    }

    /// The latest fold result, absent included.
    pub fn current(&self) -> Option<State> {
        self.cell.current.borrow().clone()
    }

    pub fn published(&self) -> Stream<State> {
        self.published.clone()
    }

    /// A projection over the whole state, labelled with the store's name.
    pub fn source(&self) -> StateSource {
        StateSource::new(self.published(), self.cell.name.clone())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("name", &self.cell.name)
            .field("current", &self.cell.current.borrow())
            .finish()
    }
}
