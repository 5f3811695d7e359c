use std::rc::Rc;

use arbor_core::{Lens, Scope, SinkStream, SourceChannel, State, Stream};
use serde::de::DeserializeOwned;

use crate::boundary::lift_sink;
use crate::store::Reducer;

/// The state channel as a component sees it: a remembered, deduplicated
/// stream of present values, narrowed by every `select` on the way down.
#[derive(Clone)]
pub struct StateSource {
    stream: Stream<State>,
    name: Rc<str>,
}

impl StateSource {
    pub fn new(stream: Stream<State>, name: impl Into<Rc<str>>) -> Self {
        Self {
            stream: stream.dedup().remember(),
            name: name.into(),
        }
    }

    fn from_projection(projected: Stream<Option<State>>, name: Rc<str>) -> Self {
        Self::new(projected.filter_map(Option::clone), name)
    }

    pub fn stream(&self) -> Stream<State> {
        self.stream.clone()
    }

    /// Label of the store this projection derives from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A projection onto the slice `scope` addresses. Absent slices are not
    /// emitted.
    pub fn select(&self, scope: impl Into<Scope>) -> StateSource {
        let lens = scope.into().resolve();
        Self::from_projection(
            self.stream.map(move |state| lens.get(Some(state))),
            self.name.clone(),
        )
    }

    /// Decodes every value into `T`, skipping (and logging) values that do
    /// not fit.
    pub fn typed<T: DeserializeOwned + Clone + 'static>(&self) -> Stream<T> {
        let name = self.name.clone();
        self.stream
            .filter_map(move |state| match serde_json::from_value::<T>(state.clone()) {
                Ok(value) => Some(value),
                Err(err) => {
                    log::warn!(
                        "state `{name}`: cannot decode into {}: {err}",
                        std::any::type_name::<T>()
                    );
                    None
                }
            })
    }
}

impl SourceChannel for StateSource {
    fn isolate_source(&self, scope: &Scope) -> Option<Rc<dyn SourceChannel>> {
        Some(Rc::new(self.select(scope.clone())))
    }

    fn isolate_sink(&self, sink: SinkStream, scope: &Scope) -> SinkStream {
        match sink.downcast_ref::<Stream<Reducer>>() {
            Some(reducers) => Rc::new(lift_sink(reducers, scope)),
            None => {
                log::warn!(
                    "state `{}`: sink is not a reducer stream; left unscoped",
                    self.name
                );
                sink
            }
        }
    }
}

impl std::fmt::Debug for StateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSource")
            .field("name", &self.name)
            .field("current", &self.stream.current())
            .finish()
    }
}
