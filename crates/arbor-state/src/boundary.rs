use std::rc::Rc;

use arbor_core::{Lens, Scope, State, Stream};

use crate::store::Reducer;

/// Lifts a child's reducers out of `scope`: each becomes an outer reducer
/// that only touches the slice the scope addresses.
///
/// A child reducer that hands back its input unchanged leaves the outer value
/// untouched; one that returns `None` removes exactly its own slice.
pub fn lift_sink(reducers: &Stream<Reducer>, scope: &Scope) -> Stream<Reducer> {
    let lens = scope.resolve();
    reducers.map(move |child: &Reducer| {
        let lens = lens.clone();
        let child = child.clone();
        let outer: Reducer = Rc::new(move |outer: Option<State>| {
            let prev = lens.get(outer.as_ref());
            let next = child(prev.clone());
            if next == prev {
                return outer;
            }
            lens.set(outer, next)
        });
        outer
    })
}
