use std::cell::{Cell, RefCell};
use std::rc::Rc;

use arbor_core::{Emitter, ScopeMap, Sinks, Sources, State, Stream, Subscription, isolate, merge};
use serde_json::json;

use crate::*;

fn collect<T: Clone + 'static>(stream: &Stream<T>) -> (Rc<RefCell<Vec<T>>>, Subscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sub = stream.subscribe({
        let seen = seen.clone();
        move |v: &T| seen.borrow_mut().push(v.clone())
    });
    (seen, sub)
}

fn mount(collection: impl Fn(Sources) -> Sinks, states: Stream<State>) -> Sinks {
    collection(Sources::new().with(DEFAULT_CHANNEL, StateSource::new(states, "test")))
}

fn by_k(item: &State, _: usize) -> String {
    item["k"].as_str().unwrap_or_default().to_owned()
}

type Registry = Rc<RefCell<Vec<(Emitter<String>, Stream<String>)>>>;

/// Items that each own a hand-driven `out` channel, registered in creation
/// order.
fn driven_item(registry: Registry) -> impl Fn(Sources) -> Sinks + 'static {
    move |_sources: Sources| {
        let (tx, out) = Stream::<String>::source();
        registry.borrow_mut().push((tx, out.clone()));
        Sinks::new().with("out", out)
    }
}

#[test]
fn instances_keep_identity_across_reorder_and_insert() {
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(|_| Sinks::new(), |i: Instances| Sinks::new().with("tables", i.tables()))
            .item_key(by_k)
            .build(),
        states,
    );
    let tables = sinks.get::<InstanceTable>("tables").expect("tables");
    let (seen, _sub) = collect(&tables);

    tx.emit(json!([{"k": "a"}, {"k": "b"}]));
    tx.emit(json!([{"k": "b"}, {"k": "a"}, {"k": "c"}]));

    let seen = seen.borrow();
    let (before, after) = (&seen[1], &seen[2]);
    assert_eq!(after.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    for key in ["a", "b"] {
        let same = before
            .get(key)
            .zip(after.get(key))
            .is_some_and(|(x, y)| x.same(y));
        assert!(same, "`{key}` was re-created");
    }
    assert!(before.get("c").is_none());
    assert!(after.get("c").is_some());
}

#[test]
fn duplicate_keys_share_one_instance() {
    let registry: Registry = Rc::default();
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(driven_item(registry.clone()), |i: Instances| {
            Sinks::new().with("tables", i.tables())
        })
        .item_key(by_k)
        .build(),
        states,
    );
    let tables = sinks.get::<InstanceTable>("tables").expect("tables");
    let _sub = tables.subscribe(|_| {});

    tx.emit(json!([{"k": "a"}, {"k": "a", "n": 2}]));
    let table = tables.current().expect("a table");
    assert_eq!(table.len(), 2);
    assert_eq!(table.live(), 1);
    assert_eq!(registry.borrow().len(), 1);
}

#[test]
fn removed_instance_drops_values_still_in_flight() {
    let (tick_tx, tick) = Stream::<()>::source();
    let built = Rc::new(Cell::new(0));
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(
            {
                let built = built.clone();
                let tick = tick.clone();
                move |_sources: Sources| {
                    let n = built.get();
                    built.set(n + 1);
                    Sinks::new().with("out", tick.map(move |_| format!("item{n}")))
                }
            },
            |i: Instances| Sinks::new().with("out", i.pick_merge::<String>("out")),
        )
        .build(),
        states,
    );
    let merged = sinks.get::<String>("out").expect("out");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let _sub = merged.subscribe({
        let seen = seen.clone();
        let tx = tx.clone();
        move |v: &String| {
            seen.borrow_mut().push(v.clone());
            // The first item's value removes the second item mid-dispatch.
            if v == "item0" {
                tx.emit(json!(["a"]));
            }
        }
    });

    tx.emit(json!(["a", "b"]));
    assert_eq!(tick.listener_count(), 2);

    tick_tx.emit(());
    assert_eq!(*seen.borrow(), vec!["item0"]);
    assert_eq!(tick.listener_count(), 1);

    tick_tx.emit(());
    assert_eq!(*seen.borrow(), vec!["item0", "item0"]);
    assert_eq!(built.get(), 2);
}

#[test]
fn pick_merge_follows_additions_and_removals() {
    let registry: Registry = Rc::default();
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(driven_item(registry.clone()), |i: Instances| {
            Sinks::new().with("out", i.pick_merge::<String>("out"))
        })
        .item_key(by_k)
        .build(),
        states,
    );
    let (seen, _sub) = collect(&sinks.get::<String>("out").expect("out"));

    tx.emit(json!([{"k": "a"}]));
    tx.emit(json!([{"k": "a"}, {"k": "b"}]));
    let (a, b) = {
        let registry = registry.borrow();
        (registry[0].clone(), registry[1].clone())
    };
    a.0.emit("a1".into());
    b.0.emit("b1".into());

    tx.emit(json!([{"k": "b"}]));
    a.0.emit("a2".into());
    b.0.emit("b2".into());

    assert_eq!(*seen.borrow(), vec!["a1", "b1", "b2"]);
    assert!(!a.0.has_listeners());
    assert_eq!(b.1.listener_count(), 1);
}

#[test]
fn pick_combine_waits_for_everyone_then_follows_table_order() {
    let registry: Registry = Rc::default();
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(driven_item(registry.clone()), |i: Instances| {
            Sinks::new().with("all", i.pick_combine::<String>("out"))
        })
        .item_key(by_k)
        .build(),
        states,
    );
    let (seen, _sub) = collect(&sinks.get::<Vec<String>>("all").expect("all"));
    // Nothing has been received yet, so there are no instances.
    assert_eq!(*seen.borrow(), vec![Vec::<String>::new()]);
    seen.borrow_mut().clear();

    tx.emit(json!([{"k": "a"}, {"k": "b"}]));
    let (a, b) = {
        let registry = registry.borrow();
        (registry[0].0.clone(), registry[1].0.clone())
    };
    a.emit("a1".into());
    assert!(seen.borrow().is_empty());

    b.emit("b1".into());
    tx.emit(json!([{"k": "b"}, {"k": "a"}]));
    a.emit("a2".into());
    tx.emit(json!([{"k": "a"}]));
    tx.emit(json!([]));

    let expected: Vec<Vec<&str>> = vec![
        vec!["a1", "b1"],
        vec!["b1", "a1"],
        vec!["b1", "a2"],
        vec!["a2"],
        vec![],
    ];
    assert_eq!(*seen.borrow(), expected);
    assert!(!b.has_listeners());
}

#[test]
fn pick_combine_waits_for_an_instance_without_the_channel() {
    let registry: Registry = Rc::default();
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(
            {
                let driven = driven_item(registry.clone());
                let built = Cell::new(0);
                // The second item built ("b") has no `out` channel.
                move |sources: Sources| {
                    let n = built.get();
                    built.set(n + 1);
                    if n == 1 { Sinks::new() } else { driven(sources) }
                }
            },
            |i: Instances| Sinks::new().with("all", i.pick_combine::<String>("out")),
        )
        .item_key(by_k)
        .build(),
        states,
    );
    let (seen, _sub) = collect(&sinks.get::<Vec<String>>("all").expect("all"));
    seen.borrow_mut().clear();

    tx.emit(json!([{"k": "a"}, {"k": "b"}]));
    assert_eq!(registry.borrow().len(), 1);
    let a = registry.borrow()[0].0.clone();
    a.emit("a1".into());
    assert!(seen.borrow().is_empty());

    tx.emit(json!([{"k": "a"}]));
    assert_eq!(*seen.borrow(), vec![vec!["a1".to_owned()]]);
}

#[test]
fn pick_combine_waits_for_a_newcomer() {
    let registry: Registry = Rc::default();
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(driven_item(registry.clone()), |i: Instances| {
            Sinks::new().with("all", i.pick_combine::<String>("out"))
        })
        .item_key(by_k)
        .build(),
        states,
    );
    let (seen, _sub) = collect(&sinks.get::<Vec<String>>("all").expect("all"));
    tx.emit(json!([{"k": "a"}]));
    let a = registry.borrow()[0].0.clone();
    a.emit("a1".into());

    tx.emit(json!([{"k": "a"}, {"k": "b"}]));
    let b = registry.borrow()[1].0.clone();
    assert_eq!(seen.borrow().len(), 2);
    b.emit("b1".into());
    assert_eq!(seen.borrow().last(), Some(&vec!["a1".to_owned(), "b1".to_owned()]));
}

#[test]
fn switching_between_array_and_scalar_leaks_nothing() {
    let registry: Registry = Rc::default();
    let (tx, states) = Stream::<State>::source();
    let sinks = mount(
        Collection::new(driven_item(registry.clone()), |i: Instances| {
            Sinks::new()
                .with("tables", i.tables())
                .with("out", i.pick_merge::<String>("out"))
        })
        .build(),
        states,
    );
    let (_seen, _sub) = collect(&sinks.get::<String>("out").expect("out"));
    let tables = sinks.get::<InstanceTable>("tables").expect("tables");
    let live = |registry: &Registry| -> Vec<usize> {
        registry.borrow().iter().map(|(_, out)| out.listener_count()).collect()
    };

    tx.emit(json!(["a", "b", "c"]));
    assert_eq!(tables.current().map(|t| t.len()), Some(3));
    assert_eq!(live(&registry), vec![1, 1, 1]);

    tx.emit(json!({"single": true}));
    let table = tables.current().expect("a table");
    assert_eq!((table.len(), table.mode()), (1, CollectionMode::Scalar));
    assert_eq!(live(&registry), vec![0, 0, 0, 1]);

    tx.emit(json!(["p", "q"]));
    let table = tables.current().expect("a table");
    assert_eq!((table.len(), table.mode()), (2, CollectionMode::Array));
    assert_eq!(live(&registry), vec![0, 0, 0, 0, 1, 1]);
}

/// A keyed todo list: every item toggles or removes itself, and the whole
/// list lives under `items` of the root state.
fn todo_app(registry: Rc<RefCell<Vec<Emitter<&'static str>>>>) -> impl Fn(Sources) -> Sinks {
    move |sources: Sources| {
        let init = Stream::once(reducer(|prev| {
            prev.or_else(|| {
                Some(json!({"items": [
                    {"id": "a", "done": false},
                    {"id": "b", "done": false},
                ]}))
            })
        }));

        let registry = registry.clone();
        let item = move |_sources: Sources| {
            let (tx, actions) = Stream::<&'static str>::source();
            registry.borrow_mut().push(tx);
            let reducers = actions.map(|action: &&'static str| -> Reducer {
                match *action {
                    "toggle" => reducer(|prev: Option<State>| {
                        let mut todo = prev?;
                        let done = todo["done"].as_bool().unwrap_or(false);
                        todo["done"] = json!(!done);
                        Some(todo)
                    }),
                    _ => reducer(|_| None),
                }
            });
            Sinks::new().with(DEFAULT_CHANNEL, reducers)
        };
        let list = Collection::new(item, |i: Instances| {
            Sinks::new().with(DEFAULT_CHANNEL, i.pick_merge::<Reducer>(DEFAULT_CHANNEL))
        })
        .item_key(|todo, _| todo["id"].as_str().unwrap_or_default().to_owned())
        .build();
        let mut list_sinks = isolate(list, ScopeMap::new().with(DEFAULT_CHANNEL, "items"))(sources.clone());

        let view = sources
            .get::<StateSource>(DEFAULT_CHANNEL)
            .map(|state| state.stream())
            .unwrap_or_else(Stream::never);
        let list_reducers = list_sinks
            .take::<Reducer>(DEFAULT_CHANNEL)
            .unwrap_or_else(Stream::never);
        Sinks::new()
            .with(DEFAULT_CHANNEL, merge(vec![init, list_reducers]))
            .with("view", view)
    }
}

#[test]
fn with_state_routes_item_reducers_back_to_the_root() {
    let registry = Rc::new(RefCell::new(Vec::new()));
    let app = with_state(todo_app(registry.clone()), DEFAULT_CHANNEL);
    let sinks = app(Sources::new());
    assert!(!sinks.contains(DEFAULT_CHANNEL));

    let (view, _sub) = collect(&sinks.get::<State>("view").expect("view"));
    assert_eq!(
        view.borrow().last(),
        Some(&json!({"items": [{"id": "a", "done": false}, {"id": "b", "done": false}]}))
    );
    assert_eq!(registry.borrow().len(), 2);

    let (a, b) = {
        let registry = registry.borrow();
        (registry[0].clone(), registry[1].clone())
    };
    a.emit("toggle");
    assert_eq!(
        view.borrow().last(),
        Some(&json!({"items": [{"id": "a", "done": true}, {"id": "b", "done": false}]}))
    );

    b.emit("remove");
    assert_eq!(
        view.borrow().last(),
        Some(&json!({"items": [{"id": "a", "done": true}]}))
    );
    assert!(!b.has_listeners());
    assert!(a.has_listeners());
    // Nothing was rebuilt along the way.
    assert_eq!(registry.borrow().len(), 2);
}

#[test]
fn with_state_without_reducers_still_serves_state() {
    let app = with_state(
        |sources: Sources| {
            let state = sources.get::<StateSource>("model").expect("model channel");
            Sinks::new().with("view", state.stream())
        },
        "model",
    );
    let sinks = app(Sources::new());
    let (view, _sub) = collect(&sinks.get::<State>("view").expect("view"));
    assert!(view.borrow().is_empty());
}

#[test]
fn to_state_encodes_serde_values() {
    #[derive(serde::Serialize)]
    struct Todo<'a> {
        id: &'a str,
        done: bool,
    }
    let state = to_state(&Todo { id: "a", done: true }).expect("encodes");
    assert_eq!(state, json!({"id": "a", "done": true}));

    let mut bad = std::collections::HashMap::new();
    bad.insert(vec![1u8], 1);
    assert!(matches!(to_state(&bad), Err(StateError::Encode(_))));
}
