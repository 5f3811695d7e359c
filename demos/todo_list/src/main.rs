use std::rc::Rc;

use anyhow::Context;
use arbor_core::*;
use arbor_state::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Todo {
    id: u64,
    title: String,
    done: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Model {
    items: Vec<Todo>,
    next_id: u64,
}

#[derive(Clone, Debug)]
enum Action {
    Add(String),
    Toggle,
    Remove,
}

/// A user intent, addressed to one todo by id or to the whole app.
#[derive(Clone, Debug)]
struct Command {
    target: String,
    action: Action,
}

/// Command input. Scoping it to a todo's key keeps only that todo's commands.
#[derive(Clone)]
struct Commands(Stream<Command>);

impl SourceChannel for Commands {
    fn isolate_source(&self, scope: &Scope) -> Option<Rc<dyn SourceChannel>> {
        let target = scope.label()?;
        Some(Rc::new(Commands(
            self.0.filter(move |command| command.target == target),
        )))
    }
}

fn commands_of(sources: &Sources) -> Stream<Command> {
    sources
        .get::<Commands>("commands")
        .map(|Commands(stream)| stream)
        .unwrap_or_else(Stream::never)
}

fn toggle(prev: Option<State>) -> Option<State> {
    let mut todo = prev?;
    let done = todo.get("done").and_then(|done| done.as_bool());
    if let (Some(done), Some(fields)) = (done, todo.as_object_mut()) {
        fields.insert("done".into(), (!done).into());
    }
    Some(todo)
}

fn todo_item(sources: Sources) -> Sinks {
    let Some(state) = sources.get::<StateSource>(DEFAULT_CHANNEL) else {
        log::warn!("todo item mounted without state");
        return Sinks::new();
    };
    let reducers = commands_of(&sources).filter_map(|command: &Command| match command.action {
        Action::Toggle => Some(reducer(toggle)),
        Action::Remove => Some(reducer(|_| None)),
        Action::Add(_) => None,
    });
    let label = state.typed::<Todo>().map(|todo: &Todo| {
        let mark = if todo.done { "x" } else { " " };
        format!("[{mark}] #{} {}", todo.id, todo.title)
    });
    Sinks::new()
        .with(DEFAULT_CHANNEL, reducers)
        .with("label", label)
}

fn add(title: String) -> Reducer {
    reducer(move |prev| {
        let decoded = prev
            .clone()
            .and_then(|state| serde_json::from_value::<Model>(state).ok());
        let Some(mut model) = decoded else {
            return prev;
        };
        model.items.push(Todo {
            id: model.next_id,
            title: title.clone(),
            done: false,
        });
        model.next_id += 1;
        match to_state(&model) {
            Ok(next) => Some(next),
            Err(err) => {
                log::warn!("add: {err}");
                prev
            }
        }
    })
}

fn todo_app(initial: State) -> impl Fn(Sources) -> Sinks {
    move |sources: Sources| {
        let initial = initial.clone();
        let init = Stream::once(reducer(move |prev| prev.or_else(|| Some(initial.clone()))));
        let adds = commands_of(&sources)
            .filter(|command| command.target == "app")
            .filter_map(|command: &Command| match &command.action {
                Action::Add(title) => Some(add(title.clone())),
                _ => None,
            });

        let list = Collection::new(todo_item, |items: Instances| {
            Sinks::new()
                .with(DEFAULT_CHANNEL, items.pick_merge::<Reducer>(DEFAULT_CHANNEL))
                .with("lines", items.pick_combine::<String>("label"))
        })
        .item_key(|todo, _| todo["id"].to_string())
        .item_scope(|key: &str| key.to_owned())
        .build();
        let mut list_sinks =
            isolate(list, ScopeMap::new().with(DEFAULT_CHANNEL, "items"))(sources.clone());

        let edits = list_sinks
            .take::<Reducer>(DEFAULT_CHANNEL)
            .unwrap_or_else(Stream::never);
        let lines = list_sinks
            .take::<Vec<String>>("lines")
            .unwrap_or_else(Stream::never);
        Sinks::new()
            .with(DEFAULT_CHANNEL, merge(vec![init, adds, edits]))
            .with("lines", lines)
    }
}

fn script() -> Vec<Command> {
    let to = |target: &str, action| Command {
        target: target.to_owned(),
        action,
    };
    vec![
        to("app", Action::Add("write the changelog".into())),
        to("1", Action::Toggle),
        to("app", Action::Add("tag the release".into())),
        to("0", Action::Remove),
        to("2", Action::Toggle),
        to("1", Action::Toggle),
    ]
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let initial = to_state(&Model {
        items: vec![
            Todo {
                id: 0,
                title: "review open issues".into(),
                done: false,
            },
            Todo {
                id: 1,
                title: "update dependencies".into(),
                done: false,
            },
        ],
        next_id: 2,
    })?;

    let (commands, command_stream) = Stream::<Command>::source();
    let app = with_state(todo_app(initial), DEFAULT_CHANNEL);
    let sinks = app(Sources::new().with("commands", Commands(command_stream)));

    let lines = sinks
        .get::<Vec<String>>("lines")
        .context("the app has no `lines` output")?;
    let _render = lines.subscribe(|lines: &Vec<String>| {
        println!("--");
        for line in lines {
            println!("{line}");
        }
    });

    for command in script() {
        log::info!("{} <- {:?}", command.target, command.action);
        commands.emit(command);
    }
    Ok(())
}
