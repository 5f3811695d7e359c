use std::collections::HashMap;
use std::rc::Rc;

use crate::component::{Sinks, Sources};
use crate::scope::ScopeMap;

/// Runs `component` with every channel narrowed to its scope in `scopes`,
/// then lifts each output channel back out through the source channel of the
/// same name. Channels without a scope, or without a matching source, pass
/// through untouched.
pub fn isolate<C>(component: C, scopes: ScopeMap) -> impl Fn(Sources) -> Sinks + 'static
where
    C: Fn(Sources) -> Sinks + 'static,
{
    move |sources: Sources| {
        let mut inner_sources = Sources::new();
        for (name, channel) in sources.iter() {
            let narrowed = scopes
                .scope_for(name)
                .and_then(|scope| channel.isolate_source(scope));
            inner_sources.insert_shared(name.clone(), narrowed.unwrap_or_else(|| channel.clone()));
        }

        let (channels, retained) = component(inner_sources).into_parts();
        let lifted: HashMap<_, _> = channels
            .into_iter()
            .map(|(name, sink)| {
                let lifted = match (scopes.scope_for(&name), sources.channel(&name)) {
                    (Some(scope), Some(channel)) => channel.isolate_sink(sink, scope),
                    _ => sink,
                };
                (name, lifted)
            })
            .collect();
        Sinks::from_parts(lifted, retained)
    }
}

/// Like [`isolate`], for an already shared component.
pub fn isolate_shared(
    component: Rc<dyn Fn(Sources) -> Sinks>,
    scopes: ScopeMap,
) -> impl Fn(Sources) -> Sinks + 'static {
    isolate(move |sources| component(sources), scopes)
}
