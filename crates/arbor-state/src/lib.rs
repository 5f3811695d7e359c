//! # Scoped State and Keyed Collections
//!
//! One application state, many components each seeing only its own slice.
//!
//! [`with_state`] mounts a [`StateStore`] under a channel (by default
//! [`DEFAULT_CHANNEL`]). The wrapped component reads the state through a
//! [`StateSource`] and writes it by emitting [`Reducer`]s on the sink of the
//! same name:
//!
//! ```rust
//! use arbor_core::*;
//! use arbor_state::*;
//! use serde_json::json;
//!
//! fn counter(sources: Sources) -> Sinks {
//!     let init = Stream::once(reducer(|prev| prev.or(Some(json!({"count": 0})))));
//!     let _state = sources.get::<StateSource>(DEFAULT_CHANNEL);
//!     Sinks::new().with(DEFAULT_CHANNEL, init)
//! }
//!
//! let app = with_state(counter, DEFAULT_CHANNEL);
//! let _sinks = app(Sources::new());
//! ```
//!
//! ## Isolation
//!
//! Isolating a child under a [`Scope`](arbor_core::Scope) narrows its
//! `StateSource` with [`StateSource::select`] and lifts its reducers back out
//! with [`lift_sink`], so the child reads and writes its slice as if it were
//! the whole state.
//!
//! ## Collections
//!
//! A [`Collection`] turns an array state into one running item per element,
//! keyed by [`Collection::item_key`] so items keep their identity when the
//! array is reordered. The collection's own outputs come from
//! [`Instances::pick_merge`] and [`Instances::pick_combine`], which follow the
//! live set of items as it grows and shrinks.

use arbor_core::{Sinks, Sources, State, Stream};
use serde::Serialize;

pub mod boundary;
pub mod collection;
pub mod instance_lens;
pub mod instances;
pub mod source;
pub mod store;

pub use boundary::*;
pub use collection::*;
pub use instance_lens::*;
pub use instances::*;
pub use source::*;
pub use store::*;

#[cfg(test)]
mod tests;

/// Conventional mount point of the state channel.
pub const DEFAULT_CHANNEL: &str = "state";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("value cannot be represented as state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn to_state<T: Serialize + ?Sized>(value: &T) -> Result<State, StateError> {
    Ok(serde_json::to_value(value)?)
}

/// Runs `main` against a fresh store mounted under `channel`.
///
/// `main` sees the store as a [`StateSource`] and its `channel` sink, a
/// stream of [`Reducer`]s, feeds the store. That sink is consumed; the
/// returned sinks keep the store alive.
pub fn with_state<C>(main: C, channel: impl Into<String>) -> impl Fn(Sources) -> Sinks + 'static
where
    C: Fn(Sources) -> Sinks + 'static,
{
    let channel: String = channel.into();
    move |mut sources: Sources| {
        let reducers = Stream::<Reducer>::proxy();
        let store = StateStore::new(channel.as_str(), &reducers);
        sources.insert(channel.clone(), store.source());

        let mut sinks = main(sources);
        match sinks.take::<Reducer>(&channel) {
            Some(out) => reducers.imitate(&out),
            None => log::debug!("with_state: component emits no `{channel}` reducers"),
        }
        sinks.retain(store);
        sinks
    }
}
