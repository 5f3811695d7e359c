//! # Streams, Lenses, and Components
//!
//! Arbor components are plain functions from [`Sources`] to [`Sinks`]. Both
//! are maps from channel name to a channel: sources are inputs that may know
//! how to scope themselves, sinks are [`Stream`]s of whatever the component
//! produces.
//!
//! ## Streams
//!
//! [`Stream<T>`] is a cloneable handle to a lazy, single-threaded push stream:
//!
//! ```rust
//! use arbor_core::*;
//!
//! let (tx, clicks) = Stream::<u32>::source();
//! let total = clicks.fold(0, |acc, n| acc + n);
//!
//! let sub = total.subscribe(|n| log::info!("total = {n}"));
//! tx.emit(2);
//! tx.emit(3);
//! assert_eq!(total.current(), Some(5));
//! drop(sub);
//! ```
//!
//! Dropping the [`Subscription`] detaches the listener; a derived stream with
//! no listeners detaches from its own upstream in turn.
//!
//! ## Lenses and scopes
//!
//! State is a [`State`] (a `serde_json::Value`). A [`Lens`] reads a slice of
//! it and writes an updated slice back into a copy. A [`Scope`] names a slice
//! by field, by index, or by an explicit lens:
//!
//! ```rust
//! use arbor_core::*;
//! use serde_json::json;
//!
//! let lens = Scope::from("count").resolve();
//! let next = lens.set(Some(json!({"count": 1})), Some(json!(2)));
//! assert_eq!(lens.get(next.as_ref()), Some(json!(2)));
//! ```
//!
//! ## Isolation
//!
//! [`isolate`] runs a component with each channel narrowed according to a
//! [`ScopeMap`], then lifts its outputs back out through the channel that
//! narrowed them.

pub mod component;
pub mod isolate;
pub mod lens;
pub mod scope;
pub mod stream;
pub mod subscription;

pub use component::*;
pub use isolate::*;
pub use lens::*;
pub use scope::*;
pub use stream::{Emitter, ListenerKey, Stream, combine, merge};
pub use subscription::*;
