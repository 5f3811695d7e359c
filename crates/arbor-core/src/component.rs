//! The component contract: a component is a function from [`Sources`] to
//! [`Sinks`], both keyed by channel name.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::scope::Scope;
use crate::stream::Stream;

/// A type-erased `Stream<T>` as stored in [`Sinks`].
pub type SinkStream = Rc<dyn Any>;

pub type BoxedComponent = Rc<dyn Fn(Sources) -> Sinks>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel `{0}` is not present")]
    Missing(String),
    #[error("channel `{name}` does not carry `{expected}`")]
    TypeMismatch { name: String, expected: &'static str },
}

/// An input channel. Channels that know how to scope themselves (and the
/// matching output channel) override the two isolate hooks; the defaults
/// leave both sides untouched.
pub trait SourceChannel: Any {
    /// This channel as seen from inside `scope`; `None` keeps it as is.
    fn isolate_source(&self, _scope: &Scope) -> Option<Rc<dyn SourceChannel>> {
        None
    }

    /// Lifts the component's output on the same channel back out of `scope`.
    fn isolate_sink(&self, sink: SinkStream, _scope: &Scope) -> SinkStream {
        sink
    }
}

#[derive(Clone, Default)]
pub struct Sources {
    channels: HashMap<String, Rc<dyn SourceChannel>>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, channel: impl SourceChannel) -> Self {
        self.insert(name, channel);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, channel: impl SourceChannel) {
        self.channels.insert(name.into(), Rc::new(channel));
    }

    pub fn insert_shared(&mut self, name: impl Into<String>, channel: Rc<dyn SourceChannel>) {
        self.channels.insert(name.into(), channel);
    }

    pub fn channel(&self, name: &str) -> Option<&Rc<dyn SourceChannel>> {
        self.channels.get(name)
    }

    pub fn try_get<S: SourceChannel + Clone>(&self, name: &str) -> Result<S, ChannelError> {
        let channel = self
            .channels
            .get(name)
            .ok_or_else(|| ChannelError::Missing(name.to_owned()))?;
        let any: &dyn Any = &**channel;
        any.downcast_ref::<S>()
            .cloned()
            .ok_or_else(|| ChannelError::TypeMismatch {
                name: name.to_owned(),
                expected: type_name::<S>(),
            })
    }

    pub fn get<S: SourceChannel + Clone>(&self, name: &str) -> Option<S> {
        self.try_get(name).ok()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Rc<dyn SourceChannel>)> {
        self.channels.iter()
    }
}

/// Output channels of a component, plus anything that must live as long as
/// they do.
#[derive(Default)]
pub struct Sinks {
    channels: HashMap<String, SinkStream>,
    retained: Vec<Box<dyn Any>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Clone + 'static>(mut self, name: impl Into<String>, stream: Stream<T>) -> Self {
        self.insert(name, stream);
        self
    }

    pub fn insert<T: Clone + 'static>(&mut self, name: impl Into<String>, stream: Stream<T>) {
        self.channels.insert(name.into(), Rc::new(stream));
    }

    pub fn insert_erased(&mut self, name: impl Into<String>, stream: SinkStream) {
        self.channels.insert(name.into(), stream);
    }

    pub fn try_get<T: Clone + 'static>(&self, name: &str) -> Result<Stream<T>, ChannelError> {
        let erased = self
            .channels
            .get(name)
            .ok_or_else(|| ChannelError::Missing(name.to_owned()))?;
        erased
            .downcast_ref::<Stream<T>>()
            .cloned()
            .ok_or_else(|| ChannelError::TypeMismatch {
                name: name.to_owned(),
                expected: type_name::<Stream<T>>(),
            })
    }

    pub fn get<T: Clone + 'static>(&self, name: &str) -> Option<Stream<T>> {
        self.try_get(name).ok()
    }

    /// Removes the channel if it carries `Stream<T>`.
    pub fn take<T: Clone + 'static>(&mut self, name: &str) -> Option<Stream<T>> {
        let stream = self.get::<T>(name)?;
        self.channels.remove(name);
        Some(stream)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Keeps `resource` alive for as long as these sinks exist.
    pub fn retain(&mut self, resource: impl Any) {
        self.retained.push(Box::new(resource));
    }

    pub(crate) fn into_parts(self) -> (HashMap<String, SinkStream>, Vec<Box<dyn Any>>) {
        (self.channels, self.retained)
    }

    pub(crate) fn from_parts(
        channels: HashMap<String, SinkStream>,
        retained: Vec<Box<dyn Any>>,
    ) -> Self {
        Self { channels, retained }
    }
}

impl std::fmt::Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Sinks")
            .field("channels", &names)
            .field("retained", &self.retained.len())
            .finish()
    }
}
