/// Guard for a live listener registration.
///
/// Dropping the guard runs its teardown exactly once; `unsubscribe` does the
/// same eagerly.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription(Option<Box<dyn FnOnce()>>);

impl Subscription {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(teardown)))
    }

    /// A guard with nothing to tear down.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Bundles several guards; they are dropped in order.
    pub fn all(subs: Vec<Subscription>) -> Self {
        Self::new(move || drop(subs))
    }

    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    /// Keeps the registration alive for the rest of the program.
    pub fn forget(mut self) {
        self.0 = None;
    }

    fn teardown(&mut self) {
        if let Some(f) = self.0.take() {
            f()
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.0.is_some())
            .finish()
    }
}
