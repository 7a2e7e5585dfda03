//! Process-wide wiring for the command path.
//!
//! A [`Configuration`] is an explicit context object handed to whatever
//! drives commands (a bus, a CLI, a test). It snapshots cheaply and
//! republishes atomically: readers observe either the old wiring or the
//! new wiring in full, never a torn view.

use std::sync::{Arc, PoisonError, RwLock};

use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::event::DomainEvent;
use crate::repository::AggregateRepository;
use crate::store::EventStore;

/// The wiring a configuration publishes: the event store (which carries
/// its registered handler set) and the clock.
pub struct ConfigurationSettings<E: DomainEvent> {
    /// The durable event store, with handlers baked in.
    pub event_store: Arc<dyn EventStore<Event = E>>,
    /// Time source for event metadata.
    pub clock: Arc<dyn Clock>,
}

impl<E: DomainEvent> ConfigurationSettings<E> {
    /// Creates settings with the system clock.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore<Event = E>>) -> Self {
        Self {
            event_store,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Shared, atomically republishable wiring for one application process.
pub struct Configuration<E: DomainEvent> {
    inner: Arc<RwLock<Arc<ConfigurationSettings<E>>>>,
}

impl<E: DomainEvent> Clone for Configuration<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: DomainEvent> Configuration<E> {
    /// Publishes the initial wiring.
    #[must_use]
    pub fn new(settings: ConfigurationSettings<E>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    fn snapshot(&self) -> Arc<ConfigurationSettings<E>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the currently published event store.
    #[must_use]
    pub fn event_store(&self) -> Arc<dyn EventStore<Event = E>> {
        self.snapshot().event_store.clone()
    }

    /// Returns the currently published clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.snapshot().clock.clone()
    }

    /// Creates a fresh repository for one command scope, bound to the
    /// currently published store.
    #[must_use]
    pub fn repository(&self) -> AggregateRepository<E> {
        AggregateRepository::new(self.event_store())
    }

    /// Atomically replaces the published wiring. In-flight readers keep
    /// the snapshot they already took.
    pub fn reconfigure(&self, settings: ConfigurationSettings<E>) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(settings);
    }
}

/// Installs the default logger: JSON-formatted `tracing` output filtered
/// by `RUST_LOG`, falling back to `info`. Later calls are no-ops once a
/// global subscriber is set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}
