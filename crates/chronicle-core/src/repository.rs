//! Per-command unit of work over aggregates.
//!
//! The repository owns the live set of aggregates for the duration of
//! one command. Within that scope it is an identity map: repeated loads
//! of the same id return the same in-memory object, so mutations are
//! observable across loads. `commit` collects every uncommitted event in
//! insertion order, submits the batch to the event store together with
//! the originating command, and drains the map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::{AggregateId, AggregateRoot, Reconstitute};
use crate::command::Command;
use crate::error::RepositoryError;
use crate::event::DomainEvent;
use crate::store::EventStore;

/// Identity map and unit of work for one command scope.
pub struct AggregateRepository<E: DomainEvent> {
    event_store: Arc<dyn EventStore<Event = E>>,
    aggregates: HashMap<AggregateId, Box<dyn AggregateRoot<Event = E>>>,
    insertion_order: Vec<AggregateId>,
}

impl<E: DomainEvent> AggregateRepository<E> {
    /// Creates an empty repository bound to the given store.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore<Event = E>>) -> Self {
        Self {
            event_store,
            aggregates: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    /// Registers a freshly created aggregate in the identity map.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NonUniqueAggregateId`] when the map
    /// already holds an aggregate under the same id.
    pub fn add_aggregate(
        &mut self,
        aggregate: Box<dyn AggregateRoot<Event = E>>,
    ) -> Result<(), RepositoryError> {
        let id = aggregate.aggregate_id().clone();
        if self.aggregates.contains_key(&id) {
            return Err(RepositoryError::NonUniqueAggregateId(id));
        }
        self.aggregates.insert(id.clone(), aggregate);
        self.insertion_order.push(id);
        Ok(())
    }

    /// Returns the aggregate for `aggregate_id`, loading its history from
    /// the event store on first access within this command scope.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::AggregateNotFound`] when no events
    /// exist for the id, [`RepositoryError::TypeMismatch`] when the
    /// identity map holds the id under a different aggregate type, and
    /// rehydration or store errors otherwise.
    pub async fn load_aggregate<A>(
        &mut self,
        aggregate_id: &AggregateId,
    ) -> Result<&mut A, RepositoryError>
    where
        A: AggregateRoot<Event = E> + Reconstitute + 'static,
    {
        if !self.aggregates.contains_key(aggregate_id) {
            let events = self.event_store.load_events(aggregate_id).await?;
            if events.is_empty() {
                return Err(RepositoryError::AggregateNotFound(aggregate_id.clone()));
            }
            let aggregate = A::load_from_history(events)?;
            self.aggregates
                .insert(aggregate_id.clone(), Box::new(aggregate));
            self.insertion_order.push(aggregate_id.clone());
        }
        let Some(aggregate) = self.aggregates.get_mut(aggregate_id) else {
            return Err(RepositoryError::AggregateNotFound(aggregate_id.clone()));
        };
        aggregate
            .as_any_mut()
            .downcast_mut::<A>()
            .ok_or_else(|| RepositoryError::TypeMismatch {
                aggregate_id: aggregate_id.clone(),
            })
    }

    /// Verifies that the aggregate exists and has the expected type.
    ///
    /// # Errors
    ///
    /// Fails with the same errors as [`load_aggregate`](Self::load_aggregate).
    pub async fn ensure_exists<A>(
        &mut self,
        aggregate_id: &AggregateId,
    ) -> Result<(), RepositoryError>
    where
        A: AggregateRoot<Event = E> + Reconstitute + 'static,
    {
        self.load_aggregate::<A>(aggregate_id).await.map(|_| ())
    }

    /// Submits every uncommitted event, in aggregate insertion order,
    /// to the event store together with the originating command, then
    /// drains the identity map.
    ///
    /// # Errors
    ///
    /// Propagates store errors; the map is drained only after the store
    /// accepts the batch.
    pub async fn commit(&mut self, command: &dyn Command) -> Result<(), RepositoryError> {
        let mut events = Vec::new();
        for id in &self.insertion_order {
            if let Some(aggregate) = self.aggregates.get(id) {
                events.extend(aggregate.uncommitted_events().iter().cloned());
            }
        }
        tracing::debug!(
            command_type = command.command_type(),
            event_count = events.len(),
            "committing unit of work"
        );
        self.event_store.commit_events(command, events).await?;
        for aggregate in self.aggregates.values_mut() {
            aggregate.clear_events();
        }
        self.aggregates.clear();
        self.insertion_order.clear();
        Ok(())
    }

    /// Number of aggregates tracked in the current command scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    /// True when no aggregates are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Map;

    use crate::aggregate::{AggregateId, AggregateRoot, Reconstitute, Root};
    use crate::clock::Clock;
    use crate::command::Command;
    use crate::error::{AggregateError, EventStoreError, RepositoryError};
    use crate::event::{DomainEvent, EventMetadata};
    use crate::store::EventStore;

    use super::AggregateRepository;

    #[derive(Debug)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn fixed_clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    #[derive(Debug, Clone, PartialEq)]
    enum LedgerEvent {
        AccountOpened {
            metadata: EventMetadata,
            holder: String,
        },
        Deposited {
            metadata: EventMetadata,
            amount_cents: i64,
        },
    }

    impl DomainEvent for LedgerEvent {
        fn event_type(&self) -> &'static str {
            match self {
                Self::AccountOpened { .. } => "ledger.account_opened",
                Self::Deposited { .. } => "ledger.deposited",
            }
        }

        fn metadata(&self) -> &EventMetadata {
            match self {
                Self::AccountOpened { metadata, .. } | Self::Deposited { metadata, .. } => metadata,
            }
        }

        fn attributes(&self) -> Map<String, serde_json::Value> {
            let mut attributes = Map::new();
            match self {
                Self::AccountOpened { holder, .. } => {
                    attributes.insert("holder".to_owned(), holder.clone().into());
                }
                Self::Deposited { amount_cents, .. } => {
                    attributes.insert("amount_cents".to_owned(), (*amount_cents).into());
                }
            }
            attributes
        }
    }

    #[derive(Debug)]
    struct Account {
        root: Root<LedgerEvent>,
        balance_cents: i64,
    }

    impl Account {
        fn open(id: AggregateId, holder: &str, clock: &dyn Clock) -> Self {
            let mut account = Self::blank(id);
            let event = LedgerEvent::AccountOpened {
                metadata: account.root.next_metadata(clock),
                holder: holder.to_owned(),
            };
            account.apply(event).expect("open handles its own event");
            account
        }

        fn deposit(&mut self, amount_cents: i64, clock: &dyn Clock) {
            let event = LedgerEvent::Deposited {
                metadata: self.root.next_metadata(clock),
                amount_cents,
            };
            self.apply(event).expect("deposit handles its own event");
        }
    }

    impl AggregateRoot for Account {
        type Event = LedgerEvent;

        fn root(&self) -> &Root<LedgerEvent> {
            &self.root
        }

        fn root_mut(&mut self) -> &mut Root<LedgerEvent> {
            &mut self.root
        }

        fn handle(&mut self, event: &LedgerEvent) -> Result<(), AggregateError> {
            match event {
                LedgerEvent::AccountOpened { .. } => Ok(()),
                LedgerEvent::Deposited { amount_cents, .. } => {
                    self.balance_cents += amount_cents;
                    Ok(())
                }
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    impl Reconstitute for Account {
        fn blank(id: AggregateId) -> Self {
            Self {
                root: Root::new(id),
                balance_cents: 0,
            }
        }
    }

    /// A second aggregate type over the same event stream, for type
    /// checks on identity-map hits.
    #[derive(Debug)]
    struct BalanceSheet {
        root: Root<LedgerEvent>,
    }

    impl AggregateRoot for BalanceSheet {
        type Event = LedgerEvent;

        fn root(&self) -> &Root<LedgerEvent> {
            &self.root
        }

        fn root_mut(&mut self) -> &mut Root<LedgerEvent> {
            &mut self.root
        }

        fn handle(&mut self, _event: &LedgerEvent) -> Result<(), AggregateError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    impl Reconstitute for BalanceSheet {
        fn blank(id: AggregateId) -> Self {
            Self {
                root: Root::new(id),
            }
        }
    }

    #[derive(Debug)]
    struct Deposit;

    impl Command for Deposit {
        fn command_type(&self) -> &'static str {
            "ledger.deposit"
        }

        fn payload(&self) -> serde_json::Value {
            serde_json::json!({})
        }
    }

    #[derive(Debug, Default)]
    struct InMemoryStore {
        streams: Mutex<HashMap<AggregateId, Vec<LedgerEvent>>>,
        committed: Mutex<Vec<(String, Vec<LedgerEvent>)>>,
    }

    impl InMemoryStore {
        fn committed(&self) -> Vec<(String, Vec<LedgerEvent>)> {
            self.committed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventStore for InMemoryStore {
        type Event = LedgerEvent;

        async fn commit_events(
            &self,
            command: &dyn Command,
            events: Vec<LedgerEvent>,
        ) -> Result<(), EventStoreError> {
            let mut streams = self.streams.lock().unwrap();
            for event in &events {
                streams
                    .entry(event.metadata().aggregate_id.clone())
                    .or_default()
                    .push(event.clone());
            }
            self.committed
                .lock()
                .unwrap()
                .push((command.command_type().to_owned(), events));
            Ok(())
        }

        async fn load_events(
            &self,
            aggregate_id: &AggregateId,
        ) -> Result<Vec<LedgerEvent>, EventStoreError> {
            Ok(self
                .streams
                .lock()
                .unwrap()
                .get(aggregate_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn repository_with_store() -> (AggregateRepository<LedgerEvent>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::default());
        (AggregateRepository::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_repeated_loads_return_the_same_object() {
        let clock = fixed_clock();
        let (mut repository, store) = repository_with_store();
        let id = AggregateId::from("acc-1");
        let account = Account::open(id.clone(), "alice", &clock);
        store
            .commit_events(&Deposit, account.uncommitted_events().to_vec())
            .await
            .unwrap();

        let first = repository.load_aggregate::<Account>(&id).await.unwrap();
        first.deposit(1_000, &clock);

        let second = repository.load_aggregate::<Account>(&id).await.unwrap();
        assert_eq!(second.balance_cents, 1_000);
        assert_eq!(second.uncommitted_events().len(), 1);
    }

    #[tokio::test]
    async fn test_load_aggregate_rehydrates_from_the_store() {
        let clock = fixed_clock();
        let (mut repository, store) = repository_with_store();
        let id = AggregateId::from("acc-2");
        let mut account = Account::open(id.clone(), "bob", &clock);
        account.deposit(2_500, &clock);
        store
            .commit_events(&Deposit, account.uncommitted_events().to_vec())
            .await
            .unwrap();

        let loaded = repository.load_aggregate::<Account>(&id).await.unwrap();

        assert_eq!(loaded.balance_cents, 2_500);
        assert_eq!(loaded.sequence_number(), 3);
        assert!(loaded.uncommitted_events().is_empty());
    }

    #[tokio::test]
    async fn test_load_aggregate_fails_for_unknown_id() {
        let (mut repository, _store) = repository_with_store();
        let id = AggregateId::from("missing");

        let result = repository.load_aggregate::<Account>(&id).await;

        assert!(matches!(
            result,
            Err(RepositoryError::AggregateNotFound(not_found)) if not_found == id
        ));
    }

    #[tokio::test]
    async fn test_add_aggregate_rejects_duplicate_ids() {
        let clock = fixed_clock();
        let (mut repository, _store) = repository_with_store();
        let id = AggregateId::from("acc-3");

        repository
            .add_aggregate(Box::new(Account::open(id.clone(), "carol", &clock)))
            .unwrap();
        let result =
            repository.add_aggregate(Box::new(Account::open(id.clone(), "carol", &clock)));

        assert!(matches!(
            result,
            Err(RepositoryError::NonUniqueAggregateId(dup)) if dup == id
        ));
    }

    #[tokio::test]
    async fn test_load_aggregate_checks_the_registered_type() {
        let clock = fixed_clock();
        let (mut repository, _store) = repository_with_store();
        let id = AggregateId::from("acc-4");
        repository
            .add_aggregate(Box::new(Account::open(id.clone(), "dave", &clock)))
            .unwrap();

        let result = repository.load_aggregate::<BalanceSheet>(&id).await;

        assert!(matches!(
            result,
            Err(RepositoryError::TypeMismatch { aggregate_id }) if aggregate_id == id
        ));
    }

    #[tokio::test]
    async fn test_commit_submits_events_in_insertion_order_and_drains() {
        let clock = fixed_clock();
        let (mut repository, store) = repository_with_store();
        let first_id = AggregateId::from("acc-5");
        let second_id = AggregateId::from("acc-6");
        repository
            .add_aggregate(Box::new(Account::open(first_id.clone(), "erin", &clock)))
            .unwrap();
        repository
            .add_aggregate(Box::new(Account::open(second_id.clone(), "fred", &clock)))
            .unwrap();
        repository
            .load_aggregate::<Account>(&first_id)
            .await
            .unwrap()
            .deposit(700, &clock);

        repository.commit(&Deposit).await.unwrap();

        let committed = store.committed();
        assert_eq!(committed.len(), 1);
        let (command_type, events) = &committed[0];
        assert_eq!(command_type, "ledger.deposit");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].metadata().aggregate_id, first_id);
        assert_eq!(events[1].metadata().aggregate_id, first_id);
        assert_eq!(events[1].metadata().sequence_number, 2);
        assert_eq!(events[2].metadata().aggregate_id, second_id);
        assert!(repository.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_exists_loads_and_type_checks() {
        let clock = fixed_clock();
        let (mut repository, store) = repository_with_store();
        let id = AggregateId::from("acc-7");
        let account = Account::open(id.clone(), "gail", &clock);
        store
            .commit_events(&Deposit, account.uncommitted_events().to_vec())
            .await
            .unwrap();

        repository.ensure_exists::<Account>(&id).await.unwrap();
        let missing = repository
            .ensure_exists::<Account>(&AggregateId::from("nope"))
            .await;

        assert!(missing.is_err());
    }
}
