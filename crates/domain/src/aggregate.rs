//! Core aggregate and domain event traits.

use serde::{Serialize, de::DeserializeOwned};
use stock_store::Version;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name, used in logs.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates driven by commands and events.
///
/// Command methods inspect the current state and return the events they
/// would produce, or an error. `apply` folds an event into the state and
/// must not fail.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Identifier type of the aggregate.
    type Id: Copy + std::fmt::Display;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<Self::Id>;

    /// Returns the persisted version of the aggregate.
    fn version(&self) -> Version;

    /// Sets the aggregate version after a successful write.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence, logging each one.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            tracing::debug!(
                aggregate = Self::aggregate_type(),
                event = event.event_type(),
                "applying event"
            );
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Started { id: u32 },
        Bumped { by: i32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Started { .. } => "CounterStarted",
                CounterEvent::Bumped { .. } => "CounterBumped",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        id: Option<u32>,
        value: i32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("counter error")]
    struct CounterError;

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Error = CounterError;
        type Id = u32;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> Option<u32> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                CounterEvent::Started { id } => self.id = Some(id),
                CounterEvent::Bumped { by } => self.value += by,
            }
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let mut counter = Counter::default();
        counter.apply_events(vec![
            CounterEvent::Started { id: 7 },
            CounterEvent::Bumped { by: 2 },
            CounterEvent::Bumped { by: 3 },
        ]);

        assert_eq!(counter.id(), Some(7));
        assert_eq!(counter.value, 5);
        assert_eq!(CounterEvent::Bumped { by: 1 }.event_type(), "CounterBumped");
    }
}
