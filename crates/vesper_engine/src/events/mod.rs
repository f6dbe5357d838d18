//! Event system
//! Key principles:
//! - Addressed events: subscribers register for one address and are only
//!   notified for it
//! - Handler returns [`Handling`] ([`Handling::Resolve`] stops forwarding)
//! - Queuing support (immediate + tick-deferred delivery)
//! - Subscriptions carry an owner so they can be dropped with the facet or
//!   entity that created them
//!
//! The system only stores subscriptions and queued events; the world drives
//! delivery so callbacks can mutate it.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ecs::entity::EntityId;
use crate::ecs::property::{PropertyId, PropertyValue};
use crate::ecs::world::World;

/// Where an event is published
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventAddress {
    /// A property of an entity changed
    Change {
        /// Changed property
        property: PropertyId,
        /// Entity owning the property
        entity: EntityId,
    },
    /// Named event targeted at one entity (e.g. a button click)
    Entity {
        /// Event name
        name: String,
        /// Target entity
        entity: EntityId,
    },
    /// Published once per tick before facet updates
    Update,
    /// Published once per tick after facet post-updates
    PostUpdate,
    /// Named engine-wide event (e.g. input)
    Global(String),
}

impl EventAddress {
    /// Named event targeted at `entity`
    pub fn entity(name: impl Into<String>, entity: EntityId) -> Self {
        Self::Entity {
            name: name.into(),
            entity,
        }
    }

    /// Named engine-wide event
    pub fn global(name: impl Into<String>) -> Self {
        Self::Global(name.into())
    }

    /// Entity the address targets, if any
    pub fn target(&self) -> Option<EntityId> {
        match self {
            Self::Change { entity, .. } | Self::Entity { entity, .. } => Some(*entity),
            Self::Update | Self::PostUpdate | Self::Global(_) => None,
        }
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// No payload
    None,
    /// Property change
    Change {
        /// Value before the write (absent for newly created slots)
        previous: Option<PropertyValue>,
        /// Value after the write
        value: PropertyValue,
    },
    /// Arbitrary value
    Value(PropertyValue),
}

/// A published event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Address published to
    pub address: EventAddress,
    /// Simulation tick at publication
    pub tick: u64,
    /// Publishing entity, if any
    pub publisher: Option<EntityId>,
    /// Payload
    pub data: EventData,
}

impl Event {
    /// Create an event without publisher or payload
    pub fn new(address: EventAddress) -> Self {
        Self {
            address,
            tick: 0,
            publisher: None,
            data: EventData::None,
        }
    }

    /// Set the publisher (builder pattern)
    pub fn with_publisher(mut self, publisher: EntityId) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the payload (builder pattern)
    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }

    /// Value carried by a change or value payload
    pub fn value(&self) -> Option<&PropertyValue> {
        match &self.data {
            EventData::Change { value, .. } | EventData::Value(value) => Some(value),
            EventData::None => None,
        }
    }
}

/// Whether an event keeps propagating to later subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Continue to the next subscriber
    Cascade,
    /// Stop forwarding
    Resolve,
}

/// Subscriber callback; receives the world so it can react
pub type EventCallback = Rc<dyn Fn(&Event, &mut World) -> Handling>;

/// Who created a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionOwner {
    /// Subscribing entity
    pub entity: EntityId,
    /// Facet (or dispatcher) name that subscribed
    pub facet: &'static str,
    /// Purpose, so one facet can drop a single wiring (e.g. `"parent"`)
    pub channel: &'static str,
}

/// Handle returned by [`EventSystem::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    owner: Option<SubscriptionOwner>,
    callback: EventCallback,
}

/// Subscription table with a tick-deferred queue
#[derive(Default)]
pub struct EventSystem {
    subscriptions: HashMap<EventAddress, Vec<Subscription>>,
    deferred_queue: Vec<(u64, Event)>,
    next_id: u64,
}

impl std::fmt::Debug for EventSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSystem")
            .field("addresses", &self.subscriptions.len())
            .field("subscriptions", &self.subscription_count())
            .field("deferred", &self.deferred_queue.len())
            .finish()
    }
}

impl EventSystem {
    /// Create an empty event system
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one address
    pub fn subscribe(
        &mut self,
        address: EventAddress,
        owner: Option<SubscriptionOwner>,
        callback: EventCallback,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions
            .entry(address)
            .or_default()
            .push(Subscription { id, owner, callback });
        id
    }

    /// Remove one subscription; returns whether it existed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut found = false;
        self.subscriptions.retain(|_, subscriptions| {
            let before = subscriptions.len();
            subscriptions.retain(|s| s.id != id);
            found |= subscriptions.len() != before;
            !subscriptions.is_empty()
        });
        found
    }

    /// Remove every subscription whose owner matches; returns how many
    pub fn unsubscribe_owned(&mut self, matches: impl Fn(&SubscriptionOwner) -> bool) -> usize {
        let mut removed = 0;
        self.subscriptions.retain(|_, subscriptions| {
            let before = subscriptions.len();
            subscriptions.retain(|s| !s.owner.as_ref().is_some_and(&matches));
            removed += before - subscriptions.len();
            !subscriptions.is_empty()
        });
        removed
    }

    /// Remove everything owned by or addressed to `entity`
    pub fn unsubscribe_entity(&mut self, entity: EntityId) -> usize {
        let mut removed = 0;
        self.subscriptions.retain(|address, subscriptions| {
            if address.target() == Some(entity) {
                removed += subscriptions.len();
                return false;
            }
            let before = subscriptions.len();
            subscriptions.retain(|s| s.owner.map_or(true, |owner| owner.entity != entity));
            removed += before - subscriptions.len();
            !subscriptions.is_empty()
        });
        self.deferred_queue.retain(|(_, event)| event.address.target() != Some(entity));
        removed
    }

    /// Callbacks subscribed to an address, in subscription order
    pub fn handlers_for(&self, address: &EventAddress) -> Vec<EventCallback> {
        self.subscriptions
            .get(address)
            .map(|subscriptions| subscriptions.iter().map(|s| Rc::clone(&s.callback)).collect())
            .unwrap_or_default()
    }

    /// Whether anything listens on an address
    pub fn has_subscribers(&self, address: &EventAddress) -> bool {
        self.subscriptions.contains_key(address)
    }

    /// Total number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }

    /// Subscriptions created by one owner
    pub fn owned_count(&self, owner: &SubscriptionOwner) -> usize {
        self.subscriptions
            .values()
            .flatten()
            .filter(|s| s.owner.as_ref() == Some(owner))
            .count()
    }

    /// Queue an event for delivery at `delivery_tick`
    pub fn post(&mut self, delivery_tick: u64, event: Event) {
        self.deferred_queue.push((delivery_tick, event));
    }

    /// Remove and return events due at or before `tick`, in posting order
    pub fn take_due(&mut self, tick: u64) -> Vec<Event> {
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred_queue)
            .into_iter()
            .partition(|(delivery, _)| *delivery <= tick);
        self.deferred_queue = pending;
        due.into_iter().map(|(_, event)| event).collect()
    }

    /// Number of queued deferred events
    pub fn pending(&self) -> usize {
        self.deferred_queue.len()
    }

    /// Clear all queued events (useful for state transitions)
    pub fn clear(&mut self) {
        self.deferred_queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn entities() -> (EntityId, EntityId) {
        let mut keys: SlotMap<EntityId, ()> = SlotMap::with_key();
        (keys.insert(()), keys.insert(()))
    }

    fn noop() -> EventCallback {
        Rc::new(|_, _| Handling::Cascade)
    }

    #[test]
    fn test_deferred_dispatch() {
        let mut system = EventSystem::new();
        system.post(3, Event::new(EventAddress::global("Tick")));
        system.post(1, Event::new(EventAddress::global("Early")));

        assert!(system.take_due(0).is_empty());
        let due = system.take_due(2);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].address, EventAddress::global("Early"));
        assert_eq!(system.pending(), 1);
        assert_eq!(system.take_due(3).len(), 1);
        assert_eq!(system.pending(), 0);
    }

    #[test]
    fn test_owned_subscriptions_are_dropped_together() {
        let (a, b) = entities();
        let mut system = EventSystem::new();
        let parent = SubscriptionOwner { entity: a, facet: "Node", channel: "parent" };
        let other = SubscriptionOwner { entity: a, facet: "Node", channel: "self" };
        system.subscribe(EventAddress::entity("Moved", b), Some(parent), noop());
        system.subscribe(EventAddress::global("Input"), Some(parent), noop());
        system.subscribe(EventAddress::global("Input"), Some(other), noop());
        system.subscribe(EventAddress::global("Input"), None, noop());

        assert_eq!(system.owned_count(&parent), 2);
        assert_eq!(system.unsubscribe_owned(|owner| *owner == parent), 2);
        assert_eq!(system.subscription_count(), 2);
        assert_eq!(system.unsubscribe_entity(a), 1);
        assert_eq!(system.handlers_for(&EventAddress::global("Input")).len(), 1);
    }

    #[test]
    fn test_unsubscribe_by_id_and_entity_target() {
        let (a, _) = entities();
        let mut system = EventSystem::new();
        let id = system.subscribe(EventAddress::Update, None, noop());
        system.subscribe(EventAddress::entity("Click", a), None, noop());
        assert!(system.unsubscribe(id));
        assert!(!system.unsubscribe(id));
        assert!(!system.has_subscribers(&EventAddress::Update));
        assert_eq!(system.unsubscribe_entity(a), 1);
        assert_eq!(system.subscription_count(), 0);
    }
}
