//! Entity and facet lifecycle through the world
//!
//! Attach/detach bookkeeping, rollback of failed registrations, change
//! publication policy and deferred events.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::ecs::entity::EntityId;
use crate::ecs::facet::{EntityDispatcher, Facet};
use crate::ecs::property::{Property, PropertyDefinition, PropertyKind, PropertyValue};
use crate::ecs::world::{Collaborators, World, WorldError};
use crate::events::{Event, EventAddress, EventData, Handling, SubscriptionOwner};
use crate::foundation::math::Vec2;

/// Declares `health` and optionally fails registration after subscribing
struct Health {
    health: Property<i64>,
    fail: bool,
}

impl Health {
    fn new(world: &mut World, fail: bool) -> Self {
        Self {
            health: world.registry_mut().intern("health").unwrap(),
            fail,
        }
    }
}

impl Facet for Health {
    fn name(&self) -> &'static str {
        if self.fail {
            "BrokenHealth"
        } else {
            "Health"
        }
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![self.health.define(100)]
    }

    fn register(&self, entity: EntityId, world: &mut World) -> Result<(), WorldError> {
        let owner = SubscriptionOwner { entity, facet: self.name(), channel: "damage" };
        world.subscribe(EventAddress::entity("Damage", entity), Some(owner), |_, _| Handling::Cascade);
        if self.fail {
            return Err(WorldError::Configuration {
                entity: world.entity_name(entity).to_string(),
                reason: "refusing to register".to_string(),
            });
        }
        Ok(())
    }
}

fn world_with_health() -> (World, Property<i64>) {
    let mut world = World::headless().unwrap();
    let health = Health::new(&mut world, false);
    let property = health.health;
    world.register_facet(health).unwrap();
    let broken = Health::new(&mut world, true);
    world.register_facet(broken).unwrap();
    (world, property)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attaching_twice_is_rejected() {
        let (mut world, _) = world_with_health();
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        world.attach_facet(entity, "Health").unwrap();

        let err = world.attach_facet(entity, "Health").unwrap_err();
        assert!(matches!(err, WorldError::FacetAlreadyAttached { .. }));
        assert_eq!(world.facets_of(entity), vec!["Health"]);
    }

    #[test]
    fn test_facet_lookup_is_by_name() {
        let (mut world, _) = world_with_health();
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        assert!(world.facet_of(entity, "Health").is_none());

        world.attach_facet(entity, "Health").unwrap();
        assert_eq!(world.facet_of(entity, "Health").unwrap().name(), "Health");
        assert_eq!(world.facet_of(entity, EntityDispatcher::NAME).unwrap().name(), EntityDispatcher::NAME);
        assert!(world.facet_of(entity, "BrokenHealth").is_none());

        world.detach_facet(entity, "Health").unwrap();
        assert!(world.facet_of(entity, "Health").is_none());
    }

    #[test]
    fn test_failed_register_rolls_back() {
        let (mut world, health) = world_with_health();
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        let before = world.entity(entity).unwrap().properties.clone();

        assert!(world.attach_facet(entity, "BrokenHealth").is_err());
        assert_eq!(world.entity(entity).unwrap().properties, before);
        assert!(world.try_get(entity, health).is_none());
        assert_eq!(world.events().subscription_count(), 0);
        assert_eq!(world.diagnostics().len(), 1);
    }

    #[test]
    fn test_shared_properties_keep_the_first_value() {
        let (mut world, health) = world_with_health();
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        world.set(entity, health, 7).unwrap();
        world.attach_facet(entity, "Health").unwrap();
        assert_eq!(world.get(entity, health).unwrap(), 7);

        world.detach_facet(entity, "Health").unwrap();
        assert!(world.try_get(entity, health).is_none());
        assert!(matches!(
            world.detach_facet(entity, "Health"),
            Err(WorldError::FacetNotAttached { .. })
        ));
    }

    #[test]
    fn test_unknown_names_and_stale_ids() {
        let (mut world, health) = world_with_health();
        assert!(matches!(world.create_entity("Goblin", "g"), Err(WorldError::UnknownDispatcher(_))));
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        assert!(matches!(world.attach_facet(entity, "Wings"), Err(WorldError::UnknownFacet(_))));
        assert!(matches!(world.get(entity, health), Err(WorldError::MissingProperty { .. })));
        let duplicate = Health::new(&mut world, false);
        assert!(matches!(world.register_facet(duplicate), Err(WorldError::DuplicateRegistration(_))));

        world.destroy_entity(entity).unwrap();
        assert!(!world.contains(entity));
        assert!(matches!(world.destroy_entity(entity), Err(WorldError::UnknownEntity(_))));
        assert!(matches!(world.set(entity, health, 1), Err(WorldError::UnknownEntity(_))));
    }

    #[test]
    fn test_writes_are_kind_checked() {
        let (mut world, health) = world_with_health();
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        let err = world.set_value(entity, health.id(), PropertyValue::Float(1.0)).unwrap_err();
        assert_eq!(
            err,
            WorldError::PropertyKindMismatch {
                property: "health".to_string(),
                expected: PropertyKind::Int,
                found: PropertyKind::Float,
            }
        );
    }

    #[test]
    fn test_change_publication_policy() {
        let (mut world, health) = world_with_health();
        let position = world.intrinsics().position;
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        world.attach_facet(entity, "Health").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        for property in [position.id(), health.id()] {
            let seen = Rc::clone(&seen);
            world.subscribe(EventAddress::Change { property, entity }, None, move |event, _| {
                seen.borrow_mut().push(event.data.clone());
                Handling::Cascade
            });
        }

        world.set(entity, health, 50).unwrap();
        world.set(entity, position, Vec2::new(1.0, 2.0)).unwrap();
        // equal writes are not changes
        world.set(entity, position, Vec2::new(1.0, 2.0)).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![EventData::Change {
                previous: Some(PropertyValue::Vec2(Vec2::zeros())),
                value: PropertyValue::Vec2(Vec2::new(1.0, 2.0)),
            }]
        );
    }

    #[test]
    fn test_global_publication_publishes_every_property() {
        let config = EngineConfig { publish_changes: true, ..EngineConfig::headless() };
        let mut world = World::new(&config, Collaborators::headless()).unwrap();
        let health = Health::new(&mut world, false);
        let property = health.health;
        world.register_facet(health).unwrap();
        let entity = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        world.attach_facet(entity, "Health").unwrap();

        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        world.subscribe(EventAddress::Change { property: property.id(), entity }, None, move |_, _| {
            *counter.borrow_mut() += 1;
            Handling::Cascade
        });
        world.set(entity, property, 1).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_resolve_stops_later_subscribers() {
        let mut world = World::headless().unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (name, handling) in [("first", Handling::Resolve), ("second", Handling::Cascade)] {
            let order = Rc::clone(&order);
            world.subscribe(EventAddress::global("Ping"), None, move |_, _| {
                order.borrow_mut().push(name);
                handling
            });
        }
        world.publish(Event::new(EventAddress::global("Ping")));
        assert_eq!(*order.borrow(), vec!["first"]);
    }

    #[test]
    fn test_posted_events_arrive_on_their_tick() {
        let mut world = World::headless().unwrap();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&ticks);
        world.subscribe(EventAddress::global("Later"), None, move |event, _| {
            seen.borrow_mut().push(event.tick);
            Handling::Cascade
        });

        world.post(Event::new(EventAddress::global("Later")), 2);
        world.update();
        assert!(ticks.borrow().is_empty());
        world.update();
        assert_eq!(*ticks.borrow(), vec![2]);
    }

    #[test]
    fn test_destroy_drops_subscriptions_addressed_to_the_entity() {
        let (mut world, _) = world_with_health();
        let hero = world.create_entity(EntityDispatcher::NAME, "hero").unwrap();
        let watcher = world.create_entity(EntityDispatcher::NAME, "watcher").unwrap();
        world.attach_facet(hero, "Health").unwrap();
        world.subscribe(EventAddress::entity("Died", hero), None, |_, _| Handling::Cascade);
        world.subscribe(
            EventAddress::global("Tick"),
            Some(SubscriptionOwner { entity: watcher, facet: "Script", channel: "tick" }),
            |_, _| Handling::Cascade,
        );
        assert_eq!(world.events().subscription_count(), 3);

        world.destroy_entity(hero).unwrap();
        assert_eq!(world.events().subscription_count(), 1);
    }
}
