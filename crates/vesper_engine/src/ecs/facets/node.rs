//! Node facet: mount an entity onto a parent
//!
//! The child's `position` and `elevation` are derived from the parent's plus
//! local offsets. Derivation runs through change subscriptions, so moving a
//! parent moves its whole subtree.

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{IntrinsicProperties, Property, PropertyDefinition, PropertyId, PropertyValue};
use crate::ecs::world::{World, WorldError};
use crate::events::{EventAddress, Handling, SubscriptionOwner};
use crate::foundation::math::Vec2;

/// Parent/child transform relation
#[derive(Debug, Clone, Copy)]
pub struct NodeFacet {
    /// Entity this one is mounted on
    pub parent_node: Property<Option<EntityId>>,
    /// Offset from the parent's position
    pub position_local: Property<Vec2>,
    /// Offset from the parent's elevation
    pub elevation_local: Property<f32>,
    intrinsics: IntrinsicProperties,
}

impl NodeFacet {
    /// Registered name
    pub const NAME: &'static str = "Node";

    /// Intern the node properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            parent_node: registry.intern("parent_node")?,
            position_local: registry.intern("position_local")?,
            elevation_local: registry.intern("elevation_local")?,
            intrinsics,
        })
    }

    fn owner(entity: EntityId, channel: &'static str) -> SubscriptionOwner {
        SubscriptionOwner {
            entity,
            facet: Self::NAME,
            channel,
        }
    }

    /// Why mounting `entity` onto `parent` is invalid, if it is
    pub fn mount_error(&self, entity: EntityId, parent: EntityId, world: &World) -> Option<String> {
        if parent == entity {
            return Some("an entity cannot be mounted onto itself".to_string());
        }
        if !world.contains(parent) {
            return Some(format!("parent {parent:?} does not exist"));
        }
        let mut current = Some(parent);
        for _ in 0..world.entity_count() {
            match current {
                Some(ancestor) if ancestor == entity => {
                    return Some(format!("mounting onto '{}' would form a cycle", world.entity_name(parent)));
                }
                Some(ancestor) => current = world.try_get(ancestor, self.parent_node).flatten(),
                None => return None,
            }
        }
        None
    }

    /// Re-derive `position` and `elevation` from the parent
    pub fn propagate(&self, entity: EntityId, world: &mut World) {
        let Some(parent) = world.try_get(entity, self.parent_node).flatten() else {
            return;
        };
        let (Some(position), Some(elevation)) = (
            world.try_get(parent, self.intrinsics.position),
            world.try_get(parent, self.intrinsics.elevation),
        ) else {
            return;
        };
        let local_position = world.try_get(entity, self.position_local).unwrap_or_else(Vec2::zeros);
        let local_elevation = world.try_get(entity, self.elevation_local).unwrap_or(0.0);

        let result = world
            .set(entity, self.intrinsics.position, position + local_position)
            .and_then(|()| world.set(entity, self.intrinsics.elevation, elevation + local_elevation));
        if let Err(e) = result {
            log::warn!("Could not propagate transform to '{}': {}", world.entity_name(entity), e);
        }
    }

    /// Subscribe to the current parent's transform, replacing older wiring
    fn wire_parent(&self, entity: EntityId, world: &mut World) {
        world.unsubscribe_owned(Self::owner(entity, "parent"));
        let Some(parent) = world.try_get(entity, self.parent_node).flatten() else {
            return;
        };
        let node = *self;
        for property in [self.intrinsics.position.id(), self.intrinsics.elevation.id()] {
            world.subscribe(
                EventAddress::Change { property, entity: parent },
                Some(Self::owner(entity, "parent")),
                move |_, world| {
                    node.propagate(entity, world);
                    Handling::Cascade
                },
            );
        }
        self.propagate(entity, world);
    }
}

impl Facet for NodeFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.parent_node.define_published(None),
            self.position_local.define_published(Vec2::zeros()),
            self.elevation_local.define_published(0.0),
        ]
    }

    fn register(&self, entity: EntityId, world: &mut World) -> Result<(), WorldError> {
        if let Some(parent) = world.try_get(entity, self.parent_node).flatten() {
            if let Some(reason) = self.mount_error(entity, parent, world) {
                return Err(WorldError::Configuration {
                    entity: world.entity_name(entity).to_string(),
                    reason,
                });
            }
        }

        let node = *self;
        world.subscribe(
            EventAddress::Change { property: self.parent_node.id(), entity },
            Some(Self::owner(entity, "self")),
            move |_, world| {
                node.wire_parent(entity, world);
                Handling::Cascade
            },
        );
        for property in [self.position_local.id(), self.elevation_local.id()] {
            world.subscribe(
                EventAddress::Change { property, entity },
                Some(Self::owner(entity, "self")),
                move |_, world| {
                    node.propagate(entity, world);
                    Handling::Cascade
                },
            );
        }
        self.wire_parent(entity, world);
        Ok(())
    }

    fn validate(&self, entity: EntityId, property: PropertyId, value: &PropertyValue, world: &World) -> Result<(), String> {
        match value {
            PropertyValue::Entity(Some(parent)) if property == self.parent_node.id() => {
                self.mount_error(entity, *parent, world).map_or(Ok(()), Err)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::facet::EntityDispatcher;

    fn setup() -> (World, NodeFacet) {
        let mut world = World::headless().unwrap();
        let node = NodeFacet::new(&mut world).unwrap();
        world.register_facet(node).unwrap();
        (world, node)
    }

    fn spawn(world: &mut World, name: &str) -> EntityId {
        let entity = world.create_entity(EntityDispatcher::NAME, name).unwrap();
        world.attach_facet(entity, NodeFacet::NAME).unwrap();
        entity
    }

    #[test]
    fn test_children_follow_their_parent() {
        let (mut world, node) = setup();
        let position = world.intrinsics().position;
        let elevation = world.intrinsics().elevation;
        let root = spawn(&mut world, "root");
        let child = spawn(&mut world, "child");
        let grandchild = spawn(&mut world, "grandchild");

        world.set(child, node.position_local, Vec2::new(1.0, 0.0)).unwrap();
        world.set(child, node.elevation_local, 1.0).unwrap();
        world.set(child, node.parent_node, Some(root)).unwrap();
        world.set(grandchild, node.position_local, Vec2::new(0.0, 2.0)).unwrap();
        world.set(grandchild, node.parent_node, Some(child)).unwrap();

        world.set(root, position, Vec2::new(10.0, 10.0)).unwrap();
        world.set(root, elevation, 3.0).unwrap();

        assert_eq!(world.get(child, position).unwrap(), Vec2::new(11.0, 10.0));
        assert_eq!(world.get(grandchild, position).unwrap(), Vec2::new(11.0, 12.0));
        assert_eq!(world.get(grandchild, elevation).unwrap(), 4.0);
    }

    #[test]
    fn test_remounting_drops_the_old_parent() {
        let (mut world, node) = setup();
        let position = world.intrinsics().position;
        let (a, b, child) = (spawn(&mut world, "a"), spawn(&mut world, "b"), spawn(&mut world, "child"));
        world.set(b, position, Vec2::new(5.0, 0.0)).unwrap();

        world.set(child, node.parent_node, Some(a)).unwrap();
        world.set(child, node.parent_node, Some(b)).unwrap();
        assert_eq!(world.get(child, position).unwrap(), Vec2::new(5.0, 0.0));

        world.set(a, position, Vec2::new(-1.0, -1.0)).unwrap();
        assert_eq!(world.get(child, position).unwrap(), Vec2::new(5.0, 0.0));
        assert_eq!(world.events().owned_count(&NodeFacet::owner(child, "parent")), 2);
    }

    #[test]
    fn test_self_mount_is_rejected_and_rolled_back() {
        let (mut world, node) = setup();
        let entity = spawn(&mut world, "loner");
        let before = world.entity(entity).unwrap().properties.clone();

        let err = world.set(entity, node.parent_node, Some(entity)).unwrap_err();

        assert!(matches!(err, WorldError::Configuration { .. }));
        assert_eq!(world.entity(entity).unwrap().properties, before);
        assert_eq!(world.diagnostics().len(), 1);
        assert_eq!(world.diagnostics()[0].entity, Some(entity));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let (mut world, node) = setup();
        let (a, b) = (spawn(&mut world, "a"), spawn(&mut world, "b"));
        world.set(b, node.parent_node, Some(a)).unwrap();
        assert!(world.set(a, node.parent_node, Some(b)).is_err());
        assert_eq!(world.get(a, node.parent_node).unwrap(), None);
    }

    #[test]
    fn test_attaching_with_a_self_parent_fails() {
        let (mut world, node) = setup();
        let entity = world.create_entity(EntityDispatcher::NAME, "early").unwrap();
        world.set_value(entity, node.parent_node.id(), PropertyValue::Entity(Some(entity))).unwrap();

        assert!(world.attach_facet(entity, NodeFacet::NAME).is_err());
        assert!(world.facets_of(entity).is_empty());
        assert_eq!(world.events().subscription_count(), 0);
    }
}
