//! Rigid body facet
//!
//! Describes one physics body per entity. Any change to a physics property
//! tears the body down and rebuilds it.

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{
    Dynamic, IntrinsicProperties, Property, PropertyDefinition, PropertyId, PropertyValue,
};
use crate::ecs::world::{World, WorldError};
use crate::events::{EventAddress, Handling, SubscriptionOwner};
use crate::foundation::math::Vec2;
use crate::physics::{BodyId, BodyProperties, BodyShape, BodyType};

/// Physics body capability
#[derive(Debug, Clone, Copy)]
pub struct RigidBodyFacet {
    /// Whether the body takes part in simulation
    pub body_enabled: Property<bool>,
    /// Motion type
    pub body_type: Property<Dynamic<BodyType>>,
    /// Collision shape in unit space
    pub body_shape: Property<Dynamic<BodyShape>>,
    /// Mass
    pub mass: Property<f32>,
    /// Surface friction
    pub friction: Property<f32>,
    /// Bounciness
    pub restitution: Property<f32>,
    /// Gravity multiplier
    pub gravity_scale: Property<f32>,
    /// Linear damping
    pub linear_damping: Property<f32>,
    /// Prevent rotation
    pub fixed_rotation: Property<bool>,
    /// Index of the body within its entity
    pub body_index: Property<i64>,
    registered_body: Property<Dynamic<Option<BodyId>>>,
    parent_node: Property<Option<EntityId>>,
    intrinsics: IntrinsicProperties,
}

impl RigidBodyFacet {
    /// Registered name
    pub const NAME: &'static str = "RigidBody";

    /// Intern the rigid body properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            body_enabled: registry.intern("body_enabled")?,
            body_type: registry.intern("body_type")?,
            body_shape: registry.intern("body_shape")?,
            mass: registry.intern("mass")?,
            friction: registry.intern("friction")?,
            restitution: registry.intern("restitution")?,
            gravity_scale: registry.intern("gravity_scale")?,
            linear_damping: registry.intern("linear_damping")?,
            fixed_rotation: registry.intern("fixed_rotation")?,
            body_index: registry.intern("body_index")?,
            registered_body: registry.intern("registered_body")?,
            parent_node: registry.intern("parent_node")?,
            intrinsics,
        })
    }

    fn physics_properties(&self) -> [PropertyId; 10] {
        [
            self.body_enabled.id(),
            self.body_type.id(),
            self.body_shape.id(),
            self.mass.id(),
            self.friction.id(),
            self.restitution.id(),
            self.gravity_scale.id(),
            self.linear_damping.id(),
            self.fixed_rotation.id(),
            self.body_index.id(),
        ]
    }

    /// Body description from the entity's current properties
    pub fn body_properties(&self, entity: EntityId, world: &World) -> BodyProperties {
        let defaults = BodyProperties::default();
        BodyProperties {
            position: world.try_get(entity, self.intrinsics.position).unwrap_or(defaults.position),
            rotation: world.try_get(entity, self.intrinsics.rotation).unwrap_or(defaults.rotation),
            scale: world.try_get(entity, self.intrinsics.size).unwrap_or(defaults.scale),
            shape: world.try_get(entity, self.body_shape).map_or(defaults.shape, |shape| (*shape).clone()),
            body_type: world.try_get(entity, self.body_type).map_or(defaults.body_type, |body_type| *body_type),
            mass: world.try_get(entity, self.mass).unwrap_or(defaults.mass),
            friction: world.try_get(entity, self.friction).unwrap_or(defaults.friction),
            restitution: world.try_get(entity, self.restitution).unwrap_or(defaults.restitution),
            gravity_scale: world.try_get(entity, self.gravity_scale).unwrap_or(defaults.gravity_scale),
            linear_damping: world.try_get(entity, self.linear_damping).unwrap_or(defaults.linear_damping),
            fixed_rotation: world.try_get(entity, self.fixed_rotation).unwrap_or(defaults.fixed_rotation),
            enabled: world.try_get(entity, self.body_enabled).unwrap_or(defaults.enabled),
            ..defaults
        }
    }

    /// The body currently registered for an entity
    pub fn body_id(&self, entity: EntityId, world: &World) -> Option<BodyId> {
        world.try_get(entity, self.registered_body).and_then(|body| *body)
    }

    /// Linear velocity reported by physics (zero without a body)
    pub fn linear_velocity(&self, entity: EntityId, world: &World) -> Vec2 {
        self.body_id(entity, world)
            .map_or_else(Vec2::zeros, |body| world.physics().linear_velocity(body))
    }

    /// Whether physics reports the body resting on ground
    pub fn is_on_ground(&self, entity: EntityId, world: &World) -> bool {
        self.body_id(entity, world)
            .is_some_and(|body| world.physics().is_on_ground(body))
    }

    fn mount_error(&self, parent: EntityId, world: &World) -> Option<String> {
        world.facets_of(parent).contains(&Self::NAME).then(|| {
            format!(
                "a rigid body cannot be mounted onto rigid body '{}'",
                world.entity_name(parent)
            )
        })
    }

    fn mounted_body(&self, parent: EntityId, world: &World) -> Option<String> {
        world
            .entities()
            .find(|&child| {
                child != parent
                    && world.try_get(child, self.parent_node).flatten() == Some(parent)
                    && world.facets_of(child).contains(&Self::NAME)
            })
            .map(|child| format!("rigid body '{}' is already mounted onto it", world.entity_name(child)))
    }

    fn record_body(&self, entity: EntityId, world: &mut World, body: Option<BodyId>) {
        if let Err(e) = world.set(entity, self.registered_body, Dynamic::new(body)) {
            log::warn!("Could not record body of '{}': {}", world.entity_name(entity), e);
        }
    }
}

impl Facet for RigidBodyFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.body_enabled.define_published(true),
            self.body_type.define_published(Dynamic::new(BodyType::Dynamic)),
            self.body_shape.define_published(Dynamic::new(BodyShape::default())),
            self.mass.define_published(1.0),
            self.friction.define_published(0.2),
            self.restitution.define_published(0.0),
            self.gravity_scale.define_published(1.0),
            self.linear_damping.define_published(0.0),
            self.fixed_rotation.define_published(false),
            self.body_index.define_published(0),
            self.registered_body.define(Dynamic::new(None)),
        ]
    }

    fn register(&self, entity: EntityId, world: &mut World) -> Result<(), WorldError> {
        if let Some(parent) = world.try_get(entity, self.parent_node).flatten() {
            if let Some(reason) = self.mount_error(parent, world) {
                return Err(WorldError::Configuration {
                    entity: world.entity_name(entity).to_string(),
                    reason,
                });
            }
        }
        if let Some(reason) = self.mounted_body(entity, world) {
            return Err(WorldError::Configuration {
                entity: world.entity_name(entity).to_string(),
                reason,
            });
        }
        let owner = SubscriptionOwner {
            entity,
            facet: Self::NAME,
            channel: "physics",
        };
        for property in self.physics_properties() {
            world.subscribe(EventAddress::Change { property, entity }, Some(owner), move |_, world| {
                if let Err(e) = world.rebuild_physics(entity) {
                    log::warn!("Could not rebuild physics: {}", e);
                }
                Handling::Cascade
            });
        }
        Ok(())
    }

    fn is_physical(&self) -> bool {
        true
    }

    fn register_physics(&self, entity: EntityId, world: &mut World) {
        let body = BodyId {
            source: entity,
            index: world.try_get(entity, self.body_index).unwrap_or(0),
        };
        let properties = self.body_properties(entity, world);
        world.physics_mut().create_body(entity, body, properties);
        self.record_body(entity, world, Some(body));
    }

    fn unregister_physics(&self, entity: EntityId, world: &mut World) {
        if let Some(body) = self.body_id(entity, world) {
            world.physics_mut().destroy_body(body);
            self.record_body(entity, world, None);
        }
    }

    fn validate(&self, _entity: EntityId, property: PropertyId, value: &PropertyValue, world: &World) -> Result<(), String> {
        match value {
            PropertyValue::Entity(Some(parent)) if property == self.parent_node.id() => {
                self.mount_error(*parent, world).map_or(Ok(()), Err)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::facet::EntityDispatcher;
    use crate::ecs::facets::node::NodeFacet;
    use crate::physics::{PhysicsCall, RecordingPhysics};

    fn setup() -> (World, RigidBodyFacet, NodeFacet) {
        let mut world = World::headless().unwrap();
        let body = RigidBodyFacet::new(&mut world).unwrap();
        let node = NodeFacet::new(&mut world).unwrap();
        world.register_facet(body).unwrap();
        world.register_facet(node).unwrap();
        (world, body, node)
    }

    fn recording(world: &World) -> &RecordingPhysics {
        world.physics().as_any().downcast_ref::<RecordingPhysics>().unwrap()
    }

    fn spawn(world: &mut World, name: &str, facets: &[&str]) -> EntityId {
        let entity = world.create_entity(EntityDispatcher::NAME, name).unwrap();
        for facet in facets {
            world.attach_facet(entity, facet).unwrap();
        }
        entity
    }

    #[test]
    fn test_body_follows_attach_and_property_changes() {
        let (mut world, facet, _) = setup();
        let crate_box = spawn(&mut world, "crate", &[RigidBodyFacet::NAME]);
        let body = BodyId { source: crate_box, index: 0 };
        assert_eq!(recording(&world).body(body).unwrap().mass, 1.0);

        world.set(crate_box, facet.mass, 4.0).unwrap();
        assert_eq!(recording(&world).body(body).unwrap().mass, 4.0);
        assert_eq!(recording(&world).body_count(), 1);

        world.set(crate_box, facet.body_index, 2).unwrap();
        assert!(recording(&world).body(body).is_none());
        assert_eq!(facet.body_id(crate_box, &world), Some(BodyId { source: crate_box, index: 2 }));

        world.destroy_entity(crate_box).unwrap();
        assert_eq!(recording(&world).body_count(), 0);
        assert_eq!(recording(&world).calls().last(), Some(&PhysicsCall::DestroyBody(BodyId { source: crate_box, index: 2 })));
    }

    #[test]
    fn test_velocity_and_ground_accessors() {
        let (mut world, facet, _) = setup();
        let player = spawn(&mut world, "player", &[RigidBodyFacet::NAME]);
        let body = facet.body_id(player, &world).unwrap();
        let physics = world.physics_mut().as_any_mut().downcast_mut::<RecordingPhysics>().unwrap();
        physics.set_linear_velocity(body, Vec2::new(0.0, -3.0));
        physics.set_on_ground(body, true);

        assert_eq!(facet.linear_velocity(player, &world), Vec2::new(0.0, -3.0));
        assert!(facet.is_on_ground(player, &world));
    }

    #[test]
    fn test_rigid_body_cannot_mount_onto_rigid_body() {
        let (mut world, _, node) = setup();
        let floor = spawn(&mut world, "floor", &[RigidBodyFacet::NAME]);
        let ball = spawn(&mut world, "ball", &[NodeFacet::NAME, RigidBodyFacet::NAME]);
        let marker = spawn(&mut world, "marker", &[NodeFacet::NAME]);

        assert!(world.set(ball, node.parent_node, Some(floor)).is_err());
        assert_eq!(world.get(ball, node.parent_node).unwrap(), None);
        assert!(world.set(marker, node.parent_node, Some(floor)).is_ok());
        assert_eq!(world.diagnostics().len(), 1);
    }

    #[test]
    fn test_parent_cannot_become_rigid_body_under_mounted_body() {
        let (mut world, facet, node) = setup();
        let cart = spawn(&mut world, "cart", &[NodeFacet::NAME]);
        let wheel = spawn(&mut world, "wheel", &[NodeFacet::NAME, RigidBodyFacet::NAME]);
        world.set(wheel, node.parent_node, Some(cart)).unwrap();

        let err = world.attach_facet(cart, RigidBodyFacet::NAME).unwrap_err();
        assert!(matches!(err, WorldError::Configuration { .. }));
        assert_eq!(world.facets_of(cart), vec![NodeFacet::NAME]);
        assert!(world.try_get(cart, facet.mass).is_none());
        assert!(facet.body_id(cart, &world).is_none());
        assert_eq!(world.diagnostics().len(), 1);

        // once the wheel is unmounted the cart may carry a body
        world.set(wheel, node.parent_node, None).unwrap();
        assert!(world.attach_facet(cart, RigidBodyFacet::NAME).is_ok());
    }
}
