//! Joint facet: one physics constraint between two bodies

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{Dynamic, Property, PropertyDefinition};
use crate::ecs::world::{World, WorldError};
use crate::events::{EventAddress, Handling, SubscriptionOwner};
use crate::physics::{JointDevice, JointId};

/// Physics joint capability
#[derive(Debug, Clone, Copy)]
pub struct JointFacet {
    /// Constraint description; no joint is created while `None`
    pub joint_device: Property<Dynamic<Option<JointDevice>>>,
    /// Index of the joint within its entity
    pub joint_index: Property<i64>,
    registered_joint: Property<Dynamic<Option<JointId>>>,
}

impl JointFacet {
    /// Registered name
    pub const NAME: &'static str = "Joint";

    /// Intern the joint properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let registry = world.registry_mut();
        Ok(Self {
            joint_device: registry.intern("joint_device")?,
            joint_index: registry.intern("joint_index")?,
            registered_joint: registry.intern("registered_joint")?,
        })
    }

    /// The joint currently registered for an entity
    pub fn joint_id(&self, entity: EntityId, world: &World) -> Option<JointId> {
        world.try_get(entity, self.registered_joint).and_then(|joint| *joint)
    }

    fn record_joint(&self, entity: EntityId, world: &mut World, joint: Option<JointId>) {
        if let Err(e) = world.set(entity, self.registered_joint, Dynamic::new(joint)) {
            log::warn!("Could not record joint of '{}': {}", world.entity_name(entity), e);
        }
    }
}

impl Facet for JointFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.joint_device.define_published(Dynamic::new(None)),
            self.joint_index.define_published(0),
            self.registered_joint.define(Dynamic::new(None)),
        ]
    }

    fn register(&self, entity: EntityId, world: &mut World) -> Result<(), WorldError> {
        let owner = SubscriptionOwner {
            entity,
            facet: Self::NAME,
            channel: "physics",
        };
        for property in [self.joint_device.id(), self.joint_index.id()] {
            world.subscribe(EventAddress::Change { property, entity }, Some(owner), move |_, world| {
                if let Err(e) = world.rebuild_physics(entity) {
                    log::warn!("Could not rebuild joint: {}", e);
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
        let Some(device) = world.try_get(entity, self.joint_device).and_then(|device| (*device).clone()) else {
            return;
        };
        let joint = JointId {
            source: entity,
            index: world.try_get(entity, self.joint_index).unwrap_or(0),
        };
        world.physics_mut().create_joint(joint, device);
        self.record_joint(entity, world, Some(joint));
    }

    fn unregister_physics(&self, entity: EntityId, world: &mut World) {
        if let Some(joint) = self.joint_id(entity, world) {
            world.physics_mut().destroy_joint(joint);
            self.record_joint(entity, world, None);
        }
    }
}
