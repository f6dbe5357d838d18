//! Capability (facet) and dispatcher traits
//!
//! A facet is a named behavior that can be attached to any entity. It
//! declares the properties it needs and implements whichever lifecycle hooks
//! it cares about; every hook has a no-op default. Facets are registered
//! once with the world and looked up by name, never by position.
//!
//! Lifecycle per attached facet:
//! `register` -> (`register_physics`) -> `update`/`post_update` each tick,
//! `actualize` each render -> (`unregister_physics`) -> `unregister`.

use super::entity::EntityId;
use super::property::{PropertyDefinition, PropertyId, PropertyValue};
use super::world::{World, WorldError};
use crate::view::View;

/// Pluggable named behavior
pub trait Facet {
    /// Unique capability name
    fn name(&self) -> &'static str;

    /// Properties this facet owns, with defaults
    fn properties(&self) -> Vec<PropertyDefinition> {
        Vec::new()
    }

    /// Wire subscriptions and derived state after attach
    ///
    /// An error aborts the attach and rolls it back.
    fn register(&self, _entity: EntityId, _world: &mut World) -> Result<(), WorldError> {
        Ok(())
    }

    /// Reverse whatever `register` did (owned subscriptions are dropped by the world)
    fn unregister(&self, _entity: EntityId, _world: &mut World) {}

    /// Advance simulation state by one tick
    fn update(&self, _entity: EntityId, _world: &mut World) {}

    /// Runs after every entity has updated
    fn post_update(&self, _entity: EntityId, _world: &mut World) {}

    /// Describe what to draw or play; never mutates simulation state
    fn actualize(&self, _entity: EntityId, _world: &World) -> View {
        View::none()
    }

    /// Whether this facet owns physics bodies or joints
    fn is_physical(&self) -> bool {
        false
    }

    /// Submit bodies/joints to the physics collaborator
    fn register_physics(&self, _entity: EntityId, _world: &mut World) {}

    /// Remove bodies/joints from the physics collaborator
    fn unregister_physics(&self, _entity: EntityId, _world: &mut World) {}

    /// Veto a property write on an entity carrying this facet
    ///
    /// Returning an error rejects the write as a configuration error.
    fn validate(
        &self,
        _entity: EntityId,
        _property: PropertyId,
        _value: &PropertyValue,
        _world: &World,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// An entity's primary behavior
///
/// A dispatcher is a facet that every entity of its kind starts with, plus a
/// list of facets attached at creation.
pub trait Dispatcher: Facet {
    /// Facets attached to every entity created with this dispatcher
    fn intrinsic_facets(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Dispatcher with no behavior of its own
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityDispatcher;

impl EntityDispatcher {
    /// Registered name
    pub const NAME: &'static str = "Entity";
}

impl Facet for EntityDispatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl Dispatcher for EntityDispatcher {}
