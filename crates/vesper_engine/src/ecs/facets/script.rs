//! Script facet
//!
//! Holds script source for the register, update and unregister hooks and
//! hands it to the world's [`ScriptHost`]. The evaluator itself lives
//! outside the engine core.

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{Property, PropertyDefinition, PropertyValue};
use crate::ecs::world::{World, WorldError};

/// Script evaluation collaborator
pub trait ScriptHost {
    /// Evaluate `source` with `entity` as the subject
    fn evaluate(&mut self, entity: EntityId, source: &str) -> Result<PropertyValue, String>;
}

/// Scripted lifecycle hooks
#[derive(Debug, Clone, Copy)]
pub struct ScriptFacet {
    /// Evaluated when the facet registers
    pub register_script: Property<String>,
    /// Evaluated every tick
    pub update_script: Property<String>,
    /// Evaluated when the facet unregisters
    pub unregister_script: Property<String>,
}

impl ScriptFacet {
    /// Registered name
    pub const NAME: &'static str = "Script";

    /// Intern the script properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let registry = world.registry_mut();
        Ok(Self {
            register_script: registry.intern("register_script")?,
            update_script: registry.intern("update_script")?,
            unregister_script: registry.intern("unregister_script")?,
        })
    }

    /// Evaluate one hook's script; empty scripts are skipped
    fn run(entity: EntityId, world: &mut World, script: Property<String>, hook: &str) {
        let Some(source) = world.try_get(entity, script).filter(|source| !source.trim().is_empty()) else {
            return;
        };
        let name = world.entity_name(entity).to_string();
        let Some(host) = world.scripts_mut() else {
            log::warn!("No script host; skipping {} script of '{}'", hook, name);
            return;
        };
        match host.evaluate(entity, &source) {
            Ok(value) => log::trace!("{} script of '{}' returned {:?}", hook, name, value),
            Err(e) => log::warn!("{} script of '{}' failed: {}", hook, name, e),
        }
    }
}

impl Facet for ScriptFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.register_script.define(String::new()),
            self.update_script.define(String::new()),
            self.unregister_script.define(String::new()),
        ]
    }

    fn register(&self, entity: EntityId, world: &mut World) -> Result<(), WorldError> {
        Self::run(entity, world, self.register_script, "register");
        Ok(())
    }

    fn unregister(&self, entity: EntityId, world: &mut World) {
        Self::run(entity, world, self.unregister_script, "unregister");
    }

    fn update(&self, entity: EntityId, world: &mut World) {
        Self::run(entity, world, self.update_script, "update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ecs::facet::EntityDispatcher;
    use crate::ecs::world::Collaborators;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingHost {
        evaluated: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptHost for RecordingHost {
        fn evaluate(&mut self, _entity: EntityId, source: &str) -> Result<PropertyValue, String> {
            self.evaluated.borrow_mut().push(source.to_string());
            if source == "fail" {
                Err("syntax error".to_string())
            } else {
                Ok(PropertyValue::Bool(true))
            }
        }
    }

    #[test]
    fn test_hooks_evaluate_their_scripts() {
        let evaluated = Rc::new(RefCell::new(Vec::new()));
        let host = RecordingHost { evaluated: Rc::clone(&evaluated) };
        let collaborators = Collaborators::headless().with_scripts(Box::new(host));
        let mut world = World::new(&EngineConfig::headless(), collaborators).unwrap();
        let facet = ScriptFacet::new(&mut world).unwrap();
        world.register_facet(facet).unwrap();

        let entity = world.create_entity(EntityDispatcher::NAME, "scripted").unwrap();
        world.set(entity, facet.register_script, "(spawn)".to_string()).unwrap();
        world.set(entity, facet.update_script, "fail".to_string()).unwrap();
        world.set(entity, facet.unregister_script, "(despawn)".to_string()).unwrap();
        world.attach_facet(entity, ScriptFacet::NAME).unwrap();
        world.update();
        world.destroy_entity(entity).unwrap();

        assert_eq!(*evaluated.borrow(), vec!["(spawn)", "fail", "(despawn)"]);
    }

    #[test]
    fn test_missing_host_is_not_an_error() {
        let mut world = World::headless().unwrap();
        let facet = ScriptFacet::new(&mut world).unwrap();
        world.register_facet(facet).unwrap();
        let entity = world.create_entity(EntityDispatcher::NAME, "scripted").unwrap();
        world.set(entity, facet.update_script, "(tick)".to_string()).unwrap();
        assert!(world.attach_facet(entity, ScriptFacet::NAME).is_ok());
        world.update();
    }
}
