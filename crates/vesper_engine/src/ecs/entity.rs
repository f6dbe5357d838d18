//! Entity identity and per-entity state

use std::collections::HashMap;

use super::property::{PropertyId, PropertyValue};

slotmap::new_key_type! {
    /// Generational entity handle; stale handles never alias a newer entity
    pub struct EntityId;
}

/// One property value plus its publication policy
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySlot {
    /// Current value
    pub value: PropertyValue,
    /// Publish change events even when global publication is off
    pub always_publish: bool,
}

/// Everything the world stores for one entity
#[derive(Debug, Clone, Default)]
pub struct EntityState {
    /// Display name used in logs and diagnostics
    pub name: String,
    /// Name of the dispatcher (primary behavior)
    pub dispatcher: &'static str,
    /// Attached facet names, in attach order
    pub facets: Vec<&'static str>,
    /// Property slots; names are unique per entity by construction
    pub properties: HashMap<PropertyId, PropertySlot>,
    /// Facets whose physics is currently registered
    pub physics_registered: Vec<&'static str>,
}

impl EntityState {
    /// Create state for a new entity
    pub fn new(name: impl Into<String>, dispatcher: &'static str) -> Self {
        Self {
            name: name.into(),
            dispatcher,
            ..Self::default()
        }
    }

    /// Whether a facet is attached
    pub fn has_facet(&self, name: &str) -> bool {
        self.facets.iter().any(|facet| *facet == name)
    }

    /// Write a value only if the property is absent (first attach wins)
    ///
    /// Returns whether the slot was created.
    pub fn define_property(&mut self, id: PropertyId, default: PropertyValue, always_publish: bool) -> bool {
        match self.properties.entry(id) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                // an existing slot keeps its value but may gain the publish flag
                slot.get_mut().always_publish |= always_publish;
                false
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(PropertySlot { value: default, always_publish });
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_first_definition_wins() {
        let mut state = EntityState::new("player", "Entity");
        let id = PropertyId::from_raw(0);
        assert!(state.define_property(id, PropertyValue::Int(1), false));
        assert!(!state.define_property(id, PropertyValue::Int(2), true));
        let slot = &state.properties[&id];
        assert_eq!(slot.value, PropertyValue::Int(1));
        assert!(slot.always_publish);
    }

    #[test]
    fn test_stale_ids_do_not_alias() {
        let mut entities: SlotMap<EntityId, EntityState> = SlotMap::with_key();
        let first = entities.insert(EntityState::new("a", "Entity"));
        entities.remove(first);
        let second = entities.insert(EntityState::new("b", "Entity"));
        assert_ne!(first, second);
        assert!(entities.get(first).is_none());
    }
}
