//! World: the explicit simulation context
//!
//! Owns every entity and its property store, the facet and dispatcher
//! registries, the event system, the external collaborators (physics,
//! render queue, audio queue, script host) and a diagnostics log. Every hook
//! and router call receives the world by reference; nothing is global.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use slotmap::SlotMap;
use thiserror::Error;

use super::entity::{EntityId, EntityState, PropertySlot};
use super::facet::{Dispatcher, EntityDispatcher, Facet};
use super::facets::script::ScriptHost;
use super::property::{
    IntrinsicProperties, Property, PropertyId, PropertyKind, PropertyRegistry, PropertyType, PropertyValue,
};
use crate::audio::{AudioMessageQueue, AudioQueue};
use crate::config::EngineConfig;
use crate::events::{
    Event, EventAddress, EventData, EventSystem, Handling, SubscriptionId, SubscriptionOwner,
};
use crate::physics::{PhysicsEngine, RecordingPhysics};
use crate::render::render_queue::{RenderMessageQueue, RenderQueue};
use crate::view::{actualize_view, View};

/// Errors raised by world operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorldError {
    /// The entity does not exist (never created or already destroyed)
    #[error("Unknown entity {0:?}")]
    UnknownEntity(EntityId),
    /// No facet is registered under the name
    #[error("Unknown facet '{0}'")]
    UnknownFacet(String),
    /// No dispatcher is registered under the name
    #[error("Unknown dispatcher '{0}'")]
    UnknownDispatcher(String),
    /// A facet or dispatcher name is registered twice
    #[error("'{0}' is already registered")]
    DuplicateRegistration(String),
    /// The facet is already attached to the entity
    #[error("Facet '{facet}' is already attached to '{entity}'")]
    FacetAlreadyAttached {
        /// Entity name
        entity: String,
        /// Facet name
        facet: String,
    },
    /// The facet is not attached to the entity
    #[error("Facet '{facet}' is not attached to '{entity}'")]
    FacetNotAttached {
        /// Entity name
        entity: String,
        /// Facet name
        facet: String,
    },
    /// The entity has no slot for the property
    #[error("Entity '{entity}' has no property '{property}'")]
    MissingProperty {
        /// Entity name
        entity: String,
        /// Property name
        property: String,
    },
    /// A property name was interned again with another kind
    #[error("Property '{name}' is {existing:?}, not {requested:?}")]
    PropertyKindConflict {
        /// Property name
        name: String,
        /// Kind it was first interned with
        existing: PropertyKind,
        /// Kind requested now
        requested: PropertyKind,
    },
    /// A written value does not match the property's kind
    #[error("Property '{property}' expects {expected:?}, got {found:?}")]
    PropertyKindMismatch {
        /// Property name
        property: String,
        /// Interned kind
        expected: PropertyKind,
        /// Kind of the written value
        found: PropertyKind,
    },
    /// An operation was rejected and rolled back
    #[error("Configuration error on '{entity}': {reason}")]
    Configuration {
        /// Entity name
        entity: String,
        /// Why the operation was rejected
        reason: String,
    },
}

/// Recorded configuration problem
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Tick at which it was recorded
    pub tick: u64,
    /// Entity involved, if any
    pub entity: Option<EntityId>,
    /// Human-readable description
    pub message: String,
}

/// External systems the world talks to
pub struct Collaborators {
    /// Physics engine
    pub physics: Box<dyn PhysicsEngine>,
    /// Render message queue
    pub render: Box<dyn RenderMessageQueue>,
    /// Audio message queue
    pub audio: Box<dyn AudioMessageQueue>,
    /// Script evaluator, when scripting is available
    pub scripts: Option<Box<dyn ScriptHost>>,
}

impl Collaborators {
    /// In-memory collaborators without scripting
    pub fn headless() -> Self {
        Self {
            physics: Box::new(RecordingPhysics::new()),
            render: Box::new(RenderQueue::new()),
            audio: Box::new(AudioQueue::new()),
            scripts: None,
        }
    }

    /// Use a script host (builder pattern)
    pub fn with_scripts(mut self, host: Box<dyn ScriptHost>) -> Self {
        self.scripts = Some(host);
        self
    }
}

struct DispatcherEntry {
    behavior: Rc<dyn Facet>,
    intrinsic_facets: Vec<&'static str>,
}

/// Simulation context
pub struct World {
    publish_changes: bool,
    registry: PropertyRegistry,
    intrinsics: IntrinsicProperties,
    facets: HashMap<&'static str, Rc<dyn Facet>>,
    dispatchers: HashMap<&'static str, DispatcherEntry>,
    entities: SlotMap<EntityId, EntityState>,
    events: EventSystem,
    collaborators: Collaborators,
    diagnostics: Vec<Diagnostic>,
    tick: u64,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("entities", &self.entities.len())
            .field("facets", &self.facets.keys().collect::<Vec<_>>())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl World {
    /// Create a world with the plain [`EntityDispatcher`] registered
    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Result<Self, WorldError> {
        let mut registry = PropertyRegistry::new();
        let intrinsics = IntrinsicProperties::intern(&mut registry)?;
        let mut world = Self {
            publish_changes: config.publish_changes,
            registry,
            intrinsics,
            facets: HashMap::new(),
            dispatchers: HashMap::new(),
            entities: SlotMap::with_key(),
            events: EventSystem::new(),
            collaborators,
            diagnostics: Vec::new(),
            tick: 0,
        };
        world.register_dispatcher(EntityDispatcher)?;
        Ok(world)
    }

    /// Headless world with in-memory collaborators
    pub fn headless() -> Result<Self, WorldError> {
        Self::new(&EngineConfig::headless(), Collaborators::headless())
    }

    // ---- registries -------------------------------------------------------

    /// Property interning table
    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Mutable property interning table (facet construction)
    pub fn registry_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.registry
    }

    /// Properties every entity carries
    pub fn intrinsics(&self) -> IntrinsicProperties {
        self.intrinsics
    }

    /// Register a facet under its name
    pub fn register_facet<F: Facet + 'static>(&mut self, facet: F) -> Result<(), WorldError> {
        let name = facet.name();
        if self.facets.contains_key(name) || self.dispatchers.contains_key(name) {
            return Err(WorldError::DuplicateRegistration(name.to_string()));
        }
        log::debug!("Registered facet '{}'", name);
        self.facets.insert(name, Rc::new(facet));
        Ok(())
    }

    /// Register a dispatcher under its name
    pub fn register_dispatcher<D: Dispatcher + 'static>(&mut self, dispatcher: D) -> Result<(), WorldError> {
        let name = dispatcher.name();
        if self.facets.contains_key(name) || self.dispatchers.contains_key(name) {
            return Err(WorldError::DuplicateRegistration(name.to_string()));
        }
        let intrinsic_facets = dispatcher.intrinsic_facets();
        log::debug!("Registered dispatcher '{}' with facets {:?}", name, intrinsic_facets);
        self.dispatchers.insert(
            name,
            DispatcherEntry {
                behavior: Rc::new(dispatcher),
                intrinsic_facets,
            },
        );
        Ok(())
    }

    // ---- entities ---------------------------------------------------------

    /// Whether an entity exists
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    /// Live entities in storage order
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys()
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Entity display name (`"<dead>"` for unknown ids)
    pub fn entity_name(&self, entity: EntityId) -> &str {
        self.entities.get(entity).map_or("<dead>", |state| state.name.as_str())
    }

    /// Read-only entity state
    pub fn entity(&self, entity: EntityId) -> Option<&EntityState> {
        self.entities.get(entity)
    }

    fn state(&self, entity: EntityId) -> Result<&EntityState, WorldError> {
        self.entities.get(entity).ok_or(WorldError::UnknownEntity(entity))
    }

    /// Create an entity with a dispatcher and its intrinsic facets
    ///
    /// Properties are written first (intrinsic, dispatcher, then each facet
    /// on attach), then the dispatcher's `register` runs. Any failure
    /// destroys the half-built entity.
    pub fn create_entity(&mut self, dispatcher: &str, name: impl Into<String>) -> Result<EntityId, WorldError> {
        let entry = self
            .dispatchers
            .get(dispatcher)
            .ok_or_else(|| WorldError::UnknownDispatcher(dispatcher.to_string()))?;
        let behavior = Rc::clone(&entry.behavior);
        let intrinsic_facets = entry.intrinsic_facets.clone();

        let mut state = EntityState::new(name, behavior.name());
        for definition in self.intrinsics.definitions().into_iter().chain(behavior.properties()) {
            state.define_property(definition.id, definition.default, definition.always_publish);
        }
        let entity = self.entities.insert(state);

        let result = intrinsic_facets
            .iter()
            .try_for_each(|facet| self.attach_facet(entity, facet))
            .and_then(|()| behavior.register(entity, self));
        if let Err(e) = result {
            log::error!("Could not create '{}': {}", self.entity_name(entity), e);
            self.destroy_entity(entity)?;
            return Err(e);
        }
        if behavior.is_physical() {
            self.register_behavior_physics(entity, behavior.as_ref());
        }
        log::debug!("Created entity '{}' ({:?})", self.entity_name(entity), entity);
        Ok(entity)
    }

    /// Unregister every behavior and remove the entity
    pub fn destroy_entity(&mut self, entity: EntityId) -> Result<(), WorldError> {
        let behaviors = self.behaviors(entity)?;
        for behavior in behaviors.iter().rev() {
            self.unregister_behavior_physics(entity, behavior.as_ref());
            behavior.unregister(entity, self);
        }
        let removed = self.events.unsubscribe_entity(entity);
        let name = self.entities.remove(entity).map(|state| state.name).unwrap_or_default();
        log::debug!("Destroyed entity '{}' ({} subscriptions dropped)", name, removed);
        Ok(())
    }

    /// Dispatcher followed by attached facets, in attach order
    fn behaviors(&self, entity: EntityId) -> Result<Vec<Rc<dyn Facet>>, WorldError> {
        let state = self.state(entity)?;
        let mut behaviors = Vec::with_capacity(state.facets.len() + 1);
        if let Some(entry) = self.dispatchers.get(state.dispatcher) {
            behaviors.push(Rc::clone(&entry.behavior));
        }
        behaviors.extend(state.facets.iter().filter_map(|name| self.facets.get(name).cloned()));
        Ok(behaviors)
    }

    /// Names of the facets attached to an entity
    pub fn facets_of(&self, entity: EntityId) -> Vec<&'static str> {
        self.entities.get(entity).map(|state| state.facets.clone()).unwrap_or_default()
    }

    /// The facet implementing `name` on `entity`, resolved by name
    ///
    /// The entity's dispatcher also answers to its own name.
    pub fn facet_of(&self, entity: EntityId, name: &str) -> Option<Rc<dyn Facet>> {
        let state = self.entities.get(entity)?;
        if state.dispatcher == name {
            return self.dispatchers.get(name).map(|entry| Rc::clone(&entry.behavior));
        }
        if state.has_facet(name) {
            self.facets.get(name).cloned()
        } else {
            None
        }
    }

    /// Attach a registered facet
    ///
    /// Defaults are written only for absent properties. If the facet's
    /// `register` fails, the properties it added and the subscriptions it
    /// made are removed again.
    pub fn attach_facet(&mut self, entity: EntityId, name: &str) -> Result<(), WorldError> {
        let facet = self.facets.get(name).cloned().ok_or_else(|| WorldError::UnknownFacet(name.to_string()))?;
        let state = self.entities.get_mut(entity).ok_or(WorldError::UnknownEntity(entity))?;
        if state.has_facet(facet.name()) {
            return Err(WorldError::FacetAlreadyAttached {
                entity: state.name.clone(),
                facet: name.to_string(),
            });
        }

        let mut created = Vec::new();
        for definition in facet.properties() {
            if state.define_property(definition.id, definition.default, definition.always_publish) {
                created.push(definition.id);
            }
        }
        state.facets.push(facet.name());

        if let Err(e) = facet.register(entity, self) {
            self.events
                .unsubscribe_owned(|owner| owner.entity == entity && owner.facet == facet.name());
            if let Some(state) = self.entities.get_mut(entity) {
                state.facets.retain(|attached| *attached != facet.name());
                for id in created {
                    state.properties.remove(&id);
                }
            }
            self.report(Some(entity), format!("attaching '{}' failed: {}", facet.name(), e));
            return Err(e);
        }

        if facet.is_physical() {
            self.register_behavior_physics(entity, facet.as_ref());
        }
        log::debug!("Attached '{}' to '{}'", facet.name(), self.entity_name(entity));
        Ok(())
    }

    /// Detach a facet, removing properties no remaining behavior declares
    pub fn detach_facet(&mut self, entity: EntityId, name: &str) -> Result<(), WorldError> {
        let state = self.state(entity)?;
        let Some(facet) = self.facets.get(name).cloned().filter(|_| state.has_facet(name)) else {
            return Err(WorldError::FacetNotAttached {
                entity: state.name.clone(),
                facet: name.to_string(),
            });
        };

        self.unregister_behavior_physics(entity, facet.as_ref());
        facet.unregister(entity, self);
        self.events
            .unsubscribe_owned(|owner| owner.entity == entity && owner.facet == facet.name());

        if let Some(state) = self.entities.get_mut(entity) {
            state.facets.retain(|attached| *attached != facet.name());
        }
        let mut kept: HashSet<PropertyId> = self.intrinsics.definitions().iter().map(|d| d.id).collect();
        for behavior in self.behaviors(entity)? {
            kept.extend(behavior.properties().iter().map(|d| d.id));
        }
        if let Some(state) = self.entities.get_mut(entity) {
            for definition in facet.properties() {
                if !kept.contains(&definition.id) {
                    state.properties.remove(&definition.id);
                }
            }
        }
        log::debug!("Detached '{}' from '{}'", name, self.entity_name(entity));
        Ok(())
    }

    // ---- properties -------------------------------------------------------

    /// Raw value of a property
    pub fn get_value(&self, entity: EntityId, property: PropertyId) -> Option<&PropertyValue> {
        self.entities.get(entity)?.properties.get(&property).map(|slot| &slot.value)
    }

    /// Typed read
    pub fn get<T: PropertyType>(&self, entity: EntityId, property: Property<T>) -> Result<T, WorldError> {
        let state = self.state(entity)?;
        let slot = state.properties.get(&property.id()).ok_or_else(|| WorldError::MissingProperty {
            entity: state.name.clone(),
            property: self.registry.name(property.id()).to_string(),
        })?;
        T::from_value(&slot.value).ok_or_else(|| WorldError::PropertyKindMismatch {
            property: self.registry.name(property.id()).to_string(),
            expected: T::kind(),
            found: slot.value.kind(),
        })
    }

    /// Typed read that yields `None` for any failure
    pub fn try_get<T: PropertyType>(&self, entity: EntityId, property: Property<T>) -> Option<T> {
        self.get(entity, property).ok()
    }

    /// Typed write
    pub fn set<T: PropertyType>(&mut self, entity: EntityId, property: Property<T>, value: T) -> Result<(), WorldError> {
        self.set_value(entity, property.id(), value.into_value())
    }

    /// Write a raw value
    ///
    /// Every behavior on the entity may veto the write first; a veto is a
    /// configuration error that leaves the entity untouched. Writing an
    /// equal value is a no-op. Change events publish when global
    /// publication is on or the slot always publishes.
    pub fn set_value(&mut self, entity: EntityId, property: PropertyId, value: PropertyValue) -> Result<(), WorldError> {
        let state = self.state(entity)?;
        if let Some(expected) = self.registry.kind(property) {
            if expected != value.kind() {
                return Err(WorldError::PropertyKindMismatch {
                    property: self.registry.name(property).to_string(),
                    expected,
                    found: value.kind(),
                });
            }
        }
        if state.properties.get(&property).is_some_and(|slot| slot.value == value) {
            return Ok(());
        }

        for behavior in self.behaviors(entity)? {
            if let Err(reason) = behavior.validate(entity, property, &value, self) {
                let error = WorldError::Configuration {
                    entity: self.entity_name(entity).to_string(),
                    reason,
                };
                self.report(Some(entity), format!("rejected write to '{}': {}", self.registry.name(property), error));
                return Err(error);
            }
        }

        let Some(state) = self.entities.get_mut(entity) else {
            return Err(WorldError::UnknownEntity(entity));
        };
        let slot = state.properties.entry(property).or_insert_with(|| PropertySlot {
            value: value.clone(),
            always_publish: false,
        });
        let previous = if slot.value == value {
            None
        } else {
            Some(std::mem::replace(&mut slot.value, value.clone()))
        };
        let publish = self.publish_changes || slot.always_publish;

        let address = EventAddress::Change { property, entity };
        if publish && self.events.has_subscribers(&address) {
            let event = Event::new(address)
                .with_publisher(entity)
                .with_data(EventData::Change { previous, value });
            self.publish(event);
        }
        Ok(())
    }

    // ---- events -----------------------------------------------------------

    /// Current simulation tick
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Whether change events publish for every property
    pub fn publish_changes(&self) -> bool {
        self.publish_changes
    }

    /// Event system (subscription inspection)
    pub fn events(&self) -> &EventSystem {
        &self.events
    }

    /// Subscribe a callback to an address
    pub fn subscribe(
        &mut self,
        address: EventAddress,
        owner: Option<SubscriptionOwner>,
        callback: impl Fn(&Event, &mut World) -> Handling + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(address, owner, Rc::new(callback))
    }

    /// Remove one subscription
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Remove the subscriptions one facet made for one purpose
    pub fn unsubscribe_owned(&mut self, owner: SubscriptionOwner) -> usize {
        self.events.unsubscribe_owned(|candidate| *candidate == owner)
    }

    /// Deliver an event now to every subscriber until one resolves it
    pub fn publish(&mut self, mut event: Event) {
        event.tick = self.tick;
        for handler in self.events.handlers_for(&event.address) {
            if handler(&event, self) == Handling::Resolve {
                break;
            }
        }
    }

    /// Deliver an event `delay` ticks from now
    pub fn post(&mut self, event: Event, delay: u64) {
        self.events.post(self.tick + delay, event);
    }

    // ---- diagnostics ------------------------------------------------------

    /// Log and record a configuration problem
    pub fn report(&mut self, entity: Option<EntityId>, message: impl Into<String>) {
        let message = message.into();
        log::error!("[tick {}] {}: {}", self.tick, entity.map_or("world", |e| self.entity_name(e)), message);
        self.diagnostics.push(Diagnostic { tick: self.tick, entity, message });
    }

    /// Recorded configuration problems
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    // ---- collaborators ----------------------------------------------------

    /// Physics engine
    pub fn physics(&self) -> &dyn PhysicsEngine {
        self.collaborators.physics.as_ref()
    }

    /// Mutable physics engine
    pub fn physics_mut(&mut self) -> &mut dyn PhysicsEngine {
        self.collaborators.physics.as_mut()
    }

    /// Render message queue
    pub fn render_queue(&self) -> &dyn RenderMessageQueue {
        self.collaborators.render.as_ref()
    }

    /// Mutable render message queue
    pub fn render_queue_mut(&mut self) -> &mut dyn RenderMessageQueue {
        self.collaborators.render.as_mut()
    }

    /// Audio message queue
    pub fn audio(&self) -> &dyn AudioMessageQueue {
        self.collaborators.audio.as_ref()
    }

    /// Mutable audio message queue
    pub fn audio_mut(&mut self) -> &mut dyn AudioMessageQueue {
        self.collaborators.audio.as_mut()
    }

    /// Script host, when configured
    pub fn scripts_mut(&mut self) -> Option<&mut (dyn ScriptHost + 'static)> {
        self.collaborators.scripts.as_deref_mut()
    }

    // ---- physics ----------------------------------------------------------

    fn register_behavior_physics(&mut self, entity: EntityId, behavior: &dyn Facet) {
        behavior.register_physics(entity, self);
        if let Some(state) = self.entities.get_mut(entity) {
            state.physics_registered.push(behavior.name());
        }
    }

    fn unregister_behavior_physics(&mut self, entity: EntityId, behavior: &dyn Facet) {
        let registered = self
            .entities
            .get(entity)
            .is_some_and(|state| state.physics_registered.contains(&behavior.name()));
        if registered {
            behavior.unregister_physics(entity, self);
            if let Some(state) = self.entities.get_mut(entity) {
                state.physics_registered.retain(|name| *name != behavior.name());
            }
        }
    }

    /// Tear down and rebuild the physics of every physical behavior
    pub fn rebuild_physics(&mut self, entity: EntityId) -> Result<(), WorldError> {
        for behavior in self.behaviors(entity)? {
            if behavior.is_physical() {
                self.unregister_behavior_physics(entity, behavior.as_ref());
                self.register_behavior_physics(entity, behavior.as_ref());
            }
        }
        Ok(())
    }

    // ---- frame ------------------------------------------------------------

    fn enabled(&self, entity: EntityId) -> bool {
        self.try_get(entity, self.intrinsics.enabled).unwrap_or(false)
    }

    /// Advance one simulation tick
    ///
    /// Delivers due deferred events, publishes [`EventAddress::Update`], runs
    /// every enabled entity's `update` hooks, publishes
    /// [`EventAddress::PostUpdate`], then runs the `post_update` hooks.
    pub fn update(&mut self) {
        self.tick += 1;
        for event in self.events.take_due(self.tick) {
            self.publish(event);
        }

        self.publish(Event::new(EventAddress::Update));
        let entities: Vec<EntityId> = self.entities.keys().collect();
        for &entity in &entities {
            if !self.enabled(entity) {
                continue;
            }
            for behavior in self.behaviors(entity).unwrap_or_default() {
                if self.contains(entity) {
                    behavior.update(entity, self);
                }
            }
        }

        self.publish(Event::new(EventAddress::PostUpdate));
        for &entity in &entities {
            if !self.enabled(entity) {
                continue;
            }
            for behavior in self.behaviors(entity).unwrap_or_default() {
                if self.contains(entity) {
                    behavior.post_update(entity, self);
                }
            }
        }
    }

    /// Combined view of every behavior on an entity
    pub fn view_of(&self, entity: EntityId) -> View {
        self.behaviors(entity)
            .unwrap_or_default()
            .iter()
            .fold(View::none(), |view, behavior| view.and(behavior.actualize(entity, self)))
    }

    /// Tags an entity's behaviors currently expose
    pub fn view_tags(&self, entity: EntityId) -> Vec<(String, PropertyValue)> {
        self.view_of(entity).tags()
    }

    /// Actualize every visible entity's view into the queues
    pub fn actualize(&mut self) {
        let entities: Vec<EntityId> = self.entities.keys().collect();
        for entity in entities {
            if !self.try_get(entity, self.intrinsics.visible).unwrap_or(false) {
                continue;
            }
            let view = self.view_of(entity);
            let collaborators = &mut self.collaborators;
            actualize_view(view, collaborators.render.as_mut(), collaborators.audio.as_mut());
        }
    }

    /// One full frame: update then actualize
    pub fn frame(&mut self) {
        self.update();
        self.actualize();
    }
}
