//! Signal routing
//!
//! Messages fold a model into a new model; commands act on the world. Both
//! may emit further signals, which are processed depth first, left to right:
//! everything produced by a signal is fully resolved before its next sibling.

use std::any::Any;

use super::entity::EntityId;
use super::property::{Dynamic, Property};
use super::world::World;

/// A message (pure model update) or command (world side effect)
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<M, C> {
    /// Folded into the model
    Message(M),
    /// Executed against the world
    Command(C),
}

/// A runtime-typed signal resolved against a subject's signal types
#[derive(Debug)]
pub enum RoutedSignal<M, C> {
    /// Recognized signal
    Signal(Signal<M, C>),
    /// Neither a message nor a command of the subject
    Unhandled(Box<dyn Any>),
}

impl<M: 'static, C: 'static> RoutedSignal<M, C> {
    /// Match a boxed value against `Signal<M, C>`, `M` and `C`
    pub fn route(value: Box<dyn Any>) -> Self {
        let value = match value.downcast::<Signal<M, C>>() {
            Ok(signal) => return Self::Signal(*signal),
            Err(value) => value,
        };
        let value = match value.downcast::<M>() {
            Ok(message) => return Self::Signal(Signal::Message(*message)),
            Err(value) => value,
        };
        match value.downcast::<C>() {
            Ok(command) => Self::Signal(Signal::Command(*command)),
            Err(value) => Self::Unhandled(value),
        }
    }
}

/// Message handler: `(model, message, subject, world) -> (signals, model')`
pub type MessageHandler<Model, M, C> = dyn Fn(&Model, M, EntityId, &World) -> (Vec<Signal<M, C>>, Model);

/// Command handler: `(model, command, subject, world) -> signals`
pub type CommandHandler<Model, M, C> = dyn Fn(&Model, C, EntityId, &mut World) -> Vec<Signal<M, C>>;

/// Where a subject's model lives
#[derive(Debug)]
pub struct ModelLens<Model> {
    property: Property<Dynamic<Model>>,
}

impl<Model> Clone for ModelLens<Model> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Model> Copy for ModelLens<Model> {}

impl<Model: Clone + 'static> ModelLens<Model> {
    /// Lens over a model property
    pub fn new(property: Property<Dynamic<Model>>) -> Self {
        Self { property }
    }

    /// Backing property
    pub fn property(self) -> Property<Dynamic<Model>> {
        self.property
    }

    /// Current model of `subject`
    pub fn get(self, subject: EntityId, world: &World) -> Option<Model> {
        world.try_get(subject, self.property).map(|model| (*model).clone())
    }

    /// Replace the model of `subject`
    pub fn set(self, subject: EntityId, world: &mut World, model: Model) {
        if let Err(e) = world.set(subject, self.property, Dynamic::new(model)) {
            log::warn!("Could not write model of '{}': {}", world.entity_name(subject), e);
        }
    }
}

/// Process one signal and everything it produces
///
/// A message's new model is written back before the signals it produced are
/// processed, so each child sees its parent's result.
pub fn process_signal<Model: Clone + 'static, M, C>(
    message: &MessageHandler<Model, M, C>,
    command: &CommandHandler<Model, M, C>,
    lens: ModelLens<Model>,
    signal: Signal<M, C>,
    subject: EntityId,
    world: &mut World,
) {
    let Some(model) = lens.get(subject, world) else {
        log::warn!("Dropping signal for '{}': no model", world.entity_name(subject));
        return;
    };
    let produced = match signal {
        Signal::Message(msg) => {
            let (produced, model) = message(&model, msg, subject, world);
            lens.set(subject, world, model);
            produced
        }
        Signal::Command(cmd) => command(&model, cmd, subject, world),
    };
    process_signals(message, command, lens, produced, subject, world);
}

/// Process signals in order, each fully before the next
pub fn process_signals<Model: Clone + 'static, M, C>(
    message: &MessageHandler<Model, M, C>,
    command: &CommandHandler<Model, M, C>,
    lens: ModelLens<Model>,
    signals: Vec<Signal<M, C>>,
    subject: EntityId,
    world: &mut World,
) {
    for signal in signals {
        process_signal(message, command, lens, signal, subject, world);
    }
}

/// Route a runtime-typed signal; unrecognized values are logged and dropped
pub fn process_dynamic<Model: Clone + 'static, M: 'static, C: 'static>(
    message: &MessageHandler<Model, M, C>,
    command: &CommandHandler<Model, M, C>,
    lens: ModelLens<Model>,
    value: Box<dyn Any>,
    subject: EntityId,
    world: &mut World,
) -> bool {
    match RoutedSignal::<M, C>::route(value) {
        RoutedSignal::Signal(signal) => {
            process_signal(message, command, lens, signal, subject, world);
            true
        }
        RoutedSignal::Unhandled(_) => {
            log::warn!(
                "Unhandled signal for '{}': expected {} or {}",
                world.entity_name(subject),
                std::any::type_name::<M>(),
                std::any::type_name::<C>()
            );
            false
        }
    }
}
