//! Elm-style behavior
//!
//! [`ElmBehavior`] is a configuration struct of closures: `init` builds the
//! model, `message` folds messages into it, `command` applies side effects,
//! `view` describes it, and bindings turn events into signals. The same value
//! works as a facet or, with intrinsic facets, as a dispatcher.

use std::any::Any;
use std::rc::Rc;

use super::entity::EntityId;
use super::facet::{Dispatcher, Facet};
use super::property::{Dynamic, PropertyDefinition, PropertyRegistry};
use super::signal::{process_dynamic, process_signals, CommandHandler, MessageHandler, ModelLens, Signal};
use super::world::{World, WorldError};
use crate::events::{Event, EventAddress, Handling, SubscriptionOwner};
use crate::view::View;

type AddressFn = Rc<dyn Fn(EntityId) -> EventAddress>;

enum BindingHandler<M, C> {
    Typed(Rc<dyn Fn(&Event) -> Option<Signal<M, C>>>),
    Dynamic(Rc<dyn Fn(&Event) -> Option<Box<dyn Any>>>),
}

impl<M, C> Clone for BindingHandler<M, C> {
    fn clone(&self) -> Self {
        match self {
            Self::Typed(handler) => Self::Typed(Rc::clone(handler)),
            Self::Dynamic(handler) => Self::Dynamic(Rc::clone(handler)),
        }
    }
}

struct Binding<M, C> {
    address: AddressFn,
    handler: BindingHandler<M, C>,
}

/// Signal router for one behavior: its handlers plus where its model lives
pub struct Router<Model, M, C> {
    lens: ModelLens<Model>,
    message: Rc<MessageHandler<Model, M, C>>,
    command: Rc<CommandHandler<Model, M, C>>,
}

impl<Model, M, C> Clone for Router<Model, M, C> {
    fn clone(&self) -> Self {
        Self {
            lens: self.lens,
            message: Rc::clone(&self.message),
            command: Rc::clone(&self.command),
        }
    }
}

impl<Model: Clone + 'static, M: 'static, C: 'static> Router<Model, M, C> {
    /// Process signals for `subject`, depth first
    pub fn process(&self, signals: Vec<Signal<M, C>>, subject: EntityId, world: &mut World) {
        process_signals(self.message.as_ref(), self.command.as_ref(), self.lens, signals, subject, world);
    }

    /// Process a runtime-typed signal; returns whether it was recognized
    pub fn process_any(&self, value: Box<dyn Any>, subject: EntityId, world: &mut World) -> bool {
        process_dynamic(self.message.as_ref(), self.command.as_ref(), self.lens, value, subject, world)
    }

    /// Where the model lives
    pub fn lens(&self) -> ModelLens<Model> {
        self.lens
    }
}

/// Closure-configured model/message/command/view behavior
pub struct ElmBehavior<Model, M, C> {
    name: &'static str,
    init: Rc<dyn Fn() -> Model>,
    router: Router<Model, M, C>,
    view: Rc<dyn Fn(&Model, EntityId, &World) -> View>,
    bindings: Vec<Binding<M, C>>,
    intrinsic_facets: Vec<&'static str>,
}

impl<Model: Clone + 'static, M: 'static, C: 'static> ElmBehavior<Model, M, C> {
    /// Behavior whose model is stored in the `<name>Model` property
    ///
    /// Messages default to leaving the model unchanged, commands to doing
    /// nothing, and the view to nothing.
    pub fn new(
        name: &'static str,
        registry: &mut PropertyRegistry,
        init: impl Fn() -> Model + 'static,
    ) -> Result<Self, WorldError> {
        let property = registry.intern::<Dynamic<Model>>(&format!("{name}Model"))?;
        Ok(Self {
            name,
            init: Rc::new(init),
            router: Router {
                lens: ModelLens::new(property),
                message: Rc::new(|model: &Model, _: M, _: EntityId, _: &World| (Vec::new(), model.clone())),
                command: Rc::new(|_: &Model, _: C, _: EntityId, _: &mut World| Vec::new()),
            },
            view: Rc::new(|_: &Model, _: EntityId, _: &World| View::none()),
            bindings: Vec::new(),
            intrinsic_facets: Vec::new(),
        })
    }

    /// Set the message handler (builder pattern)
    #[must_use]
    pub fn on_message(
        mut self,
        message: impl Fn(&Model, M, EntityId, &World) -> (Vec<Signal<M, C>>, Model) + 'static,
    ) -> Self {
        self.router.message = Rc::new(message);
        self
    }

    /// Set the command handler (builder pattern)
    #[must_use]
    pub fn on_command(mut self, command: impl Fn(&Model, C, EntityId, &mut World) -> Vec<Signal<M, C>> + 'static) -> Self {
        self.router.command = Rc::new(command);
        self
    }

    /// Set the view (builder pattern)
    #[must_use]
    pub fn with_view(mut self, view: impl Fn(&Model, EntityId, &World) -> View + 'static) -> Self {
        self.view = Rc::new(view);
        self
    }

    /// Turn events at an address into signals (builder pattern)
    ///
    /// `address` receives the subject so bindings can target the entity itself.
    #[must_use]
    pub fn bind(
        mut self,
        address: impl Fn(EntityId) -> EventAddress + 'static,
        handler: impl Fn(&Event) -> Option<Signal<M, C>> + 'static,
    ) -> Self {
        self.bindings.push(Binding {
            address: Rc::new(address),
            handler: BindingHandler::Typed(Rc::new(handler)),
        });
        self
    }

    /// Bind events to runtime-typed signals (builder pattern)
    ///
    /// Values that are not an `M`, `C` or `Signal<M, C>` are logged and dropped.
    #[must_use]
    pub fn bind_any(
        mut self,
        address: impl Fn(EntityId) -> EventAddress + 'static,
        handler: impl Fn(&Event) -> Option<Box<dyn Any>> + 'static,
    ) -> Self {
        self.bindings.push(Binding {
            address: Rc::new(address),
            handler: BindingHandler::Dynamic(Rc::new(handler)),
        });
        self
    }

    /// Facets attached when used as a dispatcher (builder pattern)
    #[must_use]
    pub fn with_intrinsic_facets(mut self, facets: Vec<&'static str>) -> Self {
        self.intrinsic_facets = facets;
        self
    }

    /// Signal router of this behavior
    pub fn router(&self) -> Router<Model, M, C> {
        self.router.clone()
    }

    /// Current model of `subject`
    pub fn model(&self, subject: EntityId, world: &World) -> Option<Model> {
        self.router.lens.get(subject, world)
    }

    /// Process signals for `subject`
    pub fn signal(&self, subject: EntityId, world: &mut World, signals: Vec<Signal<M, C>>) {
        self.router.process(signals, subject, world);
    }
}

impl<Model: Clone + 'static, M: 'static, C: 'static> Facet for ElmBehavior<Model, M, C> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![self.router.lens.property().define(Dynamic::new((self.init)()))]
    }

    fn register(&self, entity: EntityId, world: &mut World) -> Result<(), WorldError> {
        let owner = SubscriptionOwner {
            entity,
            facet: self.name,
            channel: "binding",
        };
        for binding in &self.bindings {
            let router = self.router.clone();
            let handler = binding.handler.clone();
            world.subscribe((binding.address)(entity), Some(owner), move |event, world| {
                match &handler {
                    BindingHandler::Typed(handler) => {
                        if let Some(signal) = handler(event) {
                            router.process(vec![signal], entity, world);
                        }
                    }
                    BindingHandler::Dynamic(handler) => {
                        if let Some(value) = handler(event) {
                            router.process_any(value, entity, world);
                        }
                    }
                }
                Handling::Cascade
            });
        }
        Ok(())
    }

    fn actualize(&self, entity: EntityId, world: &World) -> View {
        match self.model(entity, world) {
            Some(model) => (self.view)(&model, entity, world),
            None => View::none(),
        }
    }
}

impl<Model: Clone + 'static, M: 'static, C: 'static> Dispatcher for ElmBehavior<Model, M, C> {
    fn intrinsic_facets(&self) -> Vec<&'static str> {
        self.intrinsic_facets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::property::PropertyValue;

    #[derive(Debug, Clone, PartialEq)]
    enum CounterMessage {
        Increment,
        Reset,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum CounterCommand {
        Hide,
    }

    fn counter(world: &mut World) -> ElmBehavior<i64, CounterMessage, CounterCommand> {
        let visible = world.intrinsics().visible;
        ElmBehavior::new("Counter", world.registry_mut(), || 0)
            .unwrap()
            .on_message(|count, message, _, _| match message {
                CounterMessage::Increment if *count >= 2 => (vec![Signal::Command(CounterCommand::Hide)], count + 1),
                CounterMessage::Increment => (Vec::new(), count + 1),
                CounterMessage::Reset => (Vec::new(), 0),
            })
            .on_command(move |_, CounterCommand::Hide, entity, world| {
                world.set(entity, visible, false).unwrap();
                Vec::new()
            })
            .with_view(|count, _, _| View::Tag("count".into(), PropertyValue::Int(*count)))
            .bind(|entity| EventAddress::entity("Click", entity), |_| Some(Signal::Message(CounterMessage::Increment)))
            .bind_any(|_| EventAddress::global("Reset"), |event| match event.value() {
                Some(PropertyValue::Bool(true)) => Some(Box::new(CounterMessage::Reset) as Box<dyn Any>),
                _ => Some(Box::new("not a counter signal") as Box<dyn Any>),
            })
    }

    #[test]
    fn test_bindings_drive_the_model() {
        let mut world = World::headless().unwrap();
        let behavior = counter(&mut world);
        world.register_dispatcher(behavior).unwrap();
        let entity = world.create_entity("Counter", "counter").unwrap();

        for _ in 0..2 {
            world.publish(Event::new(EventAddress::entity("Click", entity)));
        }
        assert_eq!(world.view_tags(entity), vec![("count".to_string(), PropertyValue::Int(2))]);
        assert!(world.get(entity, world.intrinsics().visible).unwrap());

        world.publish(Event::new(EventAddress::entity("Click", entity)));
        assert!(!world.get(entity, world.intrinsics().visible).unwrap());

        // a value of the wrong type is dropped without touching the model
        world.publish(Event::new(EventAddress::global("Reset")));
        assert_eq!(world.view_tags(entity), vec![("count".to_string(), PropertyValue::Int(3))]);

        let reset = Event::new(EventAddress::global("Reset")).with_data(crate::events::EventData::Value(PropertyValue::Bool(true)));
        world.publish(reset);
        assert_eq!(world.view_tags(entity), vec![("count".to_string(), PropertyValue::Int(0))]);
    }

    #[test]
    fn test_each_entity_gets_its_own_model() {
        let mut world = World::headless().unwrap();
        let behavior = counter(&mut world);
        let router = behavior.router();
        world.register_facet(behavior).unwrap();

        let a = world.create_entity("Entity", "a").unwrap();
        let b = world.create_entity("Entity", "b").unwrap();
        world.attach_facet(a, "Counter").unwrap();
        world.attach_facet(b, "Counter").unwrap();

        router.process(vec![Signal::Message(CounterMessage::Increment)], a, &mut world);
        assert_eq!(router.lens().get(a, &world), Some(1));
        assert_eq!(router.lens().get(b, &world), Some(0));

        world.detach_facet(a, "Counter").unwrap();
        assert_eq!(router.lens().get(a, &world), None);
        assert_eq!(world.events().subscription_count(), 2);
    }
}
