//! Entity model
//!
//! Entities are generational ids into the [`world::World`]; behavior comes
//! from named facets attached at runtime and from each entity's dispatcher.
//! Properties are interned once and accessed through typed handles.

pub mod elm;
pub mod entity;
pub mod facet;
pub mod facets;
pub mod property;
pub mod signal;
pub mod world;

#[cfg(test)]
mod tests;

pub use elm::{ElmBehavior, Router};
pub use entity::{EntityId, EntityState};
pub use facet::{Dispatcher, EntityDispatcher, Facet};
pub use property::{Dynamic, IntrinsicProperties, Property, PropertyId, PropertyRegistry, PropertyValue};
pub use signal::{process_signal, process_signals, ModelLens, RoutedSignal, Signal};
pub use world::{Collaborators, Diagnostic, World, WorldError};
