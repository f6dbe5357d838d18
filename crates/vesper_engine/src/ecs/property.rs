//! Typed property storage
//!
//! Property names are interned once into stable [`PropertyId`]s; a
//! [`Property<T>`] couples an id with its value type so reads and writes go
//! through typed accessors instead of runtime casts. Values are stored as the
//! closed [`PropertyValue`] sum type, with [`Dynamic`] as the escape hatch
//! for user model types.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use super::entity::EntityId;
use super::world::WorldError;
use crate::foundation::math::{Vec2, Vec3};
use crate::render::render_queue::AssetTag;

/// Interned property name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u32);

impl PropertyId {
    /// Raw index into the registry
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Value kind a property name is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// `bool`
    Bool,
    /// `i64`
    Int,
    /// `f32`
    Float,
    /// [`Vec2`]
    Vec2,
    /// [`Vec3`]
    Vec3,
    /// `String`
    Str,
    /// RGBA color
    Color,
    /// [`AssetTag`]
    Asset,
    /// Optional entity reference
    Entity,
    /// User type wrapped in [`Dynamic`]
    Custom(TypeId),
}

/// Stored property value
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f32),
    /// 2D vector
    Vec2(Vec2),
    /// 3D vector
    Vec3(Vec3),
    /// String
    Str(String),
    /// RGBA color
    Color([f32; 4]),
    /// Asset reference
    Asset(AssetTag),
    /// Optional entity reference
    Entity(Option<EntityId>),
    /// Shared user value; compared by identity
    Custom(Rc<dyn Any>),
}

impl PropertyValue {
    /// Kind of this value
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::Int(_) => PropertyKind::Int,
            Self::Float(_) => PropertyKind::Float,
            Self::Vec2(_) => PropertyKind::Vec2,
            Self::Vec3(_) => PropertyKind::Vec3,
            Self::Str(_) => PropertyKind::Str,
            Self::Color(_) => PropertyKind::Color,
            Self::Asset(_) => PropertyKind::Asset,
            Self::Entity(_) => PropertyKind::Entity,
            Self::Custom(value) => PropertyKind::Custom(Any::type_id(&**value)),
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Vec2(a), Self::Vec2(b)) => a == b,
            (Self::Vec3(a), Self::Vec3(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Color(a), Self::Color(b)) => a == b,
            (Self::Asset(a), Self::Asset(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Shared user value stored in a [`PropertyValue::Custom`] slot
#[derive(Debug)]
pub struct Dynamic<T>(pub Rc<T>);

impl<T> Dynamic<T> {
    /// Wrap a value
    pub fn new(value: T) -> Self {
        Self(Rc::new(value))
    }
}

impl<T> Clone for Dynamic<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> std::ops::Deref for Dynamic<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Rust types that can live in a property slot
pub trait PropertyType: Clone + 'static {
    /// Kind the type maps to
    fn kind() -> PropertyKind;
    /// Wrap into a stored value
    fn into_value(self) -> PropertyValue;
    /// Read back from a stored value of the right kind
    fn from_value(value: &PropertyValue) -> Option<Self>;
}

macro_rules! property_type {
    ($ty:ty, $variant:ident) => {
        impl PropertyType for $ty {
            fn kind() -> PropertyKind {
                PropertyKind::$variant
            }

            fn into_value(self) -> PropertyValue {
                PropertyValue::$variant(self)
            }

            fn from_value(value: &PropertyValue) -> Option<Self> {
                match value {
                    PropertyValue::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

property_type!(bool, Bool);
property_type!(i64, Int);
property_type!(f32, Float);
property_type!(Vec2, Vec2);
property_type!(Vec3, Vec3);
property_type!(String, Str);
property_type!([f32; 4], Color);
property_type!(AssetTag, Asset);
property_type!(Option<EntityId>, Entity);

impl<T: 'static> PropertyType for Dynamic<T> {
    fn kind() -> PropertyKind {
        PropertyKind::Custom(TypeId::of::<T>())
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::Custom(self.0)
    }

    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Custom(inner) => Rc::clone(inner).downcast::<T>().ok().map(Dynamic),
            _ => None,
        }
    }
}

/// Typed handle to an interned property
#[derive(Debug)]
pub struct Property<T> {
    id: PropertyId,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Property<T> {}

impl<T: PropertyType> Property<T> {
    /// Interned id
    pub fn id(self) -> PropertyId {
        self.id
    }

    /// Declare this property with a default value
    pub fn define(self, default: T) -> PropertyDefinition {
        PropertyDefinition {
            id: self.id,
            default: default.into_value(),
            always_publish: false,
        }
    }

    /// Declare this property with a default value, always publishing changes
    pub fn define_published(self, default: T) -> PropertyDefinition {
        PropertyDefinition {
            always_publish: true,
            ..self.define(default)
        }
    }
}

/// A property a facet or dispatcher needs, with its default
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    /// Property
    pub id: PropertyId,
    /// Default written on attach when the slot is absent
    pub default: PropertyValue,
    /// Publish changes regardless of the global flag
    pub always_publish: bool,
}

/// Interning table for property names
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    ids: HashMap<String, PropertyId>,
    entries: Vec<(String, PropertyKind)>,
}

impl PropertyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name` for values of type `T`
    ///
    /// Interning an existing name returns the same id; interning it with a
    /// different kind is a schema error.
    pub fn intern<T: PropertyType>(&mut self, name: &str) -> Result<Property<T>, WorldError> {
        let id = self.intern_kind(name, T::kind())?;
        Ok(Property { id, marker: PhantomData })
    }

    /// Intern `name` for values of `kind`
    pub fn intern_kind(&mut self, name: &str, kind: PropertyKind) -> Result<PropertyId, WorldError> {
        if let Some(id) = self.ids.get(name) {
            let existing = self.entries[id.index()].1;
            if existing != kind {
                return Err(WorldError::PropertyKindConflict {
                    name: name.to_string(),
                    existing,
                    requested: kind,
                });
            }
            return Ok(*id);
        }
        let id = PropertyId(self.entries.len() as u32);
        self.entries.push((name.to_string(), kind));
        self.ids.insert(name.to_string(), id);
        log::trace!("Interned property '{}' as {:?} ({:?})", name, id, kind);
        Ok(id)
    }

    /// Id of an already interned name
    pub fn lookup(&self, name: &str) -> Option<PropertyId> {
        self.ids.get(name).copied()
    }

    /// Name behind an id
    pub fn name(&self, id: PropertyId) -> &str {
        self.entries.get(id.index()).map_or("<unknown>", |(name, _)| name.as_str())
    }

    /// Kind behind an id
    pub fn kind(&self, id: PropertyId) -> Option<PropertyKind> {
        self.entries.get(id.index()).map(|(_, kind)| *kind)
    }
}

/// Properties every entity carries
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicProperties {
    /// World position; always publishes
    pub position: Property<Vec2>,
    /// Size
    pub size: Property<Vec2>,
    /// Rotation in radians
    pub rotation: Property<f32>,
    /// Draw-order priority; always publishes
    pub elevation: Property<f32>,
    /// Whether the entity is drawn
    pub visible: Property<bool>,
    /// Whether the entity reacts to input and updates
    pub enabled: Property<bool>,
}

impl IntrinsicProperties {
    /// Intern the intrinsic names
    pub fn intern(registry: &mut PropertyRegistry) -> Result<Self, WorldError> {
        Ok(Self {
            position: registry.intern("position")?,
            size: registry.intern("size")?,
            rotation: registry.intern("rotation")?,
            elevation: registry.intern("elevation")?,
            visible: registry.intern("visible")?,
            enabled: registry.intern("enabled")?,
        })
    }

    /// Definitions written into every new entity
    pub fn definitions(&self) -> Vec<PropertyDefinition> {
        vec![
            self.position.define_published(Vec2::zeros()),
            self.size.define(Vec2::new(1.0, 1.0)),
            self.rotation.define(0.0),
            self.elevation.define_published(0.0),
            self.visible.define(true),
            self.enabled.define(true),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Score(u32);

    #[test]
    fn test_interning_is_stable_and_kind_checked() {
        let mut registry = PropertyRegistry::new();
        let speed: Property<f32> = registry.intern("speed").unwrap();
        let again: Property<f32> = registry.intern("speed").unwrap();
        assert_eq!(speed.id(), again.id());
        assert_eq!(registry.name(speed.id()), "speed");

        let err = registry.intern::<bool>("speed").unwrap_err();
        assert!(matches!(
            err,
            WorldError::PropertyKindConflict { existing: PropertyKind::Float, requested: PropertyKind::Bool, .. }
        ));
    }

    #[test]
    fn test_dynamic_round_trip_and_identity() {
        let score = Dynamic::new(Score(3));
        let value = score.clone().into_value();
        assert_eq!(value.kind(), Dynamic::<Score>::kind());
        let back = Dynamic::<Score>::from_value(&value).unwrap();
        assert_eq!(*back, Score(3));
        assert!(Dynamic::<String>::from_value(&value).is_none());

        assert_eq!(value, score.clone().into_value());
        assert_ne!(value, Dynamic::new(Score(3)).into_value());
    }

    #[test]
    fn test_typed_reads_reject_other_kinds() {
        assert_eq!(f32::from_value(&PropertyValue::Float(2.0)), Some(2.0));
        assert_eq!(f32::from_value(&PropertyValue::Int(2)), None);
        assert_eq!(<Option<EntityId>>::from_value(&PropertyValue::Entity(None)), Some(None));
    }
}
