//! Button gui widget
//!
//! Listens for the input layer's mouse events. Pressing inside the button
//! sets `down`; releasing while down clears it and, when released inside,
//! publishes [`ButtonFacet::CLICK_EVENT`] at the button and plays the click
//! sound.

use crate::audio::AudioMessage;
use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{Dynamic, IntrinsicProperties, Property, PropertyDefinition, PropertyValue};
use crate::ecs::world::{World, WorldError};
use crate::events::{Event, EventAddress, EventData, Handling, SubscriptionOwner};
use crate::foundation::math::Vec2;
use crate::render::render_queue::{AssetTag, LayeredDescriptor, RenderDescriptor, SpriteDescriptor};
use crate::view::View;

/// Clickable widget
#[derive(Debug, Clone, Copy)]
pub struct ButtonFacet {
    /// Whether the button is held down
    pub down: Property<bool>,
    /// Image while released
    pub up_image: Property<AssetTag>,
    /// Image while held
    pub down_image: Property<AssetTag>,
    /// Sound played on click
    pub click_sound: Property<Dynamic<Option<AssetTag>>>,
    /// Volume of the click sound
    pub click_sound_volume: Property<f32>,
    intrinsics: IntrinsicProperties,
}

impl ButtonFacet {
    /// Registered name
    pub const NAME: &'static str = "Button";
    /// Global event published by the input layer; payload is the mouse position
    pub const MOUSE_LEFT_DOWN: &'static str = "MouseLeftDown";
    /// Global event published by the input layer; payload is the mouse position
    pub const MOUSE_LEFT_UP: &'static str = "MouseLeftUp";
    /// Entity event published at the button when clicked
    pub const CLICK_EVENT: &'static str = "Click";

    /// Intern the button properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            down: registry.intern("down")?,
            up_image: registry.intern("up_image")?,
            down_image: registry.intern("down_image")?,
            click_sound: registry.intern("click_sound")?,
            click_sound_volume: registry.intern("click_sound_volume")?,
            intrinsics,
        })
    }

    /// Whether a point lies within the entity's bounds
    pub fn contains(&self, entity: EntityId, point: Vec2, world: &World) -> bool {
        let (Some(position), Some(size)) = (
            world.try_get(entity, self.intrinsics.position),
            world.try_get(entity, self.intrinsics.size),
        ) else {
            return false;
        };
        point.x >= position.x && point.y >= position.y && point.x < position.x + size.x && point.y < position.y + size.y
    }

    fn interactive(&self, entity: EntityId, world: &World) -> bool {
        world.try_get(entity, self.intrinsics.enabled).unwrap_or(false)
            && world.try_get(entity, self.intrinsics.visible).unwrap_or(false)
    }

    fn mouse_position(event: &Event) -> Option<Vec2> {
        match event.value() {
            Some(PropertyValue::Vec2(position)) => Some(*position),
            _ => None,
        }
    }

    fn on_mouse_down(&self, entity: EntityId, event: &Event, world: &mut World) -> Handling {
        let Some(point) = Self::mouse_position(event) else {
            return Handling::Cascade;
        };
        if !self.interactive(entity, world) || !self.contains(entity, point, world) {
            return Handling::Cascade;
        }
        if let Err(e) = world.set(entity, self.down, true) {
            log::warn!("Could not press '{}': {}", world.entity_name(entity), e);
        }
        Handling::Resolve
    }

    fn on_mouse_up(&self, entity: EntityId, event: &Event, world: &mut World) -> Handling {
        let Some(point) = Self::mouse_position(event) else {
            return Handling::Cascade;
        };
        if !world.try_get(entity, self.down).unwrap_or(false) {
            return Handling::Cascade;
        }
        if let Err(e) = world.set(entity, self.down, false) {
            log::warn!("Could not release '{}': {}", world.entity_name(entity), e);
        }
        if !self.interactive(entity, world) || !self.contains(entity, point, world) {
            return Handling::Cascade;
        }

        if let Some(sound) = world.try_get(entity, self.click_sound).and_then(|sound| (*sound).clone()) {
            let volume = world.try_get(entity, self.click_sound_volume).unwrap_or(1.0);
            world.audio_mut().enqueue(AudioMessage::PlaySound { volume, sound });
        }
        let click = Event::new(EventAddress::entity(Self::CLICK_EVENT, entity))
            .with_publisher(entity)
            .with_data(EventData::Value(PropertyValue::Vec2(point)));
        world.publish(click);
        Handling::Resolve
    }
}

impl Facet for ButtonFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.down.define(false),
            self.up_image.define(AssetTag::new("Default", "ButtonUp")),
            self.down_image.define(AssetTag::new("Default", "ButtonDown")),
            self.click_sound.define(Dynamic::new(None)),
            self.click_sound_volume.define(1.0),
        ]
    }

    fn register(&self, entity: EntityId, world: &mut World) -> Result<(), WorldError> {
        let owner = SubscriptionOwner {
            entity,
            facet: Self::NAME,
            channel: "mouse",
        };
        let button = *self;
        world.subscribe(EventAddress::global(Self::MOUSE_LEFT_DOWN), Some(owner), move |event, world| {
            button.on_mouse_down(entity, event, world)
        });
        world.subscribe(EventAddress::global(Self::MOUSE_LEFT_UP), Some(owner), move |event, world| {
            button.on_mouse_up(entity, event, world)
        });
        Ok(())
    }

    fn actualize(&self, entity: EntityId, world: &World) -> View {
        let down = world.try_get(entity, self.down).unwrap_or(false);
        let image = if down { self.down_image } else { self.up_image };
        let (Some(asset), Some(position)) = (
            world.try_get(entity, image),
            world.try_get(entity, self.intrinsics.position),
        ) else {
            return View::none();
        };
        View::Render(LayeredDescriptor {
            elevation: world.try_get(entity, self.intrinsics.elevation).unwrap_or(0.0),
            sort_key: position.y,
            asset,
            descriptor: RenderDescriptor::Sprite(SpriteDescriptor {
                position,
                size: world.try_get(entity, self.intrinsics.size).unwrap_or_else(|| Vec2::new(1.0, 1.0)),
                rotation: 0.0,
                color: [1.0; 4],
                flip_h: false,
                flip_v: false,
            }),
        })
    }
}
