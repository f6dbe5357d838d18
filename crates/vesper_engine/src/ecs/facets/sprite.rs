//! Sprite facet

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{IntrinsicProperties, Property, PropertyDefinition};
use crate::ecs::world::{World, WorldError};
use crate::foundation::math::Vec2;
use crate::render::render_queue::{AssetTag, LayeredDescriptor, RenderDescriptor, SpriteDescriptor};
use crate::view::View;

/// Draws a static image over the entity's bounds
#[derive(Debug, Clone, Copy)]
pub struct SpriteFacet {
    /// Image asset
    pub static_image: Property<AssetTag>,
    /// Tint color
    pub color: Property<[f32; 4]>,
    /// Mirror horizontally
    pub flip_h: Property<bool>,
    /// Mirror vertically
    pub flip_v: Property<bool>,
    intrinsics: IntrinsicProperties,
}

impl SpriteFacet {
    /// Registered name
    pub const NAME: &'static str = "Sprite";

    /// Intern the sprite properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            static_image: registry.intern("static_image")?,
            color: registry.intern("color")?,
            flip_h: registry.intern("flip_h")?,
            flip_v: registry.intern("flip_v")?,
            intrinsics,
        })
    }
}

impl Facet for SpriteFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.static_image.define(AssetTag::new("Default", "Image")),
            self.color.define([1.0; 4]),
            self.flip_h.define(false),
            self.flip_v.define(false),
        ]
    }

    fn actualize(&self, entity: EntityId, world: &World) -> View {
        let (Some(position), Some(asset)) = (
            world.try_get(entity, self.intrinsics.position),
            world.try_get(entity, self.static_image),
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
                rotation: world.try_get(entity, self.intrinsics.rotation).unwrap_or(0.0),
                color: world.try_get(entity, self.color).unwrap_or([1.0; 4]),
                flip_h: world.try_get(entity, self.flip_h).unwrap_or(false),
                flip_v: world.try_get(entity, self.flip_v).unwrap_or(false),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::facet::EntityDispatcher;
    use crate::render::render_queue::RenderQueue;

    #[test]
    fn test_sprites_sort_by_elevation_then_y() {
        let mut world = World::headless().unwrap();
        let sprite = SpriteFacet::new(&mut world).unwrap();
        world.register_facet(sprite).unwrap();
        let intrinsics = world.intrinsics();

        let mut spawn = |name: &str, y: f32, elevation: f32| {
            let entity = world.create_entity(EntityDispatcher::NAME, name).unwrap();
            world.attach_facet(entity, SpriteFacet::NAME).unwrap();
            world.set(entity, intrinsics.position, Vec2::new(0.0, y)).unwrap();
            world.set(entity, intrinsics.elevation, elevation).unwrap();
            world.set(entity, sprite.static_image, AssetTag::new("Gameplay", name)).unwrap();
            entity
        };
        spawn("top", 5.0, 1.0);
        spawn("far", 9.0, 0.0);
        let hidden = spawn("hidden", 0.0, 0.0);
        spawn("near", 1.0, 0.0);
        world.set(hidden, intrinsics.visible, false).unwrap();

        world.actualize();
        let queue = world.render_queue_mut().as_any_mut().downcast_mut::<RenderQueue>().unwrap();
        let names: Vec<String> = queue.drain_layered().layered.into_iter().map(|l| l.asset.name).collect();
        assert_eq!(names, vec!["near", "far", "top"]);
    }
}
