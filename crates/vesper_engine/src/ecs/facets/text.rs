//! Text facet

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{IntrinsicProperties, Property, PropertyDefinition};
use crate::ecs::world::{World, WorldError};
use crate::foundation::math::Vec2;
use crate::render::render_queue::{AssetTag, LayeredDescriptor, RenderDescriptor, TextDescriptor};
use crate::view::View;

/// Draws a string inside the entity's bounds
#[derive(Debug, Clone, Copy)]
pub struct TextFacet {
    /// Displayed text
    pub text: Property<String>,
    /// Font asset
    pub font: Property<AssetTag>,
    /// Text color
    pub text_color: Property<[f32; 4]>,
    intrinsics: IntrinsicProperties,
}

impl TextFacet {
    /// Registered name
    pub const NAME: &'static str = "Text";

    /// Intern the text properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            text: registry.intern("text")?,
            font: registry.intern("font")?,
            text_color: registry.intern("text_color")?,
            intrinsics,
        })
    }
}

impl Facet for TextFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.text.define(String::new()),
            self.font.define(AssetTag::new("Default", "Font")),
            self.text_color.define([1.0, 1.0, 1.0, 1.0]),
        ]
    }

    fn actualize(&self, entity: EntityId, world: &World) -> View {
        let (Some(text), Some(font), Some(position)) = (
            world.try_get(entity, self.text),
            world.try_get(entity, self.font),
            world.try_get(entity, self.intrinsics.position),
        ) else {
            return View::none();
        };
        if text.is_empty() {
            return View::none();
        }
        View::Render(LayeredDescriptor {
            elevation: world.try_get(entity, self.intrinsics.elevation).unwrap_or(0.0),
            sort_key: position.y,
            asset: font,
            descriptor: RenderDescriptor::Text(TextDescriptor {
                text,
                position,
                size: world.try_get(entity, self.intrinsics.size).unwrap_or_else(|| Vec2::new(1.0, 1.0)),
                color: world.try_get(entity, self.text_color).unwrap_or([1.0; 4]),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::facet::EntityDispatcher;

    #[test]
    fn test_empty_text_draws_nothing() {
        let mut world = World::headless().unwrap();
        let facet = TextFacet::new(&mut world).unwrap();
        world.register_facet(facet).unwrap();
        let label = world.create_entity(EntityDispatcher::NAME, "label").unwrap();
        world.attach_facet(label, TextFacet::NAME).unwrap();
        assert!(world.view_of(label).is_empty());

        world.set(label, facet.text, "Score: 3".to_string()).unwrap();
        match world.view_of(label) {
            View::Render(LayeredDescriptor { descriptor: RenderDescriptor::Text(text), asset, .. }) => {
                assert_eq!(text.text, "Score: 3");
                assert_eq!(asset, AssetTag::new("Default", "Font"));
            }
            other => panic!("unexpected view {other:?}"),
        }
    }
}
