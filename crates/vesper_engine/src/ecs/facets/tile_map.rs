//! Tile map facet
//!
//! Each layer draws at its own elevation, `layer * clearance` above the
//! entity. With physics registered, the map gets one static box body
//! covering its bounds.

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{IntrinsicProperties, Property, PropertyDefinition};
use crate::ecs::world::{World, WorldError};
use crate::foundation::math::Vec2;
use crate::physics::{BodyId, BodyProperties, BodyShape, BodyType, CollisionLayers};
use crate::render::render_queue::{AssetTag, LayeredDescriptor, RenderDescriptor, TileLayerDescriptor};
use crate::view::View;

/// Layered tile map capability
#[derive(Debug, Clone, Copy)]
pub struct TileMapFacet {
    /// Tile map asset
    pub tile_map: Property<AssetTag>,
    /// Number of layers in the map
    pub tile_layer_count: Property<i64>,
    /// Elevation between consecutive layers
    pub tile_layer_clearance: Property<f32>,
    intrinsics: IntrinsicProperties,
}

impl TileMapFacet {
    /// Registered name
    pub const NAME: &'static str = "TileMap";

    /// Index of the map's static body
    pub const BODY_INDEX: i64 = 0;

    /// Intern the tile map properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            tile_map: registry.intern("tile_map")?,
            tile_layer_count: registry.intern("tile_layer_count")?,
            tile_layer_clearance: registry.intern("tile_layer_clearance")?,
            intrinsics,
        })
    }

    fn body(entity: EntityId) -> BodyId {
        BodyId {
            source: entity,
            index: Self::BODY_INDEX,
        }
    }
}

impl Facet for TileMapFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.tile_map.define(AssetTag::new("Default", "TileMap")),
            self.tile_layer_count.define(1),
            self.tile_layer_clearance.define(2.0),
        ]
    }

    fn actualize(&self, entity: EntityId, world: &World) -> View {
        let (Some(asset), Some(position)) = (
            world.try_get(entity, self.tile_map),
            world.try_get(entity, self.intrinsics.position),
        ) else {
            return View::none();
        };
        let size = world.try_get(entity, self.intrinsics.size).unwrap_or_else(|| Vec2::new(1.0, 1.0));
        let elevation = world.try_get(entity, self.intrinsics.elevation).unwrap_or(0.0);
        let clearance = world.try_get(entity, self.tile_layer_clearance).unwrap_or(2.0);
        let layers = usize::try_from(world.try_get(entity, self.tile_layer_count).unwrap_or(1)).unwrap_or(0);

        View::Views(
            (0..layers)
                .map(|layer| {
                    View::Render(LayeredDescriptor {
                        elevation: elevation + layer as f32 * clearance,
                        sort_key: position.y,
                        asset: asset.clone(),
                        descriptor: RenderDescriptor::TileLayer(TileLayerDescriptor { layer, position, size }),
                    })
                })
                .collect(),
        )
    }

    fn is_physical(&self) -> bool {
        true
    }

    fn register_physics(&self, entity: EntityId, world: &mut World) {
        let size = world.try_get(entity, self.intrinsics.size).unwrap_or_else(|| Vec2::new(1.0, 1.0));
        let position = world.try_get(entity, self.intrinsics.position).unwrap_or_else(Vec2::zeros);
        let properties = BodyProperties {
            position: position + size * 0.5,
            scale: size,
            shape: BodyShape::default(),
            body_type: BodyType::Static,
            collision_categories: CollisionLayers::ENVIRONMENT,
            ..BodyProperties::default()
        };
        world.physics_mut().create_body(entity, Self::body(entity), properties);
    }

    fn unregister_physics(&self, entity: EntityId, world: &mut World) {
        world.physics_mut().destroy_body(Self::body(entity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::facet::EntityDispatcher;
    use crate::physics::RecordingPhysics;

    #[test]
    fn test_layers_stack_by_clearance() {
        let mut world = World::headless().unwrap();
        let facet = TileMapFacet::new(&mut world).unwrap();
        world.register_facet(facet).unwrap();
        let field = world.create_entity(EntityDispatcher::NAME, "field").unwrap();
        world.attach_facet(field, TileMapFacet::NAME).unwrap();
        world.set(field, facet.tile_layer_count, 3).unwrap();
        world.set(field, world.intrinsics().elevation, 1.0).unwrap();

        let View::Views(views) = world.view_of(field) else {
            panic!("expected one view per layer");
        };
        let elevations: Vec<f32> = views
            .iter()
            .filter_map(|view| match view {
                View::Render(layered) => Some(layered.elevation),
                _ => None,
            })
            .collect();
        assert_eq!(elevations, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_static_body_spans_the_map() {
        let mut world = World::headless().unwrap();
        let facet = TileMapFacet::new(&mut world).unwrap();
        world.register_facet(facet).unwrap();
        let field = world.create_entity(EntityDispatcher::NAME, "field").unwrap();
        world.set(field, world.intrinsics().size, Vec2::new(32.0, 16.0)).unwrap();
        world.attach_facet(field, TileMapFacet::NAME).unwrap();

        let physics = world.physics().as_any().downcast_ref::<RecordingPhysics>().unwrap();
        let body = physics.body(TileMapFacet::body(field)).unwrap();
        assert_eq!(body.body_type, BodyType::Static);
        assert_eq!(body.position, Vec2::new(16.0, 8.0));

        world.destroy_entity(field).unwrap();
        let physics = world.physics().as_any().downcast_ref::<RecordingPhysics>().unwrap();
        assert_eq!(physics.body_count(), 0);
    }
}
