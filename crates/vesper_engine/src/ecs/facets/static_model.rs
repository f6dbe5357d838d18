//! Static model facet: draws a loaded 3D model at the entity's transform

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{IntrinsicProperties, Property, PropertyDefinition};
use crate::ecs::world::{World, WorldError};
use crate::foundation::math::{Mat4, Vec2, Vec3};
use crate::render::render_queue::{AssetTag, LayeredDescriptor, RenderDescriptor, StaticModelDescriptor};
use crate::view::View;

/// 3D model capability
#[derive(Debug, Clone, Copy)]
pub struct StaticModelFacet {
    /// Model asset
    pub static_model: Property<AssetTag>,
    /// Draw with alpha blending
    pub model_blending: Property<bool>,
    intrinsics: IntrinsicProperties,
}

impl StaticModelFacet {
    /// Registered name
    pub const NAME: &'static str = "StaticModel";

    /// Intern the static model properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            static_model: registry.intern("static_model")?,
            model_blending: registry.intern("model_blending")?,
            intrinsics,
        })
    }

    /// Translation in the XY plane, then rotation about Z
    pub fn instance_transform(position: Vec2, rotation: f32) -> Mat4 {
        Mat4::new_translation(&Vec3::new(position.x, position.y, 0.0)) * Mat4::new_rotation(Vec3::new(0.0, 0.0, rotation))
    }
}

impl Facet for StaticModelFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.static_model.define(AssetTag::new("Default", "StaticModel")),
            self.model_blending.define(false),
        ]
    }

    fn actualize(&self, entity: EntityId, world: &World) -> View {
        let (Some(asset), Some(position)) = (
            world.try_get(entity, self.static_model),
            world.try_get(entity, self.intrinsics.position),
        ) else {
            return View::none();
        };
        let rotation = world.try_get(entity, self.intrinsics.rotation).unwrap_or(0.0);
        View::Render(LayeredDescriptor {
            elevation: world.try_get(entity, self.intrinsics.elevation).unwrap_or(0.0),
            sort_key: position.y,
            asset,
            descriptor: RenderDescriptor::StaticModel(StaticModelDescriptor {
                transform: Self::instance_transform(position, rotation),
                blending: world.try_get(entity, self.model_blending).unwrap_or(false),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::facet::EntityDispatcher;
    use approx::assert_relative_eq;

    #[test]
    fn test_model_view_carries_the_entity_transform() {
        let mut world = World::headless().unwrap();
        let facet = StaticModelFacet::new(&mut world).unwrap();
        world.register_facet(facet).unwrap();
        let teapot = world.create_entity(EntityDispatcher::NAME, "teapot").unwrap();
        world.attach_facet(teapot, StaticModelFacet::NAME).unwrap();
        world.set(teapot, world.intrinsics().position, Vec2::new(2.0, 3.0)).unwrap();
        world.set(teapot, world.intrinsics().rotation, std::f32::consts::FRAC_PI_2).unwrap();

        let View::Render(layered) = world.view_of(teapot) else {
            panic!("expected a render view");
        };
        let RenderDescriptor::StaticModel(model) = layered.descriptor else {
            panic!("expected a static model");
        };
        let moved = model.transform.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved, nalgebra::Point3::new(2.0, 4.0, 0.0), epsilon = 1e-5);
        assert_eq!(layered.sort_key, 3.0);
    }
}
