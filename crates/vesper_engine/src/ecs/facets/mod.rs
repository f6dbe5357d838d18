//! Built-in facets
//!
//! - [`node::NodeFacet`]: parent/child transform hierarchy
//! - [`rigid_body::RigidBodyFacet`], [`joint::JointFacet`]: physics bodies and constraints
//! - [`sprite::SpriteFacet`], [`text::TextFacet`], [`tile_map::TileMapFacet`],
//!   [`particle_emitter::ParticleEmitterFacet`], [`static_model::StaticModelFacet`]: drawables
//! - [`button::ButtonFacet`]: gui widget
//! - [`script::ScriptFacet`]: scripted hooks through a [`script::ScriptHost`]

pub mod button;
pub mod joint;
pub mod node;
pub mod particle_emitter;
pub mod rigid_body;
pub mod script;
pub mod sprite;
pub mod static_model;
pub mod text;
pub mod tile_map;

pub use button::ButtonFacet;
pub use joint::JointFacet;
pub use node::NodeFacet;
pub use particle_emitter::ParticleEmitterFacet;
pub use rigid_body::RigidBodyFacet;
pub use script::{ScriptFacet, ScriptHost};
pub use sprite::SpriteFacet;
pub use static_model::StaticModelFacet;
pub use text::TextFacet;
pub use tile_map::TileMapFacet;

use super::world::{World, WorldError};

/// Register every built-in facet with a world
pub fn register_builtins(world: &mut World) -> Result<(), WorldError> {
    let node = NodeFacet::new(world)?;
    world.register_facet(node)?;
    let rigid_body = RigidBodyFacet::new(world)?;
    world.register_facet(rigid_body)?;
    let joint = JointFacet::new(world)?;
    world.register_facet(joint)?;
    let sprite = SpriteFacet::new(world)?;
    world.register_facet(sprite)?;
    let text = TextFacet::new(world)?;
    world.register_facet(text)?;
    let tile_map = TileMapFacet::new(world)?;
    world.register_facet(tile_map)?;
    let particle_emitter = ParticleEmitterFacet::new(world)?;
    world.register_facet(particle_emitter)?;
    let script = ScriptFacet::new(world)?;
    world.register_facet(script)?;
    let button = ButtonFacet::new(world)?;
    world.register_facet(button)?;
    let static_model = StaticModelFacet::new(world)?;
    world.register_facet(static_model)?;
    log::info!("Registered built-in facets");
    Ok(())
}
