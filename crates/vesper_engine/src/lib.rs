//! # Vesper Engine
//!
//! Core of a 2D/3D game engine: a physically based rendering asset pipeline
//! and a capability-composition entity model.
//!
//! ## Features
//!
//! - **PBR Asset Pipeline**: mesh extraction, five-channel materials, static
//!   model assembly and instanced batch drawing behind a GPU device trait
//! - **Facets**: named behaviors attached to entities at runtime, each with
//!   its own typed properties and lifecycle hooks
//! - **Elm-style Dispatch**: closure-configured model/message/command/view
//!   behaviors with depth-first signal routing
//! - **Headless**: every GPU and physics call can be recorded for tests and
//!   servers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vesper_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::headless();
//!     let mut world = World::new(&config, Collaborators::headless())?;
//!     register_builtins(&mut world)?;
//!
//!     let player = world.create_entity(EntityDispatcher::NAME, "player")?;
//!     world.attach_facet(player, SpriteFacet::NAME)?;
//!     world.frame();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod audio;
pub mod config;
pub mod ecs;
pub mod events;
pub mod foundation;
pub mod physics;
pub mod render;
pub mod view;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        audio::{AudioMessage, AudioMessageQueue, AudioQueue},
        config::{Config, EngineConfig},
        ecs::{
            facets::{
                register_builtins, ButtonFacet, JointFacet, NodeFacet, ParticleEmitterFacet, RigidBodyFacet,
                ScriptFacet, ScriptHost, SpriteFacet, StaticModelFacet, TextFacet, TileMapFacet,
            },
            Collaborators, Dispatcher, Dynamic, ElmBehavior, EntityDispatcher, EntityId, Facet, Property,
            PropertyValue, Signal, World, WorldError,
        },
        events::{Event, EventAddress, EventData, Handling, SubscriptionOwner},
        foundation::math::{Box3, Mat4, Vec2, Vec3},
        physics::{PhysicsEngine, RecordingPhysics},
        render::{
            AssetTag, Camera, GpuDevice, ObjImporter, PbrRenderer, RecordingDevice, RenderQueue, StaticModel,
        },
        view::View,
    };
}
