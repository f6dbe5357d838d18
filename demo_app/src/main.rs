//! Headless demo application
//!
//! Builds a world without a graphics context, runs a small Elm-style counter
//! with a mounted child sprite for a few frames, registers a procedural cube
//! as a static model and logs what the renderer would draw.

use vesper_engine::config::{Config, EngineConfig};
use vesper_engine::ecs::facets::{self, NodeFacet, SpriteFacet, StaticModelFacet, TextFacet};
use vesper_engine::ecs::{Collaborators, ElmBehavior, EntityDispatcher, Signal, World, WorldError};
use vesper_engine::events::EventAddress;
use vesper_engine::foundation::logging;
use vesper_engine::foundation::math::{Mat4, Vec2, Vec3};
use vesper_engine::render::render_queue::{RenderDescriptor, RenderQueue};
use vesper_engine::render::{
    cube_geometry, AssetTag, Camera, ImageBasedLighting, Material, PbrRenderer, RecordingDevice, ShaderError,
    StaticModel,
};

const FRAMES: usize = 3;

/// Demo failures
#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("World error: {0}")]
    World(#[from] WorldError),

    #[error("Renderer error: {0}")]
    Renderer(#[from] ShaderError),
}

#[derive(Debug, Clone, Copy)]
enum CounterMessage {
    Tick,
}

#[derive(Debug, Clone, Copy)]
enum CounterCommand {
    ShowCount,
}

fn register_counter(world: &mut World) -> Result<(), WorldError> {
    let text = TextFacet::new(world)?;
    let counter = ElmBehavior::new("Counter", world.registry_mut(), || 0_i64)?
        .on_message(|count, CounterMessage::Tick, _, _| (vec![Signal::Command(CounterCommand::ShowCount)], count + 1))
        .on_command(move |count, CounterCommand::ShowCount, entity, world| {
            if let Err(e) = world.set(entity, text.text, format!("Count: {count}")) {
                log::warn!("Could not update counter text: {}", e);
            }
            Vec::new()
        })
        .bind(|_| EventAddress::Update, |_| Some(Signal::Message(CounterMessage::Tick)))
        .with_intrinsic_facets(vec![NodeFacet::NAME, TextFacet::NAME]);
    world.register_dispatcher(counter)
}

fn build_world(config: &EngineConfig) -> Result<World, WorldError> {
    let mut world = World::new(config, Collaborators::headless())?;
    facets::register_builtins(&mut world)?;
    register_counter(&mut world)?;
    let node = NodeFacet::new(&mut world)?;
    let model = StaticModelFacet::new(&mut world)?;
    let position = world.intrinsics().position;

    let counter = world.create_entity("Counter", "counter")?;
    world.set(counter, position, Vec2::new(4.0, 2.0))?;

    let badge = world.create_entity(EntityDispatcher::NAME, "badge")?;
    world.attach_facet(badge, NodeFacet::NAME)?;
    world.attach_facet(badge, SpriteFacet::NAME)?;
    world.set(badge, node.position_local, Vec2::new(0.5, -1.0))?;
    world.set(badge, node.parent_node, Some(counter))?;

    let cube = world.create_entity(EntityDispatcher::NAME, "cube")?;
    world.attach_facet(cube, StaticModelFacet::NAME)?;
    world.set(cube, model.static_model, AssetTag::new("Demo", "Cube"))?;
    world.set(cube, world.intrinsics().elevation, 1.0)?;
    Ok(world)
}

fn run(config: &EngineConfig) -> Result<(), DemoError> {
    let mut world = build_world(config)?;
    for _ in 0..FRAMES {
        world.frame();
    }
    log::info!("Ran {} frames ({} entities)", world.tick(), world.entity_count());

    let mut device = RecordingDevice::new();
    let mut renderer = PbrRenderer::new(&mut device, config, ImageBasedLighting::default())?;
    let cube = StaticModel::from_descriptor(config.renderable, &mut device, &cube_geometry(), Material::default());
    let vertices = cube.surfaces().first().map_or(0, |surface| surface.geometry().vertices().len());
    log::info!("Procedural cube: {} CPU-side vertices, bounds {:?}", vertices, cube.bounds());
    renderer.insert_model(&mut device, AssetTag::new("Demo", "Cube"), cube);

    let frame = match world.render_queue_mut().as_any_mut().downcast_mut::<RenderQueue>() {
        Some(queue) => queue.drain_layered(),
        None => {
            log::warn!("Render queue is not inspectable");
            return Ok(());
        }
    };
    for layered in &frame.layered {
        let kind = match &layered.descriptor {
            RenderDescriptor::Sprite(_) => "sprite",
            RenderDescriptor::Text(_) => "text",
            RenderDescriptor::TileLayer(_) => "tile layer",
            RenderDescriptor::Particles(_) => "particles",
            RenderDescriptor::StaticModel(_) => "static model",
        };
        log::info!(
            "draw {:<12} {:<16} elevation {:>4.1} sort {:>5.2}",
            kind,
            layered.asset.to_string(),
            layered.elevation,
            layered.sort_key
        );
    }

    let camera = Camera {
        eye: Vec3::new(0.0, 0.0, 10.0),
        view: Mat4::new_translation(&Vec3::new(0.0, 0.0, -10.0)),
        projection: Mat4::new_perspective(16.0 / 9.0, std::f32::consts::FRAC_PI_4, 0.1, 100.0),
    };
    let batches = renderer.render_frame(&mut device, &frame, &camera, &[])?;
    log::info!(
        "{} layered draws, {} model batches, {} GPU calls recorded",
        frame.layered.len(),
        batches,
        device.calls().len()
    );
    renderer.destroy(&mut device);
    Ok(())
}

fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "engine.toml".to_string());
    let config = EngineConfig {
        renderable: false,
        ..EngineConfig::load_or_default(&path)
    };
    logging::init(&config.log_filter);
    log::info!("Starting headless demo");

    if let Err(e) = run(&config) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}
