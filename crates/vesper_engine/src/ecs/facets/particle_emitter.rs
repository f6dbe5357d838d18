//! Particle emitter facet
//!
//! Partial: particles are emitted and aged on update and drawn on
//! actualize. There is no registration behavior and particles do not
//! collide.

use crate::ecs::entity::EntityId;
use crate::ecs::facet::Facet;
use crate::ecs::property::{Dynamic, IntrinsicProperties, Property, PropertyDefinition};
use crate::ecs::world::{World, WorldError};
use crate::foundation::math::Vec2;
use crate::render::render_queue::{AssetTag, LayeredDescriptor, ParticlesDescriptor, RenderDescriptor};
use crate::view::View;

/// Golden angle in radians; spreads successive emissions evenly
const EMISSION_ANGLE_STEP: f32 = 2.399_963;

/// One live particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Current position
    pub position: Vec2,
    /// Displacement per tick
    pub velocity: Vec2,
    /// Ticks lived so far
    pub age: i64,
}

/// Emitter state kept on the entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleState {
    /// Live particles, oldest first
    pub particles: Vec<Particle>,
    /// Particles emitted since creation
    pub emitted: u64,
}

/// Particle emitter capability
#[derive(Debug, Clone, Copy)]
pub struct ParticleEmitterFacet {
    /// Particles emitted per tick
    pub emission_rate: Property<i64>,
    /// Ticks a particle lives
    pub particle_lifetime: Property<i64>,
    /// Upper bound on live particles
    pub max_particles: Property<i64>,
    /// Distance a particle travels per tick
    pub particle_speed: Property<f32>,
    /// Size of every particle
    pub particle_size: Property<Vec2>,
    /// Particle image
    pub particle_image: Property<AssetTag>,
    /// Live particle state
    pub particle_state: Property<Dynamic<ParticleState>>,
    intrinsics: IntrinsicProperties,
}

impl ParticleEmitterFacet {
    /// Registered name
    pub const NAME: &'static str = "ParticleEmitter";

    /// Intern the emitter properties
    pub fn new(world: &mut World) -> Result<Self, WorldError> {
        let intrinsics = world.intrinsics();
        let registry = world.registry_mut();
        Ok(Self {
            emission_rate: registry.intern("emission_rate")?,
            particle_lifetime: registry.intern("particle_lifetime")?,
            max_particles: registry.intern("max_particles")?,
            particle_speed: registry.intern("particle_speed")?,
            particle_size: registry.intern("particle_size")?,
            particle_image: registry.intern("particle_image")?,
            particle_state: registry.intern("particle_state")?,
            intrinsics,
        })
    }

    /// Age, move and expire particles, then emit new ones at the entity center
    pub fn step(&self, state: &ParticleState, origin: Vec2, rate: usize, lifetime: i64, max: usize, speed: f32) -> ParticleState {
        let mut particles: Vec<Particle> = state
            .particles
            .iter()
            .map(|particle| Particle {
                position: particle.position + particle.velocity,
                age: particle.age + 1,
                ..*particle
            })
            .filter(|particle| particle.age < lifetime)
            .collect();

        let room = max.saturating_sub(particles.len());
        let mut emitted = state.emitted;
        for _ in 0..rate.min(room) {
            let angle = emitted as f32 * EMISSION_ANGLE_STEP;
            particles.push(Particle {
                position: origin,
                velocity: Vec2::new(angle.cos(), angle.sin()) * speed,
                age: 0,
            });
            emitted += 1;
        }
        ParticleState { particles, emitted }
    }
}

impl Facet for ParticleEmitterFacet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            self.emission_rate.define(1),
            self.particle_lifetime.define(60),
            self.max_particles.define(64),
            self.particle_speed.define(0.05),
            self.particle_size.define(Vec2::new(0.1, 0.1)),
            self.particle_image.define(AssetTag::new("Default", "Particle")),
            self.particle_state.define(Dynamic::new(ParticleState::default())),
        ]
    }

    fn update(&self, entity: EntityId, world: &mut World) {
        let Some(state) = world.try_get(entity, self.particle_state) else {
            return;
        };
        let origin = world.try_get(entity, self.intrinsics.position).unwrap_or_else(Vec2::zeros)
            + world.try_get(entity, self.intrinsics.size).unwrap_or_else(Vec2::zeros) * 0.5;
        let rate = usize::try_from(world.try_get(entity, self.emission_rate).unwrap_or(0)).unwrap_or(0);
        let max = usize::try_from(world.try_get(entity, self.max_particles).unwrap_or(0)).unwrap_or(0);
        let lifetime = world.try_get(entity, self.particle_lifetime).unwrap_or(0);
        let speed = world.try_get(entity, self.particle_speed).unwrap_or(0.0);

        let next = self.step(&state, origin, rate, lifetime, max, speed);
        if let Err(e) = world.set(entity, self.particle_state, Dynamic::new(next)) {
            log::warn!("Could not store particles of '{}': {}", world.entity_name(entity), e);
        }
    }

    fn actualize(&self, entity: EntityId, world: &World) -> View {
        let (Some(state), Some(asset)) = (
            world.try_get(entity, self.particle_state),
            world.try_get(entity, self.particle_image),
        ) else {
            return View::none();
        };
        if state.particles.is_empty() {
            return View::none();
        }
        View::Render(LayeredDescriptor {
            elevation: world.try_get(entity, self.intrinsics.elevation).unwrap_or(0.0),
            sort_key: world.try_get(entity, self.intrinsics.position).map_or(0.0, |position| position.y),
            asset,
            descriptor: RenderDescriptor::Particles(ParticlesDescriptor {
                positions: state.particles.iter().map(|particle| particle.position).collect(),
                size: world.try_get(entity, self.particle_size).unwrap_or_else(|| Vec2::new(0.1, 0.1)),
                color: [1.0; 4],
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::facet::EntityDispatcher;

    #[test]
    fn test_particles_emit_age_and_expire() {
        let mut world = World::headless().unwrap();
        let facet = ParticleEmitterFacet::new(&mut world).unwrap();
        world.register_facet(facet).unwrap();
        let fountain = world.create_entity(EntityDispatcher::NAME, "fountain").unwrap();
        world.attach_facet(fountain, ParticleEmitterFacet::NAME).unwrap();
        world.set(fountain, facet.emission_rate, 2).unwrap();
        world.set(fountain, facet.particle_lifetime, 3).unwrap();
        world.set(fountain, facet.max_particles, 5).unwrap();
        assert!(world.view_of(fountain).is_empty());

        let live = |world: &World| world.get(fountain, facet.particle_state).unwrap().particles.len();
        world.update();
        assert_eq!(live(&world), 2);
        world.update();
        assert_eq!(live(&world), 4);
        world.update();
        // capped at five live particles
        assert_eq!(live(&world), 5);
        world.update();
        // the first two reached their lifetime
        assert_eq!(live(&world), 5);
        assert!(matches!(world.view_of(fountain), View::Render(_)));
    }

    #[test]
    fn test_step_moves_particles_by_velocity() {
        let mut world = World::headless().unwrap();
        let facet = ParticleEmitterFacet::new(&mut world).unwrap();
        let first = facet.step(&ParticleState::default(), Vec2::new(1.0, 1.0), 1, 10, 10, 1.0);
        assert_eq!(first.particles[0].velocity, Vec2::new(1.0, 0.0));
        let second = facet.step(&first, Vec2::zeros(), 0, 10, 10, 1.0);
        assert_eq!(second.particles[0].position, Vec2::new(2.0, 1.0));
        assert_eq!(second.emitted, 1);
    }
}
