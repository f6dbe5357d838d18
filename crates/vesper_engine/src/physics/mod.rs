//! Physics collaborator interface
//!
//! The capability engine describes bodies and joints and hands them to a
//! [`PhysicsEngine`]; body dynamics and collision resolution live behind the
//! trait. [`RecordingPhysics`] is the headless implementation used by tests
//! and the demo driver.

use std::any::Any;
use std::collections::HashMap;

use crate::ecs::entity::EntityId;
use crate::foundation::math::Vec2;

/// Collision category bits
pub struct CollisionLayers;

impl CollisionLayers {
    /// No collision layer
    pub const NONE: u32 = 0;
    /// All collision layers
    pub const ALL: u32 = 0xFFFF_FFFF;
    /// Static environment geometry
    pub const ENVIRONMENT: u32 = 1 << 0;
    /// Player-controlled bodies
    pub const PLAYER: u32 = 1 << 1;
    /// Trigger volumes (no physical response)
    pub const TRIGGER: u32 = 1 << 2;
}

/// Body identity: owning entity plus a per-entity index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId {
    /// Entity owning the body
    pub source: EntityId,
    /// Index distinguishing several bodies of one entity
    pub index: i64,
}

/// Joint identity: owning entity plus a per-entity index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId {
    /// Entity owning the joint
    pub source: EntityId,
    /// Index distinguishing several joints of one entity
    pub index: i64,
}

/// How a body moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// Never moves
    Static,
    /// Moved by velocity only
    Kinematic,
    /// Fully simulated
    #[default]
    Dynamic,
}

/// Collision shape, relative to the body center in unit space
#[derive(Debug, Clone, PartialEq)]
pub enum BodyShape {
    /// Axis-aligned box
    Box {
        /// Full extent
        extent: Vec2,
        /// Offset from the body center
        center: Vec2,
    },
    /// Circle
    Circle {
        /// Radius
        radius: f32,
        /// Offset from the body center
        center: Vec2,
    },
    /// Vertical capsule
    Capsule {
        /// Height of the straight section
        height: f32,
        /// Cap radius
        radius: f32,
        /// Offset from the body center
        center: Vec2,
    },
    /// Convex polygon
    Polygon {
        /// Vertices, counter-clockwise
        vertices: Vec<Vec2>,
        /// Offset from the body center
        center: Vec2,
    },
    /// Compound shape
    Shapes(Vec<BodyShape>),
}

impl Default for BodyShape {
    fn default() -> Self {
        Self::Box {
            extent: Vec2::new(1.0, 1.0),
            center: Vec2::zeros(),
        }
    }
}

/// Everything needed to create a body
#[derive(Debug, Clone, PartialEq)]
pub struct BodyProperties {
    /// World position
    pub position: Vec2,
    /// Rotation in radians
    pub rotation: f32,
    /// Size the unit-space shape is scaled by
    pub scale: Vec2,
    /// Collision shape
    pub shape: BodyShape,
    /// Motion type
    pub body_type: BodyType,
    /// Mass (dynamic bodies)
    pub mass: f32,
    /// Surface friction
    pub friction: f32,
    /// Bounciness
    pub restitution: f32,
    /// Gravity multiplier
    pub gravity_scale: f32,
    /// Linear damping
    pub linear_damping: f32,
    /// Prevent rotation
    pub fixed_rotation: bool,
    /// Whether the body takes part in simulation
    pub enabled: bool,
    /// Layers the body belongs to
    pub collision_categories: u32,
    /// Layers the body collides with
    pub collision_mask: u32,
}

impl Default for BodyProperties {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            rotation: 0.0,
            scale: Vec2::new(1.0, 1.0),
            shape: BodyShape::default(),
            body_type: BodyType::default(),
            mass: 1.0,
            friction: 0.2,
            restitution: 0.0,
            gravity_scale: 1.0,
            linear_damping: 0.0,
            fixed_rotation: false,
            enabled: true,
            collision_categories: CollisionLayers::ALL,
            collision_mask: CollisionLayers::ALL,
        }
    }
}

/// Kind of constraint between two bodies
#[derive(Debug, Clone, PartialEq)]
pub enum JointDevice {
    /// Keep two anchor points at a fixed distance
    Distance {
        /// First body
        body_a: BodyId,
        /// Second body
        body_b: BodyId,
        /// Rest length
        length: f32,
    },
    /// Pin two bodies together at an anchor, free to rotate
    Revolute {
        /// First body
        body_a: BodyId,
        /// Second body
        body_b: BodyId,
        /// World anchor
        anchor: Vec2,
    },
    /// Rigidly attach two bodies
    Weld {
        /// First body
        body_a: BodyId,
        /// Second body
        body_b: BodyId,
    },
}

impl JointDevice {
    /// The two bodies the joint connects
    pub fn bodies(&self) -> (BodyId, BodyId) {
        match self {
            Self::Distance { body_a, body_b, .. }
            | Self::Revolute { body_a, body_b, .. }
            | Self::Weld { body_a, body_b } => (*body_a, *body_b),
        }
    }
}

/// Physics collaborator; the capability engine is its only caller
pub trait PhysicsEngine {
    /// Create a body owned by `owner`
    fn create_body(&mut self, owner: EntityId, body: BodyId, properties: BodyProperties);
    /// Destroy a body
    fn destroy_body(&mut self, body: BodyId);
    /// Create a joint
    fn create_joint(&mut self, joint: JointId, device: JointDevice);
    /// Destroy a joint
    fn destroy_joint(&mut self, joint: JointId);
    /// Current linear velocity of a body
    fn linear_velocity(&self, body: BodyId) -> Vec2;
    /// Whether a body rests on something below it
    fn is_on_ground(&self, body: BodyId) -> bool;
    /// Downcasting support
    fn as_any(&self) -> &dyn Any;
    /// Mutable downcasting support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Call recorded by [`RecordingPhysics`]
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsCall {
    /// Body created
    CreateBody(BodyId),
    /// Body destroyed
    DestroyBody(BodyId),
    /// Joint created
    CreateJoint(JointId),
    /// Joint destroyed
    DestroyJoint(JointId),
}

/// Headless physics engine that records calls and tracks live bodies
#[derive(Debug, Default)]
pub struct RecordingPhysics {
    calls: Vec<PhysicsCall>,
    bodies: HashMap<BodyId, (EntityId, BodyProperties)>,
    joints: HashMap<JointId, JointDevice>,
    velocities: HashMap<BodyId, Vec2>,
    grounded: HashMap<BodyId, bool>,
}

impl RecordingPhysics {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far
    pub fn calls(&self) -> &[PhysicsCall] {
        &self.calls
    }

    /// Properties a live body was created with
    pub fn body(&self, body: BodyId) -> Option<&BodyProperties> {
        self.bodies.get(&body).map(|(_, properties)| properties)
    }

    /// Number of live bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of live joints
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Script a body's velocity
    pub fn set_linear_velocity(&mut self, body: BodyId, velocity: Vec2) {
        self.velocities.insert(body, velocity);
    }

    /// Script a body's ground contact
    pub fn set_on_ground(&mut self, body: BodyId, on_ground: bool) {
        self.grounded.insert(body, on_ground);
    }
}

impl PhysicsEngine for RecordingPhysics {
    fn create_body(&mut self, owner: EntityId, body: BodyId, properties: BodyProperties) {
        log::trace!("physics: create body {:?} ({:?})", body, properties.body_type);
        self.calls.push(PhysicsCall::CreateBody(body));
        if self.bodies.insert(body, (owner, properties)).is_some() {
            log::warn!("Body {:?} created twice; previous body replaced", body);
        }
    }

    fn destroy_body(&mut self, body: BodyId) {
        self.calls.push(PhysicsCall::DestroyBody(body));
        if self.bodies.remove(&body).is_none() {
            log::warn!("Destroying unknown body {:?}", body);
        }
        self.velocities.remove(&body);
        self.grounded.remove(&body);
    }

    fn create_joint(&mut self, joint: JointId, device: JointDevice) {
        self.calls.push(PhysicsCall::CreateJoint(joint));
        self.joints.insert(joint, device);
    }

    fn destroy_joint(&mut self, joint: JointId) {
        self.calls.push(PhysicsCall::DestroyJoint(joint));
        if self.joints.remove(&joint).is_none() {
            log::warn!("Destroying unknown joint {:?}", joint);
        }
    }

    fn linear_velocity(&self, body: BodyId) -> Vec2 {
        self.velocities.get(&body).copied().unwrap_or_else(Vec2::zeros)
    }

    fn is_on_ground(&self, body: BodyId) -> bool {
        self.grounded.get(&body).copied().unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
