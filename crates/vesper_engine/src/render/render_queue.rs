//! # Render Message Queue
//!
//! Collects the layered draw requests produced by view actualization during a
//! frame, along with asset-package hints. Requests may arrive in any order;
//! the renderer drains them sorted back to front.
//!
//! ## Ordering
//!
//! - **Elevation**: higher elevations draw later (on top)
//! - **Sort key**: secondary key within an elevation, typically screen-space Y
//! - Ties keep submission order

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Vec2};

/// Reference to an asset inside a named package
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetTag {
    /// Package name
    pub package: String,
    /// Asset name within the package
    pub name: String,
}

impl AssetTag {
    /// Create a tag
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for AssetTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.package, self.name)
    }
}

/// 2D sprite draw
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteDescriptor {
    /// Bottom-left position
    pub position: Vec2,
    /// Size in world units
    pub size: Vec2,
    /// Rotation in radians
    pub rotation: f32,
    /// Tint color
    pub color: [f32; 4],
    /// Mirror horizontally
    pub flip_h: bool,
    /// Mirror vertically
    pub flip_v: bool,
}

/// Text draw
#[derive(Debug, Clone, PartialEq)]
pub struct TextDescriptor {
    /// Text content
    pub text: String,
    /// Bottom-left position
    pub position: Vec2,
    /// Bounding size
    pub size: Vec2,
    /// Text color
    pub color: [f32; 4],
}

/// One layer of a tile map
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayerDescriptor {
    /// Layer index within the map
    pub layer: usize,
    /// Bottom-left position
    pub position: Vec2,
    /// Map size in world units
    pub size: Vec2,
}

/// Particle sprites sharing one image
#[derive(Debug, Clone, PartialEq)]
pub struct ParticlesDescriptor {
    /// Particle centers
    pub positions: Vec<Vec2>,
    /// Size of every particle
    pub size: Vec2,
    /// Tint color
    pub color: [f32; 4],
}

/// 3D static model draw
#[derive(Debug, Clone, PartialEq)]
pub struct StaticModelDescriptor {
    /// Instance transform applied on top of each surface transform
    pub transform: Mat4,
    /// Draw with alpha blending
    pub blending: bool,
}

/// What to draw for one layered request
#[derive(Debug, Clone, PartialEq)]
pub enum RenderDescriptor {
    /// Sprite
    Sprite(SpriteDescriptor),
    /// Text
    Text(TextDescriptor),
    /// Tile map layer
    TileLayer(TileLayerDescriptor),
    /// Particles
    Particles(ParticlesDescriptor),
    /// Static model
    StaticModel(StaticModelDescriptor),
}

/// A drawable tagged with its ordering keys and asset
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredDescriptor {
    /// Primary ordering key
    pub elevation: f32,
    /// Secondary ordering key
    pub sort_key: f32,
    /// Asset drawn
    pub asset: AssetTag,
    /// Draw parameters
    pub descriptor: RenderDescriptor,
}

/// Messages accepted by the render queue
#[derive(Debug, Clone, PartialEq)]
pub enum RenderMessage {
    /// Single drawable
    Layered(LayeredDescriptor),
    /// Several drawables
    LayeredBatch(Vec<LayeredDescriptor>),
    /// The named package will be needed soon
    HintPackageUse(String),
    /// The named package is no longer needed
    HintPackageDisuse(String),
    /// Re-resolve every cached asset
    ReloadAssets,
}

/// Render message collaborator
pub trait RenderMessageQueue {
    /// Accept a message for the current frame
    fn enqueue(&mut self, message: RenderMessage);

    /// Downcasting support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One frame's drained messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainedFrame {
    /// Drawables, back to front
    pub layered: Vec<LayeredDescriptor>,
    /// Package-use hints in arrival order
    pub package_uses: Vec<String>,
    /// Package-disuse hints in arrival order
    pub package_disuses: Vec<String>,
    /// Whether an asset reload was requested
    pub reload_assets: bool,
}

/// In-memory render queue
#[derive(Debug, Default)]
pub struct RenderQueue {
    messages: Vec<RenderMessage>,
}

impl RenderQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are pending
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Pending messages in arrival order
    pub fn messages(&self) -> &[RenderMessage] {
        &self.messages
    }

    /// Drain everything, sorting drawables by elevation then sort key
    pub fn drain_layered(&mut self) -> DrainedFrame {
        let mut frame = DrainedFrame::default();
        for message in self.messages.drain(..) {
            match message {
                RenderMessage::Layered(layered) => frame.layered.push(layered),
                RenderMessage::LayeredBatch(batch) => frame.layered.extend(batch),
                RenderMessage::HintPackageUse(name) => frame.package_uses.push(name),
                RenderMessage::HintPackageDisuse(name) => frame.package_disuses.push(name),
                RenderMessage::ReloadAssets => frame.reload_assets = true,
            }
        }
        // stable: equal keys keep submission order
        frame.layered.sort_by(|a, b| {
            a.elevation
                .total_cmp(&b.elevation)
                .then_with(|| a.sort_key.total_cmp(&b.sort_key))
        });
        log::trace!("Drained {} layered descriptors", frame.layered.len());
        frame
    }
}

impl RenderMessageQueue for RenderQueue {
    fn enqueue(&mut self, message: RenderMessage) {
        self.messages.push(message);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(elevation: f32, sort_key: f32, label: &str) -> LayeredDescriptor {
        LayeredDescriptor {
            elevation,
            sort_key,
            asset: AssetTag::new("Default", "Font"),
            descriptor: RenderDescriptor::Text(TextDescriptor {
                text: label.to_string(),
                position: Vec2::zeros(),
                size: Vec2::new(1.0, 1.0),
                color: [1.0; 4],
            }),
        }
    }

    fn label(layered: &LayeredDescriptor) -> &str {
        match &layered.descriptor {
            RenderDescriptor::Text(text) => &text.text,
            _ => "",
        }
    }

    #[test]
    fn test_drain_sorts_by_elevation_then_key() {
        let mut queue = RenderQueue::new();
        queue.enqueue(RenderMessage::Layered(text(1.0, 0.0, "top")));
        queue.enqueue(RenderMessage::LayeredBatch(vec![text(0.0, 5.0, "b"), text(0.0, -1.0, "a")]));
        queue.enqueue(RenderMessage::HintPackageUse("Gameplay".into()));
        queue.enqueue(RenderMessage::Layered(text(0.0, 5.0, "b2")));
        queue.enqueue(RenderMessage::ReloadAssets);

        let frame = queue.drain_layered();
        let order: Vec<_> = frame.layered.iter().map(label).collect();
        assert_eq!(order, vec!["a", "b", "b2", "top"]);
        assert_eq!(frame.package_uses, vec!["Gameplay".to_string()]);
        assert!(frame.reload_assets);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let mut queue: Box<dyn RenderMessageQueue> = Box::new(RenderQueue::new());
        queue.enqueue(RenderMessage::HintPackageDisuse("Title".into()));
        let concrete = queue.as_any().downcast_ref::<RenderQueue>().unwrap();
        assert_eq!(concrete.len(), 1);
        assert_eq!(AssetTag::new("Default", "Cube").to_string(), "Default/Cube");
    }
}
