//! View actualization
//!
//! A [`View`] is a side-effect-free description of what an entity wants
//! drawn or heard this frame. Actualizing it forwards render views to the
//! render queue and audio views to the audio queue; it never blocks and
//! never fails.

use crate::audio::{AudioMessage, AudioMessageQueue};
use crate::ecs::property::PropertyValue;
use crate::render::render_queue::{AssetTag, LayeredDescriptor, RenderMessage, RenderMessageQueue};

/// Abstract render or audio action
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Layered drawable
    Render(LayeredDescriptor),
    /// One-shot sound effect
    PlaySound {
        /// Volume in `0.0..=1.0`
        volume: f32,
        /// Sound asset
        sound: AssetTag,
    },
    /// Start a song
    PlaySong {
        /// Fade-in time in milliseconds
        fade_in_ms: u32,
        /// Volume in `0.0..=1.0`
        volume: f32,
        /// Song asset
        song: AssetTag,
    },
    /// Fade the current song out over the given milliseconds
    FadeOutSong(u32),
    /// Stop the current song
    StopSong,
    /// Named value for introspection; ignored when actualized
    Tag(String, PropertyValue),
    /// Several views, actualized in order
    Views(Vec<View>),
}

impl View {
    /// The empty view
    pub fn none() -> Self {
        Self::Views(Vec::new())
    }

    /// Whether actualizing this view does nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Tag(..) => true,
            Self::Views(views) => views.iter().all(Self::is_empty),
            _ => false,
        }
    }

    /// Combine two views, flattening empty sides
    #[must_use]
    pub fn and(self, other: View) -> View {
        match (self, other) {
            (Self::Views(a), b) if a.is_empty() => b,
            (a, Self::Views(b)) if b.is_empty() => a,
            (Self::Views(mut a), b) => {
                a.push(b);
                Self::Views(a)
            }
            (a, b) => Self::Views(vec![a, b]),
        }
    }

    /// Every tag in the view, depth first
    pub fn tags(&self) -> Vec<(String, PropertyValue)> {
        let mut tags = Vec::new();
        self.collect_tags(&mut tags);
        tags
    }

    fn collect_tags(&self, tags: &mut Vec<(String, PropertyValue)>) {
        match self {
            Self::Tag(name, value) => tags.push((name.clone(), value.clone())),
            Self::Views(views) => views.iter().for_each(|view| view.collect_tags(tags)),
            _ => {}
        }
    }
}

/// Forward a view to the render and audio queues
pub fn actualize_view(view: View, render: &mut dyn RenderMessageQueue, audio: &mut dyn AudioMessageQueue) {
    match view {
        View::Render(layered) => render.enqueue(RenderMessage::Layered(layered)),
        View::PlaySound { volume, sound } => audio.enqueue(AudioMessage::PlaySound { volume, sound }),
        View::PlaySong { fade_in_ms, volume, song } => audio.enqueue(AudioMessage::PlaySong { fade_in_ms, volume, song }),
        View::FadeOutSong(fade_out_ms) => audio.enqueue(AudioMessage::FadeOutSong { fade_out_ms }),
        View::StopSong => audio.enqueue(AudioMessage::StopSong),
        View::Tag(..) => {}
        View::Views(views) => {
            for view in views {
                actualize_view(view, render, audio);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioQueue;
    use crate::foundation::math::Vec2;
    use crate::render::render_queue::{RenderDescriptor, RenderQueue, TileLayerDescriptor};

    fn layer(elevation: f32) -> View {
        View::Render(LayeredDescriptor {
            elevation,
            sort_key: 0.0,
            asset: AssetTag::new("Gameplay", "Field"),
            descriptor: RenderDescriptor::TileLayer(TileLayerDescriptor {
                layer: 0,
                position: Vec2::zeros(),
                size: Vec2::new(16.0, 16.0),
            }),
        })
    }

    #[test]
    fn test_views_actualize_in_order() {
        let view = View::Views(vec![
            layer(1.0),
            View::Tag("score".into(), PropertyValue::Int(3)),
            View::Views(vec![View::StopSong, layer(0.0)]),
            View::FadeOutSong(500),
        ]);
        assert_eq!(view.tags(), vec![("score".to_string(), PropertyValue::Int(3))]);

        let (mut render, mut audio) = (RenderQueue::new(), AudioQueue::new());
        actualize_view(view, &mut render, &mut audio);
        assert_eq!(render.len(), 2);
        assert_eq!(render.messages()[0], RenderMessage::Layered(match layer(1.0) {
            View::Render(l) => l,
            _ => unreachable!(),
        }));
        assert_eq!(audio.messages(), &[AudioMessage::StopSong, AudioMessage::FadeOutSong { fade_out_ms: 500 }]);
    }

    #[test]
    fn test_empty_views_are_no_ops() {
        let (mut render, mut audio) = (RenderQueue::new(), AudioQueue::new());
        let view = View::none().and(View::Views(vec![View::none()]));
        assert!(view.is_empty());
        actualize_view(view, &mut render, &mut audio);
        assert!(render.is_empty());
        assert!(audio.messages().is_empty());
        assert_eq!(View::none().and(View::StopSong), View::StopSong);
    }
}
