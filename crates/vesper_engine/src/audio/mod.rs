//! Audio message queue
//!
//! Views request sounds and songs by message; mixing and playback happen in
//! whatever consumes the queue.

use std::any::Any;

use crate::render::render_queue::AssetTag;

/// Audio request
#[derive(Debug, Clone, PartialEq)]
pub enum AudioMessage {
    /// Play a sound effect once
    PlaySound {
        /// Volume in `0.0..=1.0`
        volume: f32,
        /// Sound asset
        sound: AssetTag,
    },
    /// Start a song, replacing the current one
    PlaySong {
        /// Fade-in time in milliseconds
        fade_in_ms: u32,
        /// Volume in `0.0..=1.0`
        volume: f32,
        /// Song asset
        song: AssetTag,
    },
    /// Fade the current song out
    FadeOutSong {
        /// Fade-out time in milliseconds
        fade_out_ms: u32,
    },
    /// Stop the current song immediately
    StopSong,
}

/// Audio message collaborator
pub trait AudioMessageQueue {
    /// Accept a message
    fn enqueue(&mut self, message: AudioMessage);

    /// Downcasting support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// In-memory audio queue
#[derive(Debug, Default)]
pub struct AudioQueue {
    messages: Vec<AudioMessage>,
}

impl AudioQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending messages in arrival order
    pub fn messages(&self) -> &[AudioMessage] {
        &self.messages
    }

    /// Take every pending message
    pub fn drain(&mut self) -> Vec<AudioMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl AudioMessageQueue for AudioQueue {
    fn enqueue(&mut self, message: AudioMessage) {
        log::trace!("audio: {:?}", message);
        self.messages.push(message);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
