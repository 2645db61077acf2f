//! Caller-supplied update callbacks
//!
//! Callbacks run synchronously on whichever thread caused the update: the
//! listener worker for events, the calling thread for commands.

use std::fmt;

use crate::event::EventPayload;
use crate::track::TrackInfo;

type EventCallback = Box<dyn Fn(&EventPayload) + Send + Sync>;
type TrackCallback = Box<dyn Fn(&TrackInfo) + Send + Sync>;
type StateCallback = Box<dyn Fn(&str) + Send + Sync>;
type VolumeCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Set of optional update callbacks.
///
/// # Example
///
/// ```
/// use soundbar_sdk::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_state_update(|state| println!("state: {state}"))
///     .on_volume_update(|level| println!("volume: {level:.2}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    on_event: Option<EventCallback>,
    on_track_update: Option<TrackCallback>,
    on_state_update: Option<StateCallback>,
    on_volume_update: Option<VolumeCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with every decoded event, after the player state is updated
    pub fn on_event(mut self, callback: impl Fn(&EventPayload) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// Called whenever the current track is replaced
    pub fn on_track_update(mut self, callback: impl Fn(&TrackInfo) + Send + Sync + 'static) -> Self {
        self.on_track_update = Some(Box::new(callback));
        self
    }

    /// Called with the state name (`playing`, `paused`, `off`, `idle`,
    /// `unknown`) whenever the transport state is set
    pub fn on_state_update(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_state_update = Some(Box::new(callback));
        self
    }

    /// Called with the 0..1 level whenever the volume is set
    pub fn on_volume_update(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_volume_update = Some(Box::new(callback));
        self
    }

    pub(crate) fn emit_event(&self, payload: &EventPayload) {
        if let Some(callback) = &self.on_event {
            callback(payload);
        }
    }

    pub(crate) fn emit_track_update(&self, track: &TrackInfo) {
        if let Some(callback) = &self.on_track_update {
            callback(track);
        }
    }

    pub(crate) fn emit_state_update(&self, state: &str) {
        if let Some(callback) = &self.on_state_update {
            callback(state);
        }
    }

    pub(crate) fn emit_volume_update(&self, level: f64) {
        if let Some(callback) = &self.on_volume_update {
            callback(level);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_event", &self.on_event.is_some())
            .field("on_track_update", &self.on_track_update.is_some())
            .field("on_state_update", &self.on_state_update.is_some())
            .field("on_volume_update", &self.on_volume_update.is_some())
            .finish()
    }
}
