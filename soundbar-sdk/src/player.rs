//! Cached player state and its two writers: commands and events
//!
//! Commands update the cache optimistically and then propagate to the device;
//! events are authoritative and only ever update the cache. There is no
//! ordering between the two, the last write wins.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use soundbar_parser::{AvTransportInstance, ChangeSet, RenderingControlInstance};

use crate::callbacks::Callbacks;
use crate::error::{Result, SoundbarError};
use crate::invoker::{ActionDispatcher, ActionRequest};
use crate::service::Service;
use crate::track::{TrackInfo, TrackSource};

/// Transport state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportState {
    Unknown,
    Playing,
    Paused,
    Stopped,
    NoMedia,
}

impl TransportState {
    /// Map a transport-state string from an event or `GetTransportInfo`.
    ///
    /// Accepts both the short names and the UPnP spellings; anything else is
    /// [`TransportState::Unknown`].
    pub fn from_event(value: &str) -> Self {
        match value.trim() {
            "idle" | "NO_MEDIA_PRESENT" => TransportState::NoMedia,
            "playing" | "PLAYING" => TransportState::Playing,
            "paused" | "PAUSED_PLAYBACK" => TransportState::Paused,
            "off" | "STOPPED" => TransportState::Stopped,
            _ => TransportState::Unknown,
        }
    }

    /// Name passed to state-update callbacks
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Unknown => "unknown",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
            TransportState::Stopped => "off",
            TransportState::NoMedia => "idle",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AVTransport action that moves the device into each commandable state
pub const TRANSPORT_ACTIONS: [(TransportState, &str); 3] = [
    (TransportState::Playing, "Play"),
    (TransportState::Paused, "Pause"),
    (TransportState::Stopped, "Stop"),
];

/// The action implied by `state`, if it has one
pub fn transport_action(state: TransportState) -> Option<&'static str> {
    TRANSPORT_ACTIONS
        .iter()
        .find(|(candidate, _)| *candidate == state)
        .map(|(_, action)| *action)
}

/// Transport commands accepted by [`Player::command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerCommand {
    Play,
    Pause,
    Stop,
}

impl PlayerCommand {
    pub fn target_state(&self) -> TransportState {
        match self {
            PlayerCommand::Play => TransportState::Playing,
            PlayerCommand::Pause => TransportState::Paused,
            PlayerCommand::Stop => TransportState::Stopped,
        }
    }
}

impl FromStr for PlayerCommand {
    type Err = SoundbarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "play" => Ok(PlayerCommand::Play),
            "pause" => Ok(PlayerCommand::Pause),
            "stop" => Ok(PlayerCommand::Stop),
            other => Err(SoundbarError::InvalidParameter(format!(
                "unknown command '{}', expected one of 'play', 'pause', 'stop'",
                other
            ))),
        }
    }
}

/// Snapshot of everything cached about the device.
///
/// `None` means the value hasn't been observed yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerState {
    pub transport_state: Option<TransportState>,
    /// 0..1, rounded to two decimals
    pub volume_level: Option<f64>,
    pub muted: Option<bool>,
    pub current_track: Option<TrackInfo>,
}

/// Round a 0..1 level to two decimals
pub fn round_level(level: f64) -> f64 {
    (level * 100.0).round() / 100.0
}

/// Convert a 0..1 level to the device's 0..100 scale
pub fn level_to_device(level: f64) -> i64 {
    (round_level(level) * 100.0).round() as i64
}

fn check_level(level: f64) -> Result<()> {
    if (0.0..=1.0).contains(&level) {
        Ok(())
    } else {
        Err(SoundbarError::InvalidParameter(format!(
            "volume level must be between 0 and 1, got {}",
            level
        )))
    }
}

/// AVTransport request for one of the transport actions
fn transport_request(action: &str) -> ActionRequest {
    let request = ActionRequest::new(Service::AvTransport, action).arg("InstanceID", 0);
    match action {
        "Play" | "Stop" => request.arg("Speed", 1),
        _ => request,
    }
}

/// The player state machine of one device
pub struct Player {
    state: RwLock<PlayerState>,
    dispatcher: Arc<dyn ActionDispatcher>,
    callbacks: Arc<Callbacks>,
}

impl Player {
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>, callbacks: Arc<Callbacks>) -> Self {
        Self {
            state: RwLock::new(PlayerState::default()),
            dispatcher,
            callbacks,
        }
    }

    pub fn snapshot(&self) -> PlayerState {
        self.state.read().clone()
    }

    pub fn transport_state(&self) -> Option<TransportState> {
        self.state.read().transport_state
    }

    pub fn volume_level(&self) -> Option<f64> {
        self.state.read().volume_level
    }

    pub fn muted(&self) -> Option<bool> {
        self.state.read().muted
    }

    pub fn current_track(&self) -> Option<TrackInfo> {
        self.state.read().current_track.clone()
    }

    pub fn dispatcher(&self) -> &Arc<dyn ActionDispatcher> {
        &self.dispatcher
    }

    /// Set the transport state, then send the matching action unless
    /// `local_only`.
    ///
    /// States without a matching action only change the cache.
    pub fn set_state(&self, state: TransportState, local_only: bool) -> Result<()> {
        let prior = self.state.write().transport_state.replace(state);
        self.callbacks.emit_state_update(state.as_str());

        if local_only {
            return Ok(());
        }

        match transport_action(state) {
            Some(action) => {
                tracing::debug!(%state, action, "Propagating transport state");
                self.dispatcher
                    .dispatch(transport_request(action).with_prior_state(prior))
                    .map(drop)
            }
            None => Ok(()),
        }
    }

    pub fn command(&self, command: PlayerCommand, local_only: bool) -> Result<()> {
        self.set_state(command.target_state(), local_only)
    }

    /// Set the volume as a 0..1 level, then send `SetVolume` unless
    /// `local_only`. Out-of-range levels are rejected before any change.
    pub fn set_volume_level(&self, level: f64, local_only: bool) -> Result<()> {
        check_level(level)?;

        let level = round_level(level);
        self.state.write().volume_level = Some(level);
        self.callbacks.emit_volume_update(level);

        if local_only {
            return Ok(());
        }

        self.dispatcher
            .dispatch(
                ActionRequest::new(Service::RenderingControl, "SetVolume")
                    .arg("InstanceID", 0)
                    .arg("Channel", "Master")
                    .arg("DesiredVolume", level_to_device(level)),
            )
            .map(drop)
    }

    pub fn set_muted(&self, muted: bool, local_only: bool) -> Result<()> {
        self.state.write().muted = Some(muted);

        if local_only {
            return Ok(());
        }

        self.dispatcher
            .dispatch(
                ActionRequest::new(Service::RenderingControl, "SetMute")
                    .arg("InstanceID", 0)
                    .arg("Channel", "Master")
                    .arg("DesiredMute", muted),
            )
            .map(drop)
    }

    /// Replace the current track and notify the track callback
    pub fn set_current_track(&self, track: TrackInfo) {
        self.state.write().current_track = Some(track.clone());
        self.callbacks.emit_track_update(&track);
    }

    // On-demand fetches fill the cache without firing callbacks

    pub(crate) fn cache_transport_state(&self, state: TransportState) {
        self.state.write().transport_state = Some(state);
    }

    pub(crate) fn cache_volume_level(&self, level: f64) -> Result<()> {
        check_level(level)?;
        self.state.write().volume_level = Some(round_level(level));
        Ok(())
    }

    pub(crate) fn cache_current_track(&self, track: TrackInfo) {
        self.state.write().current_track = Some(track);
    }

    /// Apply a decoded change-set as authoritative, local-only updates
    pub fn apply_event(&self, change_set: &ChangeSet) -> Result<()> {
        match change_set {
            ChangeSet::AvTransport(event) => {
                self.apply_av_transport(&event.instance);
                Ok(())
            }
            ChangeSet::RenderingControl(event) => self.apply_rendering_control(&event.instance),
        }
    }

    fn apply_av_transport(&self, instance: &AvTransportInstance) {
        let state = TransportState::from_event(&instance.transport_state);
        let track = TrackInfo::from_source(TrackSource::Event(instance));

        tracing::debug!(%state, %track, "Transport event");

        // Events repeat the current state alongside position and metadata
        // changes; the callback only sees actual transitions.
        let prior = self.state.write().transport_state.replace(state);
        if prior != Some(state) {
            self.callbacks.emit_state_update(state.as_str());
        }
        self.set_current_track(track);
    }

    fn apply_rendering_control(&self, instance: &RenderingControlInstance) -> Result<()> {
        if let Some(level) = instance.volume_level() {
            self.set_volume_level(level, true)?;
        }
        if let Some(muted) = instance.is_muted() {
            self.set_muted(muted, true)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("state", &*self.state.read())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

/// Dispatcher that records requests and answers with an empty response
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingDispatcher {
    pub requests: parking_lot::Mutex<Vec<ActionRequest>>,
}

#[cfg(test)]
impl ActionDispatcher for RecordingDispatcher {
    fn dispatch(&self, request: ActionRequest) -> Result<crate::invoker::ActionResponse> {
        request.validate()?;
        self.requests.lock().push(request);
        Ok(Default::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::ArgValue;
    use rstest::rstest;
    use serde_json::json;
    use soundbar_parser::{AvTransportEvent, RenderingControlEvent};

    fn player_with(callbacks: Callbacks) -> (Player, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let player = Player::new(dispatcher.clone(), Arc::new(callbacks));
        (player, dispatcher)
    }

    fn av_change(value: serde_json::Value) -> ChangeSet {
        let event: AvTransportEvent =
            serde_json::from_value(json!({ "InstanceID": value })).unwrap();
        ChangeSet::AvTransport(event)
    }

    fn rc_change(value: serde_json::Value) -> ChangeSet {
        let event: RenderingControlEvent =
            serde_json::from_value(json!({ "InstanceID": value })).unwrap();
        ChangeSet::RenderingControl(event)
    }

    #[rstest]
    #[case("idle", TransportState::NoMedia)]
    #[case("playing", TransportState::Playing)]
    #[case("paused", TransportState::Paused)]
    #[case("off", TransportState::Stopped)]
    #[case("NO_MEDIA_PRESENT", TransportState::NoMedia)]
    #[case("PLAYING", TransportState::Playing)]
    #[case("PAUSED_PLAYBACK", TransportState::Paused)]
    #[case("STOPPED", TransportState::Stopped)]
    #[case("TRANSITIONING", TransportState::Unknown)]
    #[case("", TransportState::Unknown)]
    fn test_transport_state_mapping(#[case] input: &str, #[case] expected: TransportState) {
        assert_eq!(TransportState::from_event(input), expected);
    }

    #[test]
    fn test_transport_action_table() {
        assert_eq!(transport_action(TransportState::Playing), Some("Play"));
        assert_eq!(transport_action(TransportState::Paused), Some("Pause"));
        assert_eq!(transport_action(TransportState::Stopped), Some("Stop"));
        assert_eq!(transport_action(TransportState::NoMedia), None);
        assert_eq!(transport_action(TransportState::Unknown), None);
    }

    #[test]
    fn test_local_command_is_idempotent_and_silent() {
        let (player, dispatcher) = player_with(Callbacks::new());

        player.command(PlayerCommand::Play, true).unwrap();
        player.command(PlayerCommand::Play, true).unwrap();

        assert_eq!(player.transport_state(), Some(TransportState::Playing));
        assert!(dispatcher.requests.lock().is_empty());
    }

    #[rstest]
    #[case(PlayerCommand::Play, "Play", vec![("InstanceID", "0"), ("Speed", "1")])]
    #[case(PlayerCommand::Pause, "Pause", vec![("InstanceID", "0")])]
    #[case(PlayerCommand::Stop, "Stop", vec![("InstanceID", "0"), ("Speed", "1")])]
    fn test_command_wire_arguments(
        #[case] command: PlayerCommand,
        #[case] action: &str,
        #[case] args: Vec<(&str, &str)>,
    ) {
        let (player, dispatcher) = player_with(Callbacks::new());
        player.command(command, false).unwrap();

        let requests = dispatcher.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].service, Service::AvTransport);
        assert_eq!(requests[0].action, action);

        let wire: Vec<(String, String)> = requests[0]
            .args
            .iter()
            .map(|(name, value)| (name.clone(), value.to_wire()))
            .collect();
        let expected: Vec<(String, String)> = args
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        assert_eq!(wire, expected);
    }

    #[test]
    fn test_command_carries_prior_state() {
        let (player, dispatcher) = player_with(Callbacks::new());
        player.set_state(TransportState::Playing, true).unwrap();
        player.command(PlayerCommand::Play, false).unwrap();

        let requests = dispatcher.requests.lock();
        assert_eq!(requests[0].prior_state, Some(TransportState::Playing));
    }

    #[test]
    fn test_state_without_action_is_local() {
        let (player, dispatcher) = player_with(Callbacks::new());
        player.set_state(TransportState::NoMedia, false).unwrap();

        assert_eq!(player.transport_state(), Some(TransportState::NoMedia));
        assert!(dispatcher.requests.lock().is_empty());
    }

    #[test]
    fn test_state_callback_fires_on_command_and_event() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (player, _) = player_with(
            Callbacks::new().on_state_update(move |state| sink.lock().push(state.to_string())),
        );

        player.command(PlayerCommand::Pause, true).unwrap();
        player
            .apply_event(&av_change(json!({"val": "0", "TransportState": "STOPPED"})))
            .unwrap();

        assert_eq!(*seen.lock(), vec!["paused".to_string(), "off".to_string()]);
    }

    #[test]
    fn test_repeated_event_state_fires_callback_once() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (player, _) = player_with(
            Callbacks::new().on_state_update(move |state| sink.lock().push(state.to_string())),
        );

        for _ in 0..3 {
            player
                .apply_event(&av_change(json!({"val": "0", "TransportState": "PLAYING"})))
                .unwrap();
        }
        assert_eq!(player.transport_state(), Some(TransportState::Playing));
        assert_eq!(*seen.lock(), vec!["playing".to_string()]);

        player
            .apply_event(&av_change(json!({"val": "0", "TransportState": "PAUSED_PLAYBACK"})))
            .unwrap();
        assert_eq!(*seen.lock(), vec!["playing".to_string(), "paused".to_string()]);
    }

    #[test]
    fn test_volume_is_rounded_and_scaled() {
        let levels = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = levels.clone();
        let (player, dispatcher) =
            player_with(Callbacks::new().on_volume_update(move |level| sink.lock().push(level)));

        player.set_volume_level(0.456, false).unwrap();

        assert_eq!(player.volume_level(), Some(0.46));
        assert_eq!(*levels.lock(), vec![0.46]);

        let requests = dispatcher.requests.lock();
        assert_eq!(requests[0].action, "SetVolume");
        assert_eq!(
            requests[0].args,
            vec![
                ("InstanceID".to_string(), ArgValue::Int(0)),
                ("Channel".to_string(), ArgValue::Str("Master".to_string())),
                ("DesiredVolume".to_string(), ArgValue::Int(46)),
            ]
        );
    }

    #[rstest]
    #[case(-0.01)]
    #[case(1.01)]
    #[case(f64::NAN)]
    fn test_out_of_range_volume_is_rejected(#[case] level: f64) {
        let (player, dispatcher) = player_with(Callbacks::new());
        player.set_volume_level(0.3, true).unwrap();

        let err = player.set_volume_level(level, false).unwrap_err();

        assert!(matches!(err, SoundbarError::InvalidParameter(_)));
        assert_eq!(player.volume_level(), Some(0.3));
        assert!(dispatcher.requests.lock().is_empty());
    }

    #[test]
    fn test_mute_wire_value() {
        let (player, dispatcher) = player_with(Callbacks::new());
        player.set_muted(true, false).unwrap();

        assert_eq!(player.muted(), Some(true));
        let requests = dispatcher.requests.lock();
        assert_eq!(requests[0].action, "SetMute");
        assert_eq!(requests[0].args[2], ("DesiredMute".to_string(), ArgValue::Bool(true)));
    }

    #[test]
    fn test_av_transport_event_replaces_track() {
        let tracks = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = tracks.clone();
        let (player, dispatcher) =
            player_with(Callbacks::new().on_track_update(move |track| sink.lock().push(track.clone())));

        player
            .apply_event(&av_change(json!({
                "val": "0",
                "TransportState": "PLAYING",
                "CurrentTrackMetaData": {"item": {"title": "Song", "creator": "Band"}}
            })))
            .unwrap();
        player
            .apply_event(&av_change(json!({"val": "0", "TransportState": "STOPPED"})))
            .unwrap();

        let tracks = tracks.lock();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title.as_deref(), Some("Song"));
        assert!(tracks[1].is_null());
        assert_eq!(player.current_track(), Some(TrackInfo::null_track()));
        assert_eq!(player.transport_state(), Some(TransportState::Stopped));
        assert!(dispatcher.requests.lock().is_empty());
    }

    #[test]
    fn test_rendering_control_event_is_local() {
        let (player, dispatcher) = player_with(Callbacks::new());

        player
            .apply_event(&rc_change(json!({
                "val": "0",
                "Volume": {"channel": "Master", "val": "42"},
                "Mute": {"channel": "Master", "val": "1"}
            })))
            .unwrap();

        assert_eq!(player.volume_level(), Some(0.42));
        assert_eq!(player.muted(), Some(true));
        assert!(dispatcher.requests.lock().is_empty());
    }

    #[test]
    fn test_out_of_range_event_volume_leaves_state_untouched() {
        let (player, _) = player_with(Callbacks::new());

        let result = player.apply_event(&rc_change(json!({
            "val": "0",
            "Volume": {"channel": "Master", "val": "150"},
            "Mute": {"channel": "Master", "val": "1"}
        })));

        assert!(result.is_err());
        assert_eq!(player.snapshot(), PlayerState::default());
    }

    #[test]
    fn test_cache_writes_fire_no_callbacks() {
        let fired = Arc::new(parking_lot::Mutex::new(0));
        let (a, b, c) = (fired.clone(), fired.clone(), fired.clone());
        let (player, _) = player_with(
            Callbacks::new()
                .on_state_update(move |_| *a.lock() += 1)
                .on_volume_update(move |_| *b.lock() += 1)
                .on_track_update(move |_| *c.lock() += 1),
        );

        player.cache_transport_state(TransportState::Paused);
        player.cache_volume_level(0.5).unwrap();
        player.cache_current_track(TrackInfo::null_track());

        assert_eq!(*fired.lock(), 0);
        assert_eq!(player.transport_state(), Some(TransportState::Paused));
    }

    #[test]
    fn test_command_from_str() {
        assert_eq!("play".parse::<PlayerCommand>().unwrap(), PlayerCommand::Play);
        assert!("rewind".parse::<PlayerCommand>().is_err());
    }
}
