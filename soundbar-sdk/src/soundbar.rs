//! The device facade

use std::fmt;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use soap_client::SoapClient;
use soundbar_parser::{MediaInfoResponse, ParseError};

use crate::callbacks::Callbacks;
use crate::config::SoundbarConfig;
use crate::descriptor::{DescriptorCache, ServiceDescriptor};
use crate::error::{Result, SoundbarError};
use crate::invoker::{ActionDispatcher, ActionInvoker, ActionRequest, ActionResponse, ArgValue};
use crate::player::{round_level, Player, PlayerCommand, PlayerState, TransportState};
use crate::runtime::TaskRunner;
use crate::service::Service;
use crate::subscription::{spawn_listener, ListenerContext, ListenerHandle};
use crate::track::{TrackInfo, TrackSource};

/// Volume step used by [`Soundbar::volume_up`] and [`Soundbar::volume_down`]
pub const VOLUME_STEP: f64 = 0.02;

/// A UPnP soundbar.
///
/// Commands and property reads are synchronous and run each SOAP call on its
/// own short-lived runtime. Event listening runs on a dedicated background
/// thread started with [`Soundbar::start_listening`].
///
/// # Example
///
/// ```rust,no_run
/// use soundbar_sdk::{Callbacks, Soundbar, SoundbarConfig};
///
/// let soundbar = Soundbar::new(
///     SoundbarConfig::for_ip("192.168.1.50"),
///     Callbacks::new().on_track_update(|track| println!("now playing {track}")),
/// )?;
///
/// soundbar.start_listening()?;
/// soundbar.set_volume_level(0.25)?;
/// soundbar.play()?;
/// # Ok::<(), soundbar_sdk::SoundbarError>(())
/// ```
pub struct Soundbar {
    config: SoundbarConfig,
    client: SoapClient,
    descriptors: Arc<DescriptorCache>,
    invoker: Arc<ActionInvoker>,
    player: Arc<Player>,
    callbacks: Arc<Callbacks>,
    runner: TaskRunner,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Soundbar {
    /// Create a device handle. No network traffic happens until first use.
    pub fn new(config: SoundbarConfig, callbacks: Callbacks) -> Result<Self> {
        config.validate()?;

        let client = SoapClient::new();
        let runner = TaskRunner::new(config.log_sink.clone());
        let descriptors = Arc::new(DescriptorCache::new(
            config.description_url.clone(),
            client.clone(),
        ));
        let invoker = Arc::new(ActionInvoker::new(
            client.clone(),
            descriptors.clone(),
            runner.clone(),
        ));
        let callbacks = Arc::new(callbacks);
        let player = Arc::new(Player::new(invoker.clone(), callbacks.clone()));

        Ok(Self {
            config,
            client,
            descriptors,
            invoker,
            player,
            callbacks,
            runner,
            listener: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SoundbarConfig {
        &self.config
    }

    // Commands

    pub fn play(&self) -> Result<()> {
        self.logged(|| self.player.command(PlayerCommand::Play, false))
    }

    pub fn pause(&self) -> Result<()> {
        self.logged(|| self.player.command(PlayerCommand::Pause, false))
    }

    pub fn stop(&self) -> Result<()> {
        self.logged(|| self.player.command(PlayerCommand::Stop, false))
    }

    /// Pause when playing, otherwise play
    pub fn play_pause(&self) -> Result<()> {
        if self.state()? == TransportState::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    pub fn next_track(&self) -> Result<()> {
        self.transport_step("Next")
    }

    pub fn previous_track(&self) -> Result<()> {
        self.transport_step("Previous")
    }

    pub fn mute(&self) -> Result<()> {
        self.logged(|| self.player.set_muted(true, false))
    }

    pub fn unmute(&self) -> Result<()> {
        self.logged(|| self.player.set_muted(false, false))
    }

    /// Raise the volume by [`VOLUME_STEP`], capped at full volume
    pub fn volume_up(&self) -> Result<()> {
        let level = self.volume_level()?;
        self.set_volume_level((level + VOLUME_STEP).min(1.0))
    }

    /// Lower the volume by [`VOLUME_STEP`], floored at zero
    pub fn volume_down(&self) -> Result<()> {
        let level = self.volume_level()?;
        self.set_volume_level((level - VOLUME_STEP).max(0.0))
    }

    /// Set the volume to a 0..1 level
    pub fn set_volume_level(&self, level: f64) -> Result<()> {
        self.logged(|| self.player.set_volume_level(level, false))
    }

    /// Update the cached volume without contacting the device
    pub fn set_volume_level_local(&self, level: f64) -> Result<()> {
        self.player.set_volume_level(level, true)
    }

    /// Set the transport state, sending the matching action unless
    /// `local_only`
    pub fn set_state(&self, state: TransportState, local_only: bool) -> Result<()> {
        self.logged(|| self.player.set_state(state, local_only))
    }

    // Properties

    /// Current transport state, fetched with `GetTransportInfo` if not yet
    /// known
    pub fn state(&self) -> Result<TransportState> {
        if let Some(state) = self.player.transport_state() {
            return Ok(state);
        }

        let response = self.invoke(
            ActionRequest::new(Service::AvTransport, "GetTransportInfo").arg("InstanceID", 0),
        )?;
        let state = response
            .get("CurrentTransportState")
            .and_then(Value::as_str)
            .map(TransportState::from_event)
            .unwrap_or(TransportState::Unknown);

        self.player.cache_transport_state(state);
        Ok(state)
    }

    /// Current 0..1 volume, fetched with `GetVolume` if not yet known
    pub fn volume_level(&self) -> Result<f64> {
        if let Some(level) = self.player.volume_level() {
            return Ok(level);
        }

        let response = self.invoke(
            ActionRequest::new(Service::RenderingControl, "GetVolume")
                .arg("InstanceID", 0)
                .arg("Channel", "Master"),
        )?;

        let volume = match response.get("CurrentVolume") {
            Some(Value::String(text)) => text.trim().parse::<f64>().map_err(|e| {
                SoundbarError::PayloadDecode(ParseError::Shape(format!(
                    "CurrentVolume {:?}: {}",
                    text, e
                )))
            })?,
            Some(Value::Number(number)) => number.as_f64().unwrap_or_default(),
            _ => 0.0,
        };

        let level = round_level(volume / 100.0);
        self.player.cache_volume_level(level)?;
        Ok(level)
    }

    /// Cached mute state; only known after a mute command or event
    pub fn is_muted(&self) -> Option<bool> {
        self.player.muted()
    }

    /// Current track, fetched with `GetMediaInfo` if not yet known
    pub fn current_track(&self) -> Result<TrackInfo> {
        if let Some(track) = self.player.current_track() {
            return Ok(track);
        }

        let response = self.get_media_info()?;
        let media_info: MediaInfoResponse =
            serde_json::from_value(Value::Object(response)).map_err(|e| {
                SoundbarError::PayloadDecode(ParseError::Shape(e.to_string()))
            })?;

        let track = TrackInfo::from_source(TrackSource::MediaInfo(&media_info));
        self.player.cache_current_track(track.clone());
        Ok(track)
    }

    pub fn album_art_uri(&self) -> Result<Option<String>> {
        Ok(self.current_track()?.album_art_uri)
    }

    pub fn media_album_name(&self) -> Result<Option<String>> {
        Ok(self.current_track()?.album_name)
    }

    pub fn media_artist(&self) -> Result<Option<String>> {
        Ok(self.current_track()?.artist)
    }

    /// Duration of the current track in seconds
    pub fn media_duration(&self) -> Result<f64> {
        Ok(self.current_track()?.duration_seconds)
    }

    pub fn media_title(&self) -> Result<Option<String>> {
        Ok(self.current_track()?.title)
    }

    /// Snapshot of the cached state, without fetching anything
    pub fn player_state(&self) -> PlayerState {
        self.player.snapshot()
    }

    // Generic access

    /// Decoded `GetMediaInfo` response
    pub fn get_media_info(&self) -> Result<ActionResponse> {
        self.invoke(ActionRequest::new(Service::AvTransport, "GetMediaInfo").arg("InstanceID", 0))
    }

    /// Invoke any action the service advertises.
    ///
    /// The action is checked against the service's table before any
    /// network traffic.
    pub fn call_action(
        &self,
        service: Service,
        action: &str,
        args: Vec<(String, ArgValue)>,
    ) -> Result<ActionResponse> {
        let mut request = ActionRequest::new(service, action)
            .with_prior_state(self.player.transport_state());
        request.args = args;
        self.invoke(request)
    }

    /// The services the device describes, fetched once
    pub fn describe(&self) -> Result<Vec<ServiceDescriptor>> {
        let descriptors = self.runner.block_on(self.descriptors.describe())??;
        Ok(descriptors.as_ref().clone())
    }

    // Listener lifecycle

    /// Start the background listener and block until its first
    /// subscription pass is done.
    ///
    /// A startup failure in the listener is returned here. Calling this
    /// while already listening does nothing. A listener that was asked to
    /// stop but has not exited yet is waited for, then replaced.
    pub fn start_listening(&self) -> Result<()> {
        let mut listener = self.listener.lock();
        if listener
            .as_ref()
            .is_some_and(|handle| handle.is_listening() && !handle.stop_requested())
        {
            return Ok(());
        }

        // A stopping listener still holds the callback port and its
        // subscriptions until it exits
        if let Some(stopping) = listener.take() {
            stopping.join();
        }

        let (handle, startup) = spawn_listener(ListenerContext {
            config: self.config.clone(),
            client: self.client.clone(),
            descriptors: self.descriptors.clone(),
            player: self.player.clone(),
            callbacks: self.callbacks.clone(),
            runner: self.runner.clone(),
        })?;

        let outcome = loop {
            match startup.recv_timeout(self.config.start_poll_interval) {
                Ok(outcome) => break outcome,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(SoundbarError::Worker(
                        "listener exited before it started".to_string(),
                    ))
                }
            }
        };

        match outcome {
            Ok(()) => {
                *listener = Some(handle);
                Ok(())
            }
            Err(e) => {
                handle.join();
                Err(e)
            }
        }
    }

    /// Ask the listener to stop. Returns immediately; poll
    /// [`Soundbar::is_listening`] to wait for the thread to exit.
    pub fn stop_listening(&self) {
        if let Some(listener) = self.listener.lock().as_ref() {
            listener.stop();
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(ListenerHandle::is_listening)
    }

    fn transport_step(&self, action: &str) -> Result<()> {
        self.logged(|| {
            self.invoke(ActionRequest::new(Service::AvTransport, action).arg("InstanceID", 0))
                .map(drop)
        })
    }

    fn invoke(&self, request: ActionRequest) -> Result<ActionResponse> {
        self.invoker.dispatch(request)
    }

    /// Run `f` with this device's log sink as the default subscriber
    fn logged<R>(&self, f: impl FnOnce() -> R) -> R {
        self.runner.with_sink(f)
    }
}

impl fmt::Debug for Soundbar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Soundbar")
            .field("description_url", &self.config.description_url)
            .field("player", &self.player)
            .field("listening", &self.is_listening())
            .finish()
    }
}

impl Drop for Soundbar {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.stop();
        }
    }
}
