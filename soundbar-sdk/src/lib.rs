//! # Soundbar SDK
//!
//! Sync-first control and observation of UPnP/DLNA soundbars (YAS-209
//! class devices):
//!
//! ```rust,no_run
//! use soundbar_sdk::{Callbacks, Soundbar, SoundbarConfig};
//!
//! fn main() -> Result<(), soundbar_sdk::SoundbarError> {
//!     let soundbar = Soundbar::new(
//!         SoundbarConfig::for_ip("192.168.1.50"),
//!         Callbacks::new()
//!             .on_state_update(|state| println!("state: {state}"))
//!             .on_volume_update(|level| println!("volume: {level:.2}")),
//!     )?;
//!
//!     // Commands update the cached state first, then reach the device
//!     soundbar.set_volume_level(0.3)?;
//!     soundbar.play()?;
//!
//!     // Properties fetch on first read and are kept current by events
//!     soundbar.start_listening()?;
//!     println!("{}", soundbar.current_track()?);
//!
//!     soundbar.stop_listening();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Soundbar (sync facade)
//!     ├── Player (cached state, optimistic commands)
//!     │       └── ActionInvoker (SOAP, one runtime per call)
//!     │               └── DescriptorCache (description + SCPD, fetched once)
//!     └── Listener thread (own runtime)
//!             ├── CallbackServer (NOTIFY receiver)
//!             └── SubscriptionSet (SUBSCRIBE / renew / retry)
//! ```
//!
//! Every SOAP call is checked against a static action table before any
//! network traffic, and a device fault for a redundant transport transition
//! (UPnP error 701) is ignored.

pub mod callbacks;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod invoker;
pub mod logging;
pub mod player;
pub mod service;
pub mod subscription;
pub mod track;

mod runtime;
mod soundbar;

pub use callbacks::Callbacks;
pub use config::{LogVerbosity, SoundbarConfig, DESCRIPTION_PORT};
pub use descriptor::ServiceDescriptor;
pub use error::{ActionError, Result, SoundbarError};
pub use event::EventPayload;
pub use invoker::{ActionDispatcher, ActionRequest, ActionResponse, ArgValue};
pub use player::{PlayerCommand, PlayerState, TransportState};
pub use service::Service;
pub use soundbar::{Soundbar, VOLUME_STEP};
pub use subscription::{Subscription, SubscriptionState};
pub use track::TrackInfo;

// Re-export the decoded payload types callbacks receive
pub use soundbar_parser::{ChangeSet, ParseError};
