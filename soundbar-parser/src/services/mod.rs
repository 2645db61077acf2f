//! Service-specific payload structures
//!
//! - [`av_transport`]: transport state, track metadata, media info
//! - [`rendering_control`]: volume, mute, channel, equalizer

pub mod av_transport;
pub mod rendering_control;

pub use av_transport::{AvTransportEvent, AvTransportInstance, MediaInfoResponse};
pub use rendering_control::{RenderingControlEvent, RenderingControlInstance};
