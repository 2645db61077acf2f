//! # soundbar-parser
//!
//! Decoding of the XML payloads a UPnP soundbar sends: GENA NOTIFY property
//! sets, `LastChange` change-sets, DIDL-Lite track metadata and SOAP action
//! response fields.
//!
//! Documents are converted to a [`serde_json::Value`] tree first (see
//! [`common::xml_value`]), with any XML embedded in strings expanded in
//! place, and typed structures are deserialized from that tree.
//!
//! ## Usage
//!
//! ```rust
//! use soundbar_parser::{decode_notification, ChangeKind, ChangeSet};
//!
//! let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event&gt;&lt;InstanceID val="0"&gt;&lt;TransportState val="PLAYING"/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#;
//!
//! let notification = decode_notification(body)?;
//! let change_set = ChangeSet::decode(ChangeKind::AvTransport, notification.last_change)?;
//! # Ok::<(), soundbar_parser::ParseError>(())
//! ```

pub mod common;
pub mod error;
pub mod last_change;
pub mod property_set;
pub mod services;

pub use common::{StateVariable, TrackMetaData, TrackMetaDataItem, TrackResource};
pub use error::{ParseError, ParseResult};
pub use last_change::{decode_last_change, ChangeKind, ChangeSet};
pub use property_set::{decode_notification, parse_property_set, Notification};
pub use services::{
    AvTransportEvent, AvTransportInstance, MediaInfoResponse, RenderingControlEvent,
    RenderingControlInstance,
};
