//! Shared decoding utilities and data structures
//!
//! - [`xml_value`]: XML to mapping conversion and embedded-XML expansion
//! - [`attributes`]: serde helpers for `LastChange` state variables
//! - [`didl`]: DIDL-Lite track metadata

pub mod attributes;
pub mod didl;
pub mod xml_value;

pub use attributes::StateVariable;
pub use didl::{TrackMetaData, TrackMetaDataItem, TrackResource};
pub use xml_value::{escape_bare_ampersands, expand_embedded_xml, xml_to_value};
