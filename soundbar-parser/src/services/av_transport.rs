//! AVTransport `LastChange` and the `GetMediaInfo` response

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::attributes::{metadata_or_none, text_content};
use crate::common::TrackMetaData;

/// `<Event>` body of an AVTransport `LastChange`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AvTransportEvent {
    #[serde(rename = "InstanceID")]
    pub instance: AvTransportInstance,
}

/// The `<InstanceID>` element of an AVTransport event.
///
/// Only the fields the player consumes are typed; everything else the device
/// reports is kept in `other`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AvTransportInstance {
    /// Instance id, always `0` on this class of device
    pub val: String,

    #[serde(rename = "TransportState")]
    pub transport_state: String,

    #[serde(rename = "TransportStatus", default, deserialize_with = "text_content")]
    pub transport_status: Option<String>,

    #[serde(
        rename = "CurrentTrackMetaData",
        default,
        deserialize_with = "metadata_or_none"
    )]
    pub current_track_meta_data: Option<TrackMetaData>,

    #[serde(
        rename = "AVTransportURIMetaData",
        default,
        deserialize_with = "metadata_or_none"
    )]
    pub av_transport_uri_meta_data: Option<TrackMetaData>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Decoded `GetMediaInfo` action response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MediaInfoResponse {
    #[serde(rename = "NrTracks", default, deserialize_with = "text_content")]
    pub nr_tracks: Option<String>,

    #[serde(rename = "MediaDuration", default, deserialize_with = "text_content")]
    pub media_duration: Option<String>,

    #[serde(rename = "CurrentURI", default, deserialize_with = "text_content")]
    pub current_uri: Option<String>,

    #[serde(
        rename = "CurrentURIMetaData",
        default,
        deserialize_with = "metadata_or_none"
    )]
    pub current_uri_meta_data: Option<TrackMetaData>,

    #[serde(rename = "TrackSource", default, deserialize_with = "text_content")]
    pub track_source: Option<String>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instance_with_metadata_and_passthrough() {
        let instance: AvTransportInstance = serde_json::from_value(json!({
            "val": "0",
            "TransportState": "PLAYING",
            "NumberOfTracks": "1",
            "CurrentTrackMetaData": {"item": {"title": "Song", "creator": "Band"}}
        }))
        .unwrap();

        assert_eq!(instance.transport_state, "PLAYING");
        let item = instance.current_track_meta_data.unwrap().item;
        assert_eq!(item.title.as_deref(), Some("Song"));
        assert_eq!(instance.other["NumberOfTracks"], json!("1"));
        assert!(!instance.other.contains_key("TransportState"));
    }

    #[test]
    fn test_missing_metadata_markers() {
        for marker in [json!(""), json!("NOT_IMPLEMENTED"), json!(null), json!({"item": null})] {
            let instance: AvTransportInstance = serde_json::from_value(json!({
                "val": "0",
                "TransportState": "STOPPED",
                "CurrentTrackMetaData": marker
            }))
            .unwrap();

            assert!(instance.current_track_meta_data.is_none());
        }
    }

    #[test]
    fn test_transport_state_required() {
        let result = serde_json::from_value::<AvTransportInstance>(json!({"val": "0"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_media_info_response() {
        let response: MediaInfoResponse = serde_json::from_value(json!({
            "NrTracks": "0",
            "MediaDuration": "00:00:00",
            "CurrentURI": "http://stream",
            "CurrentURIMetaData": {"item": {"title": "Song"}},
            "PlayMedium": "NETWORK"
        }))
        .unwrap();

        assert_eq!(response.current_uri.as_deref(), Some("http://stream"));
        assert!(response.current_uri_meta_data.is_some());
        assert_eq!(response.other["PlayMedium"], json!("NETWORK"));
    }
}
