//! Normalized track metadata

use std::fmt;

use serde::{Deserialize, Serialize};
use soundbar_parser::{AvTransportInstance, MediaInfoResponse, TrackMetaData, TrackMetaDataItem};

/// Album art placeholder the firmware reports when there is no artwork
const UNKNOWN_ALBUM_ART: &str = "un_known";

const NULL_TRACK: &str = "NULL";

/// Metadata of the track the device is playing.
///
/// Replaced wholesale on every change; never mutated in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackInfo {
    pub album_art_uri: Option<String>,
    pub album_name: Option<String>,
    pub artist: Option<String>,
    pub duration_seconds: f64,
    pub title: Option<String>,
}

/// The wire shapes track metadata arrives in
#[derive(Debug, Clone, Copy)]
pub enum TrackSource<'a> {
    /// A decoded `GetMediaInfo` response
    MediaInfo(&'a MediaInfoResponse),
    /// The `InstanceID` of an AVTransport event
    Event(&'a AvTransportInstance),
}

impl<'a> TrackSource<'a> {
    fn metadata(&self) -> Option<&'a TrackMetaData> {
        match self {
            TrackSource::MediaInfo(response) => response.current_uri_meta_data.as_ref(),
            TrackSource::Event(instance) => instance.current_track_meta_data.as_ref(),
        }
    }
}

impl TrackInfo {
    /// A track with no metadata at all
    pub fn null_track() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self == &Self::null_track()
    }

    /// Normalize either wire shape into a `TrackInfo`.
    ///
    /// A source without metadata yields the null track.
    pub fn from_source(source: TrackSource<'_>) -> Self {
        source
            .metadata()
            .map(|metadata| Self::from_item(&metadata.item))
            .unwrap_or_else(Self::null_track)
    }

    fn from_item(item: &TrackMetaDataItem) -> Self {
        Self {
            album_art_uri: item
                .album_art_uri
                .clone()
                .filter(|uri| uri != UNKNOWN_ALBUM_ART),
            album_name: item.album.clone(),
            artist: item.creator.clone().or_else(|| item.artist.clone()),
            duration_seconds: item.duration().map(parse_duration).unwrap_or(0.0),
            title: item.title.clone(),
        }
    }
}

impl fmt::Display for TrackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_none() && self.artist.is_none() {
            return f.write_str(NULL_TRACK);
        }

        write!(
            f,
            "'{}' by {}",
            self.title.as_deref().unwrap_or_default(),
            self.artist.as_deref().unwrap_or_default()
        )
    }
}

/// Parse an `H:MM:SS[.fff]` duration into whole seconds.
///
/// The fractional part is dropped. Anything unparseable is `0.0`.
pub fn parse_duration(duration: &str) -> f64 {
    let whole = duration.trim().split('.').next().unwrap_or_default();
    let parts: Vec<&str> = whole.split(':').collect();

    let [hours, minutes, seconds] = parts.as_slice() else {
        return 0.0;
    };

    match (
        hours.parse::<u64>(),
        minutes.parse::<u64>(),
        seconds.parse::<u64>(),
    ) {
        (Ok(h), Ok(m), Ok(s)) if m < 60 && s < 60 => (h * 3600 + m * 60 + s) as f64,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("00:04:27.000", 267.0)]
    #[case("0:03:58", 238.0)]
    #[case("1:00:00.5", 3600.0)]
    #[case("12:01:02", 43262.0)]
    #[case("", 0.0)]
    #[case("NOT_IMPLEMENTED", 0.0)]
    #[case("4:27", 0.0)]
    #[case("00:61:00", 0.0)]
    fn test_parse_duration(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(parse_duration(input), expected);
    }

    fn item(value: serde_json::Value) -> TrackMetaData {
        serde_json::from_value(json!({ "item": value })).unwrap()
    }

    #[test]
    fn test_normalization_rules() {
        let response = MediaInfoResponse {
            nr_tracks: None,
            media_duration: None,
            current_uri: None,
            current_uri_meta_data: Some(item(json!({
                "title": "Song",
                "artist": "Fallback Artist",
                "album": "Album",
                "albumArtURI": "un_known",
                "res": {"duration": "0:02:05.000", "protocolInfo": "x"}
            }))),
            track_source: None,
            other: Default::default(),
        };

        let track = TrackInfo::from_source(TrackSource::MediaInfo(&response));
        assert_eq!(
            track,
            TrackInfo {
                album_art_uri: None,
                album_name: Some("Album".to_string()),
                artist: Some("Fallback Artist".to_string()),
                duration_seconds: 125.0,
                title: Some("Song".to_string()),
            }
        );
        assert_eq!(track.to_string(), "'Song' by Fallback Artist");
    }

    #[test]
    fn test_creator_preferred_over_artist() {
        let metadata = item(json!({"creator": "Creator", "artist": "Artist"}));
        assert_eq!(
            TrackInfo::from_item(&metadata.item).artist.as_deref(),
            Some("Creator")
        );
    }

    #[test]
    fn test_query_and_event_shapes_agree() {
        let metadata = json!({
            "item": {
                "title": "Mr. Brightside",
                "creator": "The Killers",
                "album": "Hot Fuss",
                "albumArtURI": "http://art/cover.jpg",
                "res": {"duration": "00:03:42.000", "text": "http://stream"}
            }
        });

        let response: MediaInfoResponse = serde_json::from_value(json!({
            "NrTracks": "1",
            "CurrentURIMetaData": metadata.clone()
        }))
        .unwrap();
        let instance: AvTransportInstance = serde_json::from_value(json!({
            "val": "0",
            "TransportState": "PLAYING",
            "CurrentTrackMetaData": metadata
        }))
        .unwrap();

        let from_query = TrackInfo::from_source(TrackSource::MediaInfo(&response));
        let from_event = TrackInfo::from_source(TrackSource::Event(&instance));

        assert_eq!(from_query, from_event);
        assert_eq!(from_event.duration_seconds, 222.0);
    }

    #[test]
    fn test_null_track() {
        let track = TrackInfo::null_track();
        assert!(track.is_null());
        assert_eq!(track.duration_seconds, 0.0);
        assert_eq!(track.to_string(), "NULL");
    }
}
