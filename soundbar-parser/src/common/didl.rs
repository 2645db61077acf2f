//! DIDL-Lite track metadata structures

use serde::{Deserialize, Serialize};

use super::attributes::{first_of, text_content};

/// Expanded DIDL-Lite document.
///
/// The `DIDL-Lite` wrapper is collapsed during expansion, so this is the
/// document body:
///
/// ```xml
/// <DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/" ...>
///   <item id="0">
///     <dc:title>Song Title</dc:title>
///     <dc:creator>Artist Name</dc:creator>
///     <upnp:album>Album Name</upnp:album>
///     <upnp:albumArtURI>http://..</upnp:albumArtURI>
///     <res protocolInfo="http-get:*:audio/mpeg:*" duration="00:03:58.000">uri</res>
///   </item>
/// </DIDL-Lite>
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrackMetaData {
    pub item: TrackMetaDataItem,
}

/// Item in DIDL-Lite metadata containing track information.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct TrackMetaDataItem {
    #[serde(default, deserialize_with = "text_content")]
    pub id: Option<String>,

    /// `dc:title`
    #[serde(default, deserialize_with = "text_content")]
    pub title: Option<String>,

    /// `dc:creator`
    #[serde(default, deserialize_with = "text_content")]
    pub creator: Option<String>,

    /// `upnp:artist`
    #[serde(default, deserialize_with = "text_content")]
    pub artist: Option<String>,

    /// `upnp:album`
    #[serde(default, deserialize_with = "text_content")]
    pub album: Option<String>,

    /// `upnp:albumArtURI`
    #[serde(rename = "albumArtURI", default, deserialize_with = "text_content")]
    pub album_art_uri: Option<String>,

    #[serde(default, deserialize_with = "first_of")]
    pub res: Option<TrackResource>,
}

/// Resource element with the media URI and its duration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(from = "TrackResourceRepr")]
pub struct TrackResource {
    pub protocol_info: Option<String>,
    /// Duration as `H:MM:SS[.fff]`
    pub duration: Option<String>,
    pub uri: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TrackResourceRepr {
    Uri(String),
    Full {
        #[serde(rename = "protocolInfo", default)]
        protocol_info: Option<String>,
        #[serde(default)]
        duration: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
}

impl From<TrackResourceRepr> for TrackResource {
    fn from(repr: TrackResourceRepr) -> Self {
        match repr {
            TrackResourceRepr::Uri(uri) => Self {
                uri: Some(uri),
                ..Self::default()
            },
            TrackResourceRepr::Full {
                protocol_info,
                duration,
                text,
            } => Self {
                protocol_info,
                duration,
                uri: text,
            },
        }
    }
}

impl TrackMetaDataItem {
    /// The `res@duration` attribute, if any
    pub fn duration(&self) -> Option<&str> {
        self.res.as_ref().and_then(|res| res.duration.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::expand_embedded_xml;
    use serde_json::{json, Value};

    fn decode(didl: &str) -> TrackMetaData {
        let expanded = expand_embedded_xml(Value::String(didl.to_string()));
        serde_json::from_value(expanded).unwrap()
    }

    #[test]
    fn test_full_item() {
        let metadata = decode(
            r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/" xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"><item id="0"><song:id xmlns:song="www.wiimu.com/song/">123</song:id><res protocolInfo="http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01;" duration="00:03:58.000">https://example.com/track.mp3</res><dc:title>Chasing Cars</dc:title><dc:creator>Snow Patrol</dc:creator><upnp:artist>Snow Patrol</upnp:artist><upnp:album>Eyes Open</upnp:album><upnp:albumArtURI>https://example.com/cover.jpg</upnp:albumArtURI></item></DIDL-Lite>"#,
        );

        let item = metadata.item;
        assert_eq!(item.id.as_deref(), Some("0"));
        assert_eq!(item.title.as_deref(), Some("Chasing Cars"));
        assert_eq!(item.creator.as_deref(), Some("Snow Patrol"));
        assert_eq!(item.album.as_deref(), Some("Eyes Open"));
        assert_eq!(item.album_art_uri.as_deref(), Some("https://example.com/cover.jpg"));
        assert_eq!(item.duration(), Some("00:03:58.000"));
        assert_eq!(
            item.res.and_then(|r| r.uri).as_deref(),
            Some("https://example.com/track.mp3")
        );
    }

    #[test]
    fn test_album_art_with_attributes_and_multiple_res() {
        let metadata: TrackMetaData = serde_json::from_value(json!({"item": {
            "albumArtURI": {"profileID": "JPEG_TN", "text": "http://cover"},
            "res": [
                {"protocolInfo": "a", "duration": "0:01:00", "text": "http://one"},
                {"protocolInfo": "b", "duration": "0:02:00", "text": "http://two"}
            ]
        }}))
        .unwrap();

        assert_eq!(metadata.item.album_art_uri.as_deref(), Some("http://cover"));
        assert_eq!(metadata.item.duration(), Some("0:01:00"));
    }

    #[test]
    fn test_bare_res_and_empty_fields() {
        let metadata: TrackMetaData = serde_json::from_value(json!({"item": {
            "title": null,
            "res": "http://stream"
        }}))
        .unwrap();

        assert_eq!(metadata.item.title, None);
        assert_eq!(metadata.item.duration(), None);
        assert_eq!(
            metadata.item.res.and_then(|r| r.uri).as_deref(),
            Some("http://stream")
        );
    }
}
