//! Typed `LastChange` change-sets.
//!
//! An expanded `LastChange` document must be a mapping with exactly one key,
//! `Event`. Anything else is rejected rather than guessed at.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParseError, ParseResult};
use crate::services::{AvTransportEvent, RenderingControlEvent};

/// Key wrapping every `LastChange` document
pub const EVENT_KEY: &str = "Event";

/// Which service's change-set shape to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    AvTransport,
    RenderingControl,
}

/// A service-specific change-set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "service", content = "event")]
pub enum ChangeSet {
    AvTransport(AvTransportEvent),
    RenderingControl(RenderingControlEvent),
}

impl ChangeSet {
    /// Decode an expanded `LastChange` document for the given service.
    pub fn decode(kind: ChangeKind, last_change: Value) -> ParseResult<Self> {
        match kind {
            ChangeKind::AvTransport => decode_last_change(last_change).map(Self::AvTransport),
            ChangeKind::RenderingControl => {
                decode_last_change(last_change).map(Self::RenderingControl)
            }
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::AvTransport(_) => ChangeKind::AvTransport,
            Self::RenderingControl(_) => ChangeKind::RenderingControl,
        }
    }
}

/// Unwrap the `Event` key of a `LastChange` mapping and deserialize it.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use soundbar_parser::{decode_last_change, ParseError, RenderingControlEvent};
///
/// let err = decode_last_change::<RenderingControlEvent>(json!({"Event": {}, "extra": 1}))
///     .unwrap_err();
/// assert_eq!(err, ParseError::UnexpectedKeys(vec!["extra".to_string()]));
/// ```
pub fn decode_last_change<T: DeserializeOwned>(payload: Value) -> ParseResult<T> {
    let mut fields = match payload {
        Value::Object(fields) => fields,
        other => {
            return Err(ParseError::Shape(format!(
                "expected a mapping with an {EVENT_KEY} key, got {other}"
            )))
        }
    };

    let event = fields.remove(EVENT_KEY);

    if !fields.is_empty() {
        let mut unexpected: Vec<String> = fields.keys().cloned().collect();
        unexpected.sort();
        return Err(ParseError::UnexpectedKeys(unexpected));
    }

    let event = event.ok_or_else(|| ParseError::MissingField(EVENT_KEY.to_string()))?;

    serde_json::from_value(event).map_err(|e| ParseError::Shape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn av_event(state: &str) -> Value {
        json!({"Event": {"InstanceID": {"val": "0", "TransportState": state}}})
    }

    #[test]
    fn test_decode_av_transport() {
        let change_set = ChangeSet::decode(ChangeKind::AvTransport, av_event("PLAYING")).unwrap();

        match change_set {
            ChangeSet::AvTransport(event) => {
                assert_eq!(event.instance.transport_state, "PLAYING");
                assert!(event.instance.current_track_meta_data.is_none());
            }
            other => panic!("unexpected change set {:?}", other),
        }
    }

    #[test]
    fn test_extra_keys_are_named() {
        let mut payload = av_event("PLAYING");
        payload["extra"] = json!(1);
        payload["another"] = json!("x");

        let err = ChangeSet::decode(ChangeKind::AvTransport, payload).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedKeys(vec!["another".to_string(), "extra".to_string()])
        );
        assert!(err.to_string().contains("extra"));
    }

    #[rstest]
    #[case::missing_event(json!({}), ParseError::MissingField("Event".to_string()))]
    #[case::not_a_mapping(json!("<Event"), ParseError::Shape(
        "expected a mapping with an Event key, got \"<Event\"".to_string()
    ))]
    fn test_malformed_payloads(#[case] payload: Value, #[case] expected: ParseError) {
        assert_eq!(
            decode_last_change::<AvTransportEvent>(payload).unwrap_err(),
            expected
        );
    }

    #[test]
    fn test_wrong_service_shape() {
        let err = ChangeSet::decode(
            ChangeKind::AvTransport,
            json!({"Event": {"InstanceID": {"val": "0", "Volume": "40"}}}),
        )
        .unwrap_err();

        assert!(matches!(err, ParseError::Shape(_)));
    }
}
