//! Serde helpers for the shapes produced by [`xml_to_value`].
//!
//! [`xml_to_value`]: super::xml_to_value

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::didl::TrackMetaData;
use super::xml_value::TEXT_KEY;

/// A `LastChange` state variable such as `<Volume channel="Master" val="40"/>`.
///
/// Variables without a `channel` attribute collapse to their bare `val` during
/// expansion, so a plain string is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StateVariableRepr")]
pub struct StateVariable {
    pub channel: Option<String>,
    pub val: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateVariableRepr {
    Bare(String),
    Full {
        #[serde(default)]
        channel: Option<String>,
        val: String,
    },
}

impl From<StateVariableRepr> for StateVariable {
    fn from(repr: StateVariableRepr) -> Self {
        match repr {
            StateVariableRepr::Bare(val) => Self { channel: None, val },
            StateVariableRepr::Full { channel, val } => Self { channel, val },
        }
    }
}

impl StateVariable {
    /// Whether this variable applies to the master channel (or names none)
    pub fn is_master(&self) -> bool {
        self.channel.as_deref().map_or(true, |c| c == "Master")
    }

    /// The value as a number, if it is one
    pub fn as_f64(&self) -> Option<f64> {
        self.val.trim().parse().ok()
    }

    /// The value as a UPnP boolean (`1`/`0`, `true`/`false`)
    pub fn as_bool(&self) -> Option<bool> {
        match self.val.trim() {
            "1" | "true" | "True" => Some(true),
            "0" | "false" | "False" => Some(false),
            _ => None,
        }
    }
}

/// Deserialize one-or-many state variables, keeping the master channel's.
pub fn master_channel<'de, D>(deserializer: D) -> Result<Option<StateVariable>, D::Error>
where
    D: Deserializer<'de>,
{
    let variables: Option<OneOrMany<StateVariable>> = Option::deserialize(deserializer)?;

    Ok(variables.and_then(|variables| {
        let mut variables = variables.into_vec();
        let master = variables.iter().position(StateVariable::is_master).unwrap_or(0);
        (!variables.is_empty()).then(|| variables.swap_remove(master))
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Deserialize the first of one-or-many values.
pub fn first_of<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values: Option<OneOrMany<T>> = Option::deserialize(deserializer)?;
    Ok(values.and_then(|values| values.into_vec().into_iter().next()))
}

/// Deserialize element text, looking through attribute maps.
///
/// `<upnp:albumArtURI dlna:profileID="JPEG_TN">http://..</upnp:albumArtURI>`
/// decodes to a map with the URI under `text`; this helper returns just the
/// URI. Repeated elements yield the first one's text.
pub fn text_content<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn text_of(value: Value) -> Option<String> {
        match value {
            Value::String(text) => Some(text),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Object(mut fields) => fields.remove(TEXT_KEY).and_then(text_of),
            Value::Array(items) => items.into_iter().next().and_then(text_of),
            Value::Null => None,
        }
    }

    Ok(text_of(Value::deserialize(deserializer)?))
}

/// Deserialize a track metadata field, treating anything without an `item`
/// as absent.
///
/// Devices report missing metadata as an empty string, `NOT_IMPLEMENTED`, or
/// an empty DIDL-Lite document.
pub fn metadata_or_none<'de, D>(deserializer: D) -> Result<Option<TrackMetaData>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(fields) if fields.get("item").is_some_and(|item| !item.is_null()) => {
            serde_json::from_value(Value::Object(fields))
                .map(Some)
                .map_err(D::Error::custom)
        }
        _ => Ok(None),
    }
}
