//! RenderingControl `LastChange`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::attributes::master_channel;
use crate::common::StateVariable;

/// `<Event>` body of a RenderingControl `LastChange`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RenderingControlEvent {
    #[serde(rename = "InstanceID")]
    pub instance: RenderingControlInstance,
}

/// The `<InstanceID>` element of a RenderingControl event.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RenderingControlInstance {
    pub val: String,

    #[serde(rename = "Mute", default, deserialize_with = "master_channel")]
    pub mute: Option<StateVariable>,

    /// Volume on the device's 0..100 scale
    #[serde(rename = "Volume", default, deserialize_with = "master_channel")]
    pub volume: Option<StateVariable>,

    #[serde(rename = "Channel", default, deserialize_with = "master_channel")]
    pub channel: Option<StateVariable>,

    /// Some firmware spells this `Equaluzer`
    #[serde(
        rename = "Equalizer",
        alias = "Equaluzer",
        default,
        deserialize_with = "master_channel"
    )]
    pub equalizer: Option<StateVariable>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RenderingControlInstance {
    /// Volume as a 0..1 level
    pub fn volume_level(&self) -> Option<f64> {
        self.volume.as_ref().and_then(StateVariable::as_f64).map(|v| v / 100.0)
    }

    pub fn is_muted(&self) -> Option<bool> {
        self.mute.as_ref().and_then(StateVariable::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instance_fields() {
        let instance: RenderingControlInstance = serde_json::from_value(json!({
            "val": "0",
            "Mute": {"channel": "Master", "val": "1"},
            "Volume": {"channel": "Master", "val": "35"},
            "Equaluzer": {"channel": "Master", "val": "Rock"},
            "PresetNameList": "Rock,Jazz"
        }))
        .unwrap();

        assert_eq!(instance.is_muted(), Some(true));
        assert_eq!(instance.volume_level(), Some(0.35));
        assert_eq!(instance.equalizer.unwrap().val, "Rock");
        assert_eq!(instance.other["PresetNameList"], json!("Rock,Jazz"));
    }

    #[test]
    fn test_all_variables_optional() {
        let instance: RenderingControlInstance =
            serde_json::from_value(json!({"val": "0"})).unwrap();

        assert_eq!(instance.volume_level(), None);
        assert_eq!(instance.is_muted(), None);
    }
}
