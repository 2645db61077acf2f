//! GENA NOTIFY body decoding.
//!
//! A NOTIFY body is a property set:
//!
//! ```xml
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property>
//!     <LastChange>&lt;Event xmlns=...&gt;...&lt;/Event&gt;</LastChange>
//!   </e:property>
//! </e:propertyset>
//! ```

use serde_json::{Map, Value};

use crate::common::{escape_bare_ampersands, expand_embedded_xml, xml_to_value};
use crate::error::{ParseError, ParseResult};

/// Name of the state variable carrying the change-set document
pub const LAST_CHANGE: &str = "LastChange";

/// A decoded NOTIFY body
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// The expanded `LastChange` document
    pub last_change: Value,
    /// Every other evented variable, expanded
    pub other_fields: Map<String, Value>,
}

/// Read the state variables of a property set, leaving values unexpanded.
pub fn parse_property_set(body: &str) -> ParseResult<Map<String, Value>> {
    let document = xml_to_value(&escape_bare_ampersands(body))?;

    let property_set = document
        .get("propertyset")
        .ok_or_else(|| ParseError::MissingField("propertyset".to_string()))?;

    let properties = match property_set {
        Value::Object(fields) => match fields.get("property") {
            Some(Value::Array(items)) => items.clone(),
            Some(item) => vec![item.clone()],
            None => Vec::new(),
        },
        Value::Null => Vec::new(),
        other => {
            return Err(ParseError::Shape(format!(
                "expected property elements, got {}",
                other
            )))
        }
    };

    let mut variables = Map::new();
    for property in properties {
        match property {
            Value::Object(fields) => variables.extend(fields),
            Value::Null => {}
            other => {
                return Err(ParseError::Shape(format!(
                    "expected a state variable inside property, got {}",
                    other
                )))
            }
        }
    }

    Ok(variables)
}

/// Decode a NOTIFY body, expanding embedded XML and splitting out `LastChange`.
///
/// # Example
///
/// ```
/// use soundbar_parser::decode_notification;
///
/// let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event&gt;&lt;InstanceID val="0"&gt;&lt;Mute channel="Master" val="0"/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#;
///
/// let notification = decode_notification(body).unwrap();
/// assert_eq!(notification.last_change["Event"]["InstanceID"]["Mute"]["val"], "0");
/// assert!(notification.other_fields.is_empty());
/// ```
pub fn decode_notification(body: &str) -> ParseResult<Notification> {
    let variables = parse_property_set(body)?;

    let mut expanded = match expand_embedded_xml(Value::Object(variables)) {
        Value::Object(fields) => fields,
        other => {
            return Err(ParseError::Shape(format!(
                "property set collapsed to a single value: {}",
                other
            )))
        }
    };

    let last_change = expanded
        .remove(LAST_CHANGE)
        .ok_or_else(|| ParseError::MissingField(LAST_CHANGE.to_string()))?;

    Ok(Notification {
        last_change,
        other_fields: expanded,
    })
}
