//! Decoded event notifications

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use soundbar_parser::{decode_notification, ChangeSet, ParseError};

use crate::error::Result;
use crate::service::Service;

/// One decoded NOTIFY from the device.
///
/// Produced per notification and handed to the player and the event
/// callback; never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPayload {
    pub timestamp: DateTime<Utc>,
    pub service: Service,
    pub service_id: String,
    pub service_type: String,
    pub change_set: ChangeSet,
    /// Evented variables other than `LastChange`
    pub other_fields: Map<String, Value>,
}

impl EventPayload {
    /// Decode a NOTIFY body sent for `service`.
    ///
    /// Fails without side effects when the body, or its `LastChange`, isn't
    /// the shape `service` publishes.
    pub fn decode(service: Service, body: &str) -> Result<Self> {
        let kind = service.change_kind().ok_or_else(|| {
            ParseError::Shape(format!("service {} does not publish events", service))
        })?;

        let notification = decode_notification(body)?;
        let change_set = ChangeSet::decode(kind, notification.last_change)?;

        Ok(Self {
            timestamp: Utc::now(),
            service,
            service_id: service.service_id().to_string(),
            service_type: service.service_type().to_string(),
            change_set,
            other_fields: notification.other_fields,
        })
    }
}
