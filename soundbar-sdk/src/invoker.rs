//! SOAP action invocation from the sync API
//!
//! Every call is validated against the service's static action table before
//! anything touches the network, then runs on a short-lived runtime.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use soap_client::{response_fields, SoapClient};
use soundbar_parser::common::expand_embedded_xml;

use crate::descriptor::DescriptorCache;
use crate::error::{ActionError, Result};
use crate::player::{transport_action, TransportState};
use crate::runtime::TaskRunner;
use crate::service::Service;

/// UPnP error code for a transition the transport can't make right now
pub const TRANSITION_NOT_AVAILABLE: u16 = 701;

/// Decoded action response, one entry per output argument
pub type ActionResponse = Map<String, Value>;

/// A single SOAP argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ArgValue {
    /// The value as it appears on the wire, before XML escaping
    pub fn to_wire(&self) -> String {
        match self {
            ArgValue::Str(value) => value.clone(),
            ArgValue::Int(value) => value.to_string(),
            ArgValue::Bool(true) => "1".to_string(),
            ArgValue::Bool(false) => "0".to_string(),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Str(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

/// One action call: service, action name and ordered arguments.
///
/// `prior_state` is the transport state cached before the caller's
/// optimistic update; it decides whether a 701 fault is a harmless repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub service: Service,
    pub action: String,
    pub args: Vec<(String, ArgValue)>,
    pub prior_state: Option<TransportState>,
}

impl ActionRequest {
    pub fn new(service: Service, action: impl Into<String>) -> Self {
        Self {
            service,
            action: action.into(),
            args: Vec::new(),
            prior_state: None,
        }
    }

    /// Append an argument
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    pub fn with_prior_state(mut self, state: Option<TransportState>) -> Self {
        self.prior_state = state;
        self
    }

    /// Check the action against the service's static table
    pub fn validate(&self) -> std::result::Result<(), ActionError> {
        if self.service.supports(&self.action) {
            return Ok(());
        }

        Err(ActionError::UnknownAction {
            service: self.service,
            action: self.action.clone(),
            valid: self.service.actions().iter().map(|a| a.to_string()).collect(),
        })
    }

    /// Whether a 701 fault for this request means "already there".
    ///
    /// True only for AVTransport when the prior state is known and maps to
    /// exactly this action.
    pub fn is_redundant_transition(&self) -> bool {
        if self.service != Service::AvTransport {
            return false;
        }

        match self.prior_state {
            Some(state) if state != TransportState::Unknown => {
                transport_action(state) == Some(self.action.as_str())
            }
            _ => false,
        }
    }

    fn wire_args(&self) -> Vec<(String, String)> {
        self.args
            .iter()
            .map(|(name, value)| (name.clone(), value.to_wire()))
            .collect()
    }
}

/// Sends action requests to a device.
///
/// The player state machine only sees this trait, so tests can record
/// requests instead of sending them.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, request: ActionRequest) -> Result<ActionResponse>;
}

/// [`ActionDispatcher`] that talks SOAP to the device
pub struct ActionInvoker {
    client: SoapClient,
    descriptors: Arc<DescriptorCache>,
    runner: TaskRunner,
}

impl ActionInvoker {
    pub fn new(client: SoapClient, descriptors: Arc<DescriptorCache>, runner: TaskRunner) -> Self {
        Self {
            client,
            descriptors,
            runner,
        }
    }

    pub fn descriptors(&self) -> &Arc<DescriptorCache> {
        &self.descriptors
    }

    async fn send(&self, request: &ActionRequest) -> std::result::Result<ActionResponse, ActionError> {
        let descriptor = self.descriptors.descriptor(request.service).await?;

        // The device's own SCPD is authoritative once fetched
        if !descriptor.action_names.is_empty() && !descriptor.supports(&request.action) {
            return Err(ActionError::UnknownAction {
                service: request.service,
                action: request.action.clone(),
                valid: descriptor.action_names.iter().cloned().collect(),
            });
        }

        let response = self
            .client
            .call(
                &descriptor.control_url,
                &descriptor.service_type,
                &request.action,
                &request.wire_args(),
            )
            .await?;

        Ok(decode_response(response_fields(&response)))
    }
}

impl ActionDispatcher for ActionInvoker {
    fn dispatch(&self, request: ActionRequest) -> Result<ActionResponse> {
        request.validate()?;

        let outcome = self.runner.block_on(self.send(&request))?;

        match outcome {
            Ok(response) => Ok(response),
            Err(ActionError::Soap(err))
                if err.fault_code() == Some(TRANSITION_NOT_AVAILABLE)
                    && request.is_redundant_transition() =>
            {
                tracing::debug!(
                    service = %request.service,
                    action = %request.action,
                    "Ignoring transition fault for repeated action"
                );
                Ok(ActionResponse::new())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Turn response fields into a mapping, expanding embedded XML documents
pub fn decode_response(fields: Vec<(String, String)>) -> ActionResponse {
    fields
        .into_iter()
        .map(|(name, text)| (name, expand_embedded_xml(Value::String(text))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_arg_values_on_the_wire() {
        assert_eq!(ArgValue::from(true).to_wire(), "1");
        assert_eq!(ArgValue::from(false).to_wire(), "0");
        assert_eq!(ArgValue::from(42i64).to_wire(), "42");
        assert_eq!(ArgValue::from("Master").to_wire(), "Master");
    }

    #[test]
    fn test_builder_keeps_argument_order() {
        let request = ActionRequest::new(Service::RenderingControl, "SetVolume")
            .arg("InstanceID", 0)
            .arg("Channel", "Master")
            .arg("DesiredVolume", 35);

        assert_eq!(
            request.wire_args(),
            vec![
                ("InstanceID".to_string(), "0".to_string()),
                ("Channel".to_string(), "Master".to_string()),
                ("DesiredVolume".to_string(), "35".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_action_fails_validation() {
        let err = ActionRequest::new(Service::AvTransport, "SetVolume")
            .validate()
            .unwrap_err();

        match err {
            ActionError::UnknownAction { service, action, valid } => {
                assert_eq!(service, Service::AvTransport);
                assert_eq!(action, "SetVolume");
                assert!(valid.contains(&"Play".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[rstest]
    #[case(Some(TransportState::Playing), "Play", true)]
    #[case(Some(TransportState::Paused), "Pause", true)]
    #[case(Some(TransportState::Stopped), "Stop", true)]
    #[case(Some(TransportState::Playing), "Pause", false)]
    #[case(Some(TransportState::Unknown), "Play", false)]
    #[case(Some(TransportState::NoMedia), "Play", false)]
    #[case(None, "Play", false)]
    fn test_redundant_transition(
        #[case] prior: Option<TransportState>,
        #[case] action: &str,
        #[case] expected: bool,
    ) {
        let request = ActionRequest::new(Service::AvTransport, action).with_prior_state(prior);
        assert_eq!(request.is_redundant_transition(), expected);
    }

    #[test]
    fn test_decode_response_expands_metadata() {
        let response = decode_response(vec![
            ("NrTracks".to_string(), "1".to_string()),
            (
                "CurrentURIMetaData".to_string(),
                r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/"><item><dc:title>Song</dc:title></item></DIDL-Lite>"#
                    .to_string(),
            ),
        ]);

        assert_eq!(response["NrTracks"], json!("1"));
        assert_eq!(response["CurrentURIMetaData"]["item"]["title"], json!("Song"));
    }
}
