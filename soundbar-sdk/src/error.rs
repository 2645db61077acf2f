//! Error types for the soundbar SDK

use soap_client::SoapError;
use soundbar_parser::ParseError;
use thiserror::Error;

use crate::service::Service;

/// Errors surfaced by [`Soundbar`](crate::Soundbar) operations
#[derive(Error, Debug)]
pub enum SoundbarError {
    /// Invalid construction arguments
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The device rejected or failed a SOAP action
    #[error("Action invocation failed: {0}")]
    ActionInvocation(#[from] ActionError),

    /// SUBSCRIBE, renewal or UNSUBSCRIBE failed for a service.
    ///
    /// Only logged and retried by the listener, never returned to callers.
    #[error("Subscription to {service} failed: {source}")]
    Subscription {
        service: Service,
        #[source]
        source: SoapError,
    },

    /// An event payload or action response did not have the expected shape
    #[error("Payload decode failed: {0}")]
    PayloadDecode(#[from] ParseError),

    /// The listener worker failed; re-raised once to `start_listening`
    #[error("Listener worker failed: {0}")]
    Worker(String),

    /// A caller-supplied value was out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Causes of [`SoundbarError::ActionInvocation`]
#[derive(Error, Debug)]
pub enum ActionError {
    /// The action isn't in the service's action table
    #[error(
        "Unexpected action '{action}' for service '{service}'. Must be one of '{}'",
        .valid.join("', '")
    )]
    UnknownAction {
        service: Service,
        action: String,
        valid: Vec<String>,
    },

    /// The device description doesn't list the service
    #[error("Service '{0}' is not available on this device")]
    ServiceUnavailable(Service),

    /// The device description couldn't be fetched or parsed
    #[error("Device description unavailable: {0}")]
    Description(String),

    /// Transport failure or device fault
    #[error(transparent)]
    Soap(#[from] SoapError),

    /// No runtime could be created to run the call
    #[error("Failed to run action: {0}")]
    Runtime(String),
}

impl SoundbarError {
    /// The UPnP fault code when a device fault caused this error
    pub fn fault_code(&self) -> Option<u16> {
        match self {
            Self::ActionInvocation(ActionError::Soap(soap)) => soap.fault_code(),
            _ => None,
        }
    }
}

impl From<SoapError> for SoundbarError {
    fn from(err: SoapError) -> Self {
        Self::ActionInvocation(ActionError::Soap(err))
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, SoundbarError>;
