//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur during SOAP and GENA communication
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or transport failure, including timeouts
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The device answered with a non-success HTTP status and no SOAP fault
    #[error("HTTP {status}: {context}")]
    Http { status: u16, context: String },

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// SOAP fault returned by the device
    #[error("SOAP fault: error code {code}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Fault {
        code: u16,
        description: Option<String>,
    },
}

impl SoapError {
    /// The UPnP error code when this is a device fault
    pub fn fault_code(&self) -> Option<u16> {
        match self {
            SoapError::Fault { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn network(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SoapError::Network(format!("request timed out: {err}"))
        } else {
            SoapError::Network(err.to_string())
        }
    }
}
