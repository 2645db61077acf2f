//! Wire client for UPnP media renderers
//!
//! Async SOAP 1.1 action calls for DLNA soundbars, plus the GENA side of
//! UPnP eventing. Plain GETs cover the description and SCPD documents.

mod error;

pub use error::SoapError;

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use xmltree::{Element, XMLNode};

/// Default connect timeout for every request
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default overall timeout for every request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A granted GENA subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// `SID` header of the response
    pub sid: String,
    /// Lease the device granted, which may differ from the one requested
    pub timeout_seconds: u32,
}

/// SOAP and GENA requests against one or more devices.
///
/// Cheap to clone; clones share the HTTP client.
#[derive(Debug, Clone)]
pub struct SoapClient {
    http: reqwest::Client,
}

impl SoapClient {
    /// Create a new SOAP client with the default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a new SOAP client with explicit connect and request timeouts
    pub fn with_timeouts(connect_timeout: Duration, request_timeout: Duration) -> Self {
        // No idle pool: connections are bound to the runtime that opened
        // them, and clones of this client outlive one-off runtimes.
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .pool_max_idle_per_host(0)
            .http1_title_case_headers()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self { http }
    }

    /// Send a SOAP request and return the parsed `{action}Response` element
    ///
    /// # Arguments
    /// * `control_url` - Absolute control URL of the service
    /// * `service_type` - Service type URN, used for the `SOAPAction` header
    ///   and the action element namespace
    /// * `action` - Action name, e.g. `Play`
    /// * `args` - Ordered `(name, value)` pairs, one child element each
    pub async fn call(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(String, String)],
    ) -> Result<Element, SoapError> {
        let body = envelope(service_type, action, args);
        let soap_action = format!("\"{}#{}\"", service_type, action);

        tracing::debug!(%control_url, %soap_action, "Sending SOAP request");

        let response = self
            .http
            .post(control_url)
            .header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", soap_action)
            .body(body)
            .send()
            .await
            .map_err(SoapError::network)?;

        let status = response.status();
        let xml_text = response.text().await.map_err(SoapError::network)?;

        // Faults arrive as HTTP 500 with a SOAP body, so parse before judging the status
        let xml = match Element::parse(xml_text.as_bytes()) {
            Ok(xml) => xml,
            Err(e) if status.is_success() => return Err(SoapError::Parse(e.to_string())),
            Err(_) => {
                return Err(SoapError::Http {
                    status: status.as_u16(),
                    context: format!("{} failed", action),
                })
            }
        };

        extract_response(&xml, action)
    }

    /// Subscribe to UPnP events for a service
    ///
    /// # Arguments
    /// * `event_url` - Absolute event subscription URL of the service
    /// * `callback_url` - URL where the device should send NOTIFY requests
    /// * `timeout_seconds` - Requested subscription timeout in seconds
    ///
    /// # Returns
    /// A `SubscriptionResponse` containing the SID and actual timeout
    pub async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        let response = self
            .http
            .request(gena_method("SUBSCRIBE")?, event_url)
            .header("CALLBACK", format!("<{}>", callback_url))
            .header("NT", "upnp:event")
            .header("TIMEOUT", format!("Second-{}", timeout_seconds))
            .send()
            .await
            .map_err(SoapError::network)?;

        if !response.status().is_success() {
            return Err(SoapError::Http {
                status: response.status().as_u16(),
                context: "SUBSCRIBE failed".to_string(),
            });
        }

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                SoapError::Parse("Missing SID header in SUBSCRIBE response".to_string())
            })?
            .to_string();

        let actual_timeout_seconds = granted_timeout(&response).unwrap_or(timeout_seconds);

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: actual_timeout_seconds,
        })
    }

    /// Renew an existing UPnP subscription
    ///
    /// Renewal carries only the SID and timeout; `NT` and `CALLBACK` are
    /// omitted as required by GENA.
    ///
    /// # Returns
    /// The actual timeout granted by the device
    pub async fn renew_subscription(
        &self,
        event_url: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<u32, SoapError> {
        let response = self
            .http
            .request(gena_method("SUBSCRIBE")?, event_url)
            .header("SID", sid)
            .header("TIMEOUT", format!("Second-{}", timeout_seconds))
            .send()
            .await
            .map_err(SoapError::network)?;

        if !response.status().is_success() {
            return Err(SoapError::Http {
                status: response.status().as_u16(),
                context: "SUBSCRIBE renewal failed".to_string(),
            });
        }

        Ok(granted_timeout(&response).unwrap_or(timeout_seconds))
    }

    /// Unsubscribe from UPnP events
    pub async fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        let response = self
            .http
            .request(gena_method("UNSUBSCRIBE")?, event_url)
            .header("SID", sid)
            .send()
            .await
            .map_err(SoapError::network)?;

        if !response.status().is_success() {
            return Err(SoapError::Http {
                status: response.status().as_u16(),
                context: "UNSUBSCRIBE failed".to_string(),
            });
        }

        Ok(())
    }

    /// Fetch a device document (description or SCPD) as text
    pub async fn fetch(&self, url: &str) -> Result<String, SoapError> {
        let response = self.http.get(url).send().await.map_err(SoapError::network)?;

        if !response.status().is_success() {
            return Err(SoapError::Http {
                status: response.status().as_u16(),
                context: format!("GET {} failed", url),
            });
        }

        response.text().await.map_err(SoapError::network)
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the SOAP 1.1 envelope for an action call
pub fn envelope(service_type: &str, action: &str, args: &[(String, String)]) -> String {
    let payload: String = args
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", escape_xml(value)))
        .collect();

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
            r#"<s:Body><u:{action} xmlns:u="{service_type}">{payload}</u:{action}></s:Body>"#,
            r#"</s:Envelope>"#
        ),
        action = action,
        service_type = service_type,
        payload = payload
    )
}

/// Escape the five XML special characters in element text
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Collect the direct child elements of a response as `(name, text)` pairs
///
/// Elements without text yield an empty string.
pub fn response_fields(response: &Element) -> Vec<(String, String)> {
    response
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(child) => Some((
                child.name.clone(),
                child.get_text().map(|t| t.into_owned()).unwrap_or_default(),
            )),
            _ => None,
        })
        .collect()
}

fn gena_method(name: &'static str) -> Result<Method, SoapError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| SoapError::Network(format!("invalid HTTP method {}: {}", name, e)))
}

fn granted_timeout(response: &reqwest::Response) -> Option<u32> {
    response
        .headers()
        .get("TIMEOUT")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Second-"))
        .and_then(|s| s.trim().parse::<u32>().ok())
}

fn extract_response(xml: &Element, action: &str) -> Result<Element, SoapError> {
    let body = xml
        .get_child("Body")
        .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

    if let Some(fault) = body.get_child("Fault") {
        let upnp_error = fault
            .get_child("detail")
            .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")));

        let code = upnp_error
            .and_then(|e| e.get_child("errorCode"))
            .and_then(|c| c.get_text())
            .and_then(|t| t.trim().parse::<u16>().ok())
            .unwrap_or(500);

        let description = upnp_error
            .and_then(|e| e.get_child("errorDescription"))
            .and_then(|d| d.get_text())
            .map(|t| t.into_owned());

        return Err(SoapError::Fault { code, description });
    }

    let response_name = format!("{}Response", action);
    body.get_child(response_name.as_str())
        .cloned()
        .ok_or_else(|| SoapError::Parse(format!("Missing {} element", response_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wraps_arguments_in_action_element() {
        let args = vec![
            ("InstanceID".to_string(), "0".to_string()),
            ("Speed".to_string(), "1".to_string()),
        ];
        let body = envelope("urn:schemas-upnp-org:service:AVTransport:1", "Play", &args);

        assert!(body.contains(
            r#"<u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"><InstanceID>0</InstanceID><Speed>1</Speed></u:Play>"#
        ));
        assert!(body.contains("<s:Body>"));

        // The envelope must be well formed
        let parsed = Element::parse(body.as_bytes()).unwrap();
        let action = parsed.get_child("Body").unwrap().get_child("Play").unwrap();
        assert_eq!(action.get_child("Speed").unwrap().get_text().unwrap(), "1");
    }

    #[test]
    fn test_envelope_escapes_argument_text() {
        let args = vec![("CurrentURI".to_string(), "http://x/?a=1&b=<2>".to_string())];
        let body = envelope("urn:schemas-upnp-org:service:AVTransport:1", "SetAVTransportURI", &args);

        assert!(body.contains("http://x/?a=1&amp;b=&lt;2&gt;"));
        assert!(Element::parse(body.as_bytes()).is_ok());
    }

    #[test]
    fn test_extract_response_with_valid_response() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:PlayResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
                    </u:PlayResponse>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        let response = extract_response(&xml, "Play").unwrap();
        assert_eq!(response.name, "PlayResponse");
    }

    #[test]
    fn test_extract_response_with_soap_fault() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>701</errorCode>
                                <errorDescription>Transition not available</errorDescription>
                            </UPnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Play").unwrap_err() {
            SoapError::Fault { code, description } => {
                assert_eq!(code, 701);
                assert_eq!(description.as_deref(), Some("Transition not available"));
            }
            other => panic!("Expected SoapError::Fault, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_response_missing_body() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Play").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing SOAP Body")),
            other => panic!("Expected SoapError::Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_response_missing_action_response() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Play").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing PlayResponse element")),
            other => panic!("Expected SoapError::Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_soap_fault_with_default_error_code() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Server</faultcode>
                        <faultstring>Internal Error</faultstring>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        let err = extract_response(&xml, "Play").unwrap_err();
        assert_eq!(err.fault_code(), Some(500));
    }

    #[test]
    fn test_response_fields_collects_child_text() {
        let xml_str = r#"
            <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
                <CurrentVolume>42</CurrentVolume>
                <Empty/>
            </u:GetVolumeResponse>
        "#;

        let element = Element::parse(xml_str.as_bytes()).unwrap();
        let fields = response_fields(&element);

        assert_eq!(
            fields,
            vec![
                ("CurrentVolume".to_string(), "42".to_string()),
                ("Empty".to_string(), String::new()),
            ]
        );
    }
}
