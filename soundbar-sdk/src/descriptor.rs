//! Device description fetching and memoization
//!
//! The description document lists each service's control and event URLs,
//! plus a link to its SCPD document with the action list. Descriptors are
//! fetched on first use and kept for the lifetime of the device; a failed
//! fetch is not cached.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use soap_client::SoapClient;
use url::Url;

use crate::error::ActionError;
use crate::service::Service;

/// Resolved endpoints and actions of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service: Service,
    pub service_id: String,
    pub service_type: String,
    /// Absolute control URL
    pub control_url: String,
    /// Absolute event subscription URL
    pub event_sub_url: String,
    pub action_names: BTreeSet<String>,
}

impl ServiceDescriptor {
    pub fn supports(&self, action: &str) -> bool {
        self.action_names.contains(action)
    }
}

// Description document structures

#[derive(Debug, Deserialize)]
struct DescriptionRoot {
    #[serde(rename = "URLBase", default)]
    url_base: Option<String>,
    device: DeviceDescription,
}

#[derive(Debug, Deserialize)]
struct DeviceDescription {
    #[serde(rename = "serviceList", default)]
    service_list: Option<ServiceList>,
    #[serde(rename = "deviceList", default)]
    device_list: Option<DeviceList>,
}

#[derive(Debug, Deserialize)]
struct ServiceList {
    #[serde(rename = "service", default)]
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(rename = "device", default)]
    devices: Vec<DeviceDescription>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceEntry {
    #[serde(rename = "serviceType")]
    service_type: String,
    #[serde(rename = "serviceId")]
    service_id: String,
    #[serde(rename = "controlURL")]
    control_url: String,
    #[serde(rename = "eventSubURL")]
    event_sub_url: String,
    #[serde(rename = "SCPDURL", default)]
    scpd_url: Option<String>,
}

impl DeviceDescription {
    fn collect_services(self, out: &mut Vec<ServiceEntry>) {
        if let Some(list) = self.service_list {
            out.extend(list.services);
        }
        if let Some(list) = self.device_list {
            for device in list.devices {
                device.collect_services(out);
            }
        }
    }
}

// SCPD document structures

#[derive(Debug, Deserialize)]
struct Scpd {
    #[serde(rename = "actionList", default)]
    action_list: Option<ActionList>,
}

#[derive(Debug, Deserialize)]
struct ActionList {
    #[serde(rename = "action", default)]
    actions: Vec<ActionEntry>,
}

#[derive(Debug, Deserialize)]
struct ActionEntry {
    name: String,
}

/// Lazily fetched, memoized service directory of one device.
pub struct DescriptorCache {
    description_url: String,
    client: SoapClient,
    cached: RwLock<Option<Arc<Vec<ServiceDescriptor>>>>,
}

impl DescriptorCache {
    pub fn new(description_url: impl Into<String>, client: SoapClient) -> Self {
        Self {
            description_url: description_url.into(),
            client,
            cached: RwLock::new(None),
        }
    }

    pub fn description_url(&self) -> &str {
        &self.description_url
    }

    /// Descriptors if they have been fetched already
    pub fn cached(&self) -> Option<Arc<Vec<ServiceDescriptor>>> {
        self.cached.read().clone()
    }

    /// All known services the device describes, fetched on first use.
    pub async fn describe(&self) -> Result<Arc<Vec<ServiceDescriptor>>, ActionError> {
        let cached = self.cached();
        if let Some(descriptors) = cached {
            return Ok(descriptors);
        }

        let descriptors = Arc::new(self.fetch().await?);
        tracing::debug!(
            description_url = %self.description_url,
            services = descriptors.len(),
            "Fetched device description"
        );

        *self.cached.write() = Some(descriptors.clone());
        Ok(descriptors)
    }

    /// Descriptor of a single service
    pub async fn descriptor(&self, service: Service) -> Result<ServiceDescriptor, ActionError> {
        self.describe()
            .await?
            .iter()
            .find(|descriptor| descriptor.service == service)
            .cloned()
            .ok_or(ActionError::ServiceUnavailable(service))
    }

    async fn fetch(&self) -> Result<Vec<ServiceDescriptor>, ActionError> {
        let xml = self
            .client
            .fetch(&self.description_url)
            .await
            .map_err(|e| ActionError::Description(e.to_string()))?;

        let (base, entries) = parse_description(&self.description_url, &xml)?;

        let mut descriptors = Vec::new();
        for entry in entries {
            let Some(service) = Service::from_service_id(entry.service_id.trim()) else {
                tracing::trace!(service_id = %entry.service_id, "Skipping unknown service");
                continue;
            };

            let action_names = match &entry.scpd_url {
                Some(scpd_url) if !scpd_url.trim().is_empty() => {
                    self.fetch_action_names(&resolve(&base, scpd_url)?).await?
                }
                _ => static_action_names(service),
            };

            descriptors.push(ServiceDescriptor {
                service,
                service_id: entry.service_id.trim().to_string(),
                service_type: entry.service_type.trim().to_string(),
                control_url: resolve(&base, &entry.control_url)?,
                event_sub_url: resolve(&base, &entry.event_sub_url)?,
                action_names,
            });
        }

        Ok(descriptors)
    }

    async fn fetch_action_names(&self, scpd_url: &str) -> Result<BTreeSet<String>, ActionError> {
        let xml = self
            .client
            .fetch(scpd_url)
            .await
            .map_err(|e| ActionError::Description(format!("{}: {}", scpd_url, e)))?;

        parse_action_names(&xml)
    }
}

fn static_action_names(service: Service) -> BTreeSet<String> {
    service.actions().iter().map(|a| a.to_string()).collect()
}

fn parse_description(
    description_url: &str,
    xml: &str,
) -> Result<(Url, Vec<ServiceEntry>), ActionError> {
    let root: DescriptionRoot = quick_xml::de::from_str(xml)
        .map_err(|e| ActionError::Description(format!("invalid device description: {}", e)))?;

    let base = root
        .url_base
        .as_deref()
        .map(str::trim)
        .filter(|base| !base.is_empty())
        .unwrap_or(description_url);

    let base = Url::parse(base)
        .map_err(|e| ActionError::Description(format!("invalid base URL {}: {}", base, e)))?;

    let mut entries = Vec::new();
    root.device.collect_services(&mut entries);
    Ok((base, entries))
}

fn parse_action_names(xml: &str) -> Result<BTreeSet<String>, ActionError> {
    let scpd: Scpd = quick_xml::de::from_str(xml)
        .map_err(|e| ActionError::Description(format!("invalid service description: {}", e)))?;

    Ok(scpd
        .action_list
        .map(|list| {
            list.actions
                .into_iter()
                .map(|action| action.name.trim().to_string())
                .collect()
        })
        .unwrap_or_default())
}

fn resolve(base: &Url, path: &str) -> Result<String, ActionError> {
    base.join(path.trim())
        .map(String::from)
        .map_err(|e| ActionError::Description(format!("invalid service URL {}: {}", path, e)))
}
