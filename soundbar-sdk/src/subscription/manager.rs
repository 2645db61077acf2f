//! Per-service GENA subscription bookkeeping
//!
//! Each target service moves through
//! `Unsubscribed -> Subscribing -> Subscribed -> Renewing -> Subscribed`,
//! or back to `Unsubscribed` through `RenewFailed` when a renewal is
//! refused. Failed services are retried with a fresh SUBSCRIBE on the next
//! renewal cycle.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use callback_server::EventRouter;
use chrono::{DateTime, Utc};
use soap_client::{SoapClient, SoapError, SubscriptionResponse};

use crate::config::LogVerbosity;
use crate::descriptor::ServiceDescriptor;
use crate::error::SoundbarError;
use crate::service::Service;

/// Lifecycle state of one service's subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Renewing,
    RenewFailed,
}

/// An accepted subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub service: Service,
    /// GENA `SID`; kept across renewals
    pub sid: String,
    /// Lease granted by the device
    pub lease_seconds: u32,
    /// When the lease was last granted
    pub established_at: DateTime<Utc>,
}

/// The GENA operations the manager needs
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError>;

    async fn renew(&self, event_url: &str, sid: &str, timeout_seconds: u32) -> Result<u32, SoapError>;

    async fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError>;
}

#[async_trait]
impl EventSubscriber for SoapClient {
    async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        SoapClient::subscribe(self, event_url, callback_url, timeout_seconds).await
    }

    async fn renew(&self, event_url: &str, sid: &str, timeout_seconds: u32) -> Result<u32, SoapError> {
        self.renew_subscription(event_url, sid, timeout_seconds).await
    }

    async fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        SoapClient::unsubscribe(self, event_url, sid).await
    }
}

/// Subscriptions of one listener to its target services
pub struct SubscriptionSet<S: EventSubscriber = SoapClient> {
    subscriber: S,
    targets: Vec<ServiceDescriptor>,
    callback_url: String,
    lease_seconds: u32,
    verbosity: LogVerbosity,
    states: BTreeMap<Service, SubscriptionState>,
    active: BTreeMap<Service, Subscription>,
    failed: Vec<Service>,
}

impl<S: EventSubscriber> SubscriptionSet<S> {
    /// Track `targets`, all initially unsubscribed
    pub fn new(
        subscriber: S,
        targets: Vec<ServiceDescriptor>,
        callback_url: impl Into<String>,
        lease: Duration,
        verbosity: LogVerbosity,
    ) -> Self {
        let states = targets
            .iter()
            .map(|target| (target.service, SubscriptionState::Unsubscribed))
            .collect();

        Self {
            subscriber,
            targets,
            callback_url: callback_url.into(),
            lease_seconds: u32::try_from(lease.as_secs()).unwrap_or(u32::MAX),
            verbosity,
            states,
            active: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn state(&self, service: Service) -> SubscriptionState {
        self.states
            .get(&service)
            .copied()
            .unwrap_or(SubscriptionState::Unsubscribed)
    }

    pub fn subscription(&self, service: Service) -> Option<&Subscription> {
        self.active.get(&service)
    }

    pub fn active_services(&self) -> Vec<Service> {
        self.active.keys().copied().collect()
    }

    pub fn failed_services(&self) -> Vec<Service> {
        self.failed.clone()
    }

    /// The service an inbound notification's SID belongs to
    pub fn service_for_sid(&self, sid: &str) -> Option<Service> {
        self.active
            .values()
            .find(|subscription| subscription.sid == sid)
            .map(|subscription| subscription.service)
    }

    /// First subscription attempt for every target
    pub async fn subscribe_all(&mut self, router: &EventRouter) {
        let services: Vec<Service> = self.targets.iter().map(|t| t.service).collect();
        for service in services {
            self.subscribe(service, router).await;
        }
    }

    /// Renew every active lease, then retry services that had failed
    /// before this cycle.
    ///
    /// Renewals are unconditional, whatever lease time remains. A service
    /// whose renewal fails is only retried on the following cycle.
    pub async fn renew_cycle(&mut self, router: &EventRouter) {
        let retry = std::mem::take(&mut self.failed);

        for service in self.active_services() {
            self.renew(service, router).await;
        }

        for service in retry {
            tracing::debug!(%service, "Retrying failed subscription");
            self.subscribe(service, router).await;
        }
    }

    /// Best-effort UNSUBSCRIBE of everything; all services end unsubscribed
    pub async fn unsubscribe_all(&mut self, router: &EventRouter) {
        let active = std::mem::take(&mut self.active);

        for (service, subscription) in active {
            router.unregister(&subscription.sid).await;

            if let Some(target) = self.target(service) {
                if let Err(e) = self
                    .subscriber
                    .unsubscribe(&target.event_sub_url, &subscription.sid)
                    .await
                {
                    tracing::debug!(%service, error = %e, "UNSUBSCRIBE failed");
                }
            }
        }

        self.failed.clear();
        for state in self.states.values_mut() {
            *state = SubscriptionState::Unsubscribed;
        }
    }

    async fn subscribe(&mut self, service: Service, router: &EventRouter) {
        let Some(event_url) = self.target(service).map(|t| t.event_sub_url.clone()) else {
            return;
        };

        self.states.insert(service, SubscriptionState::Subscribing);

        // The device may notify before its SUBSCRIBE response is read
        router.begin_pending().await;
        let outcome = self
            .subscriber
            .subscribe(&event_url, &self.callback_url, self.lease_seconds)
            .await;
        if let Ok(response) = &outcome {
            router.register(response.sid.clone()).await;
        }
        router.end_pending().await;

        match outcome {
            Ok(response) => {
                tracing::info!(
                    %service,
                    sid = %response.sid,
                    lease_seconds = response.timeout_seconds,
                    "Subscribed"
                );

                self.active.insert(
                    service,
                    Subscription {
                        service,
                        sid: response.sid,
                        lease_seconds: response.timeout_seconds,
                        established_at: Utc::now(),
                    },
                );
                self.states.insert(service, SubscriptionState::Subscribed);
            }
            Err(source) => {
                self.report(SoundbarError::Subscription { service, source });
                self.states.insert(service, SubscriptionState::Unsubscribed);
                self.mark_failed(service);
            }
        }
    }

    async fn renew(&mut self, service: Service, router: &EventRouter) {
        let (Some(event_url), Some(sid)) = (
            self.target(service).map(|t| t.event_sub_url.clone()),
            self.active.get(&service).map(|s| s.sid.clone()),
        ) else {
            return;
        };

        self.states.insert(service, SubscriptionState::Renewing);

        match self.subscriber.renew(&event_url, &sid, self.lease_seconds).await {
            Ok(lease_seconds) => {
                tracing::debug!(%service, %sid, lease_seconds, "Renewed subscription");
                self.active.insert(
                    service,
                    Subscription {
                        service,
                        sid,
                        lease_seconds,
                        established_at: Utc::now(),
                    },
                );
                self.states.insert(service, SubscriptionState::Subscribed);
            }
            Err(source) => {
                self.states.insert(service, SubscriptionState::RenewFailed);
                self.report(SoundbarError::Subscription { service, source });

                self.active.remove(&service);
                router.unregister(&sid).await;
                self.states.insert(service, SubscriptionState::Unsubscribed);
                self.mark_failed(service);
            }
        }
    }

    fn target(&self, service: Service) -> Option<&ServiceDescriptor> {
        self.targets.iter().find(|target| target.service == service)
    }

    fn mark_failed(&mut self, service: Service) {
        if !self.failed.contains(&service) {
            self.failed.push(service);
        }
    }

    fn report(&self, err: SoundbarError) {
        match self.verbosity {
            LogVerbosity::Verbose => tracing::error!(error = %err, "Subscription failure"),
            LogVerbosity::Quiet => tracing::warn!(error = %err, "Subscription failure"),
        }
    }
}
