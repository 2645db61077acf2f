//! Configuration for a [`Soundbar`](crate::Soundbar)
//!
//! This module defines the device address, the local notification receiver
//! settings, the listener timing and the injected logging sink.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use tracing::Dispatch;

use crate::error::{Result, SoundbarError};

/// Port the device serves its description document on
pub const DESCRIPTION_PORT: u16 = 49152;

/// How loudly repeated failures are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogVerbosity {
    /// Repeated failures log at `error`; per-notification chatter at `debug`
    #[default]
    Verbose,
    /// Repeated failures log at `warn`; no per-notification chatter
    Quiet,
}

/// Configuration for a [`Soundbar`](crate::Soundbar)
#[derive(Clone)]
pub struct SoundbarConfig {
    /// URL of the device description document
    /// Default: `http://<ip>:49152/description.xml` via [`SoundbarConfig::for_ip`]
    pub description_url: String,

    /// Address advertised to the device in the SUBSCRIBE callback URL
    /// Default: None (auto-detected from the route to the device)
    pub listen_ip: Option<IpAddr>,

    /// Port advertised to the device in the SUBSCRIBE callback URL
    /// Default: None (the port the receiver is bound to)
    pub listen_port: Option<u16>,

    /// Local port the notification receiver binds to
    /// Default: 0 (OS-assigned)
    pub source_port: u16,

    /// Interval between lease renewal and failed-subscription retry cycles
    /// Default: 120 seconds
    pub resubscribe_interval: Duration,

    /// How often the listener checks for a stop request
    /// Default: 1 second
    pub stop_check_interval: Duration,

    /// Lease requested in every SUBSCRIBE
    /// Default: 1800 seconds (30 minutes)
    pub subscription_timeout: Duration,

    /// How often `start_listening` polls for worker startup
    /// Default: 10 milliseconds
    pub start_poll_interval: Duration,

    /// Log level used for repeated failures
    /// Default: Verbose
    pub verbosity: LogVerbosity,

    /// Logging sink used by this device's calls and listener
    /// Default: None (the global default subscriber)
    pub log_sink: Option<Dispatch>,
}

impl Default for SoundbarConfig {
    fn default() -> Self {
        Self {
            description_url: String::new(),
            listen_ip: None,
            listen_port: None,
            source_port: 0,
            resubscribe_interval: Duration::from_secs(120),
            stop_check_interval: Duration::from_secs(1),
            subscription_timeout: Duration::from_secs(1800), // 30 minutes
            start_poll_interval: Duration::from_millis(10),
            verbosity: LogVerbosity::Verbose,
            log_sink: None,
        }
    }
}

impl fmt::Debug for SoundbarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundbarConfig")
            .field("description_url", &self.description_url)
            .field("listen_ip", &self.listen_ip)
            .field("listen_port", &self.listen_port)
            .field("source_port", &self.source_port)
            .field("resubscribe_interval", &self.resubscribe_interval)
            .field("stop_check_interval", &self.stop_check_interval)
            .field("subscription_timeout", &self.subscription_timeout)
            .field("start_poll_interval", &self.start_poll_interval)
            .field("verbosity", &self.verbosity)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl SoundbarConfig {
    /// Configuration for the device at `ip`, using its default description URL
    pub fn for_ip(ip: impl fmt::Display) -> Self {
        Self::with_description_url(format!(
            "http://{}:{}/description.xml",
            ip, DESCRIPTION_PORT
        ))
    }

    /// Configuration for a device whose description lives at `url`
    pub fn with_description_url(url: impl Into<String>) -> Self {
        Self {
            description_url: url.into(),
            ..Default::default()
        }
    }

    /// Set the address and port advertised in the callback URL
    pub fn with_listen_address(mut self, ip: IpAddr, port: u16) -> Self {
        self.listen_ip = Some(ip);
        self.listen_port = Some(port);
        self
    }

    /// Set the local port the notification receiver binds to
    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = port;
        self
    }

    pub fn with_resubscribe_interval(mut self, interval: Duration) -> Self {
        self.resubscribe_interval = interval;
        self
    }

    pub fn with_stop_check_interval(mut self, interval: Duration) -> Self {
        self.stop_check_interval = interval;
        self
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn with_verbosity(mut self, verbosity: LogVerbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Route this device's log output to `sink` instead of the global subscriber
    pub fn with_log_sink(mut self, sink: Dispatch) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.description_url.trim().is_empty() {
            return Err(SoundbarError::Configuration(
                "description_url must not be empty".to_string(),
            ));
        }

        url::Url::parse(&self.description_url).map_err(|e| {
            SoundbarError::Configuration(format!(
                "invalid description_url {:?}: {}",
                self.description_url, e
            ))
        })?;

        match (self.listen_ip, self.listen_port) {
            (Some(ip), None) => {
                return Err(SoundbarError::Configuration(format!(
                    "listen_port cannot be None when listen_ip is set: {}",
                    ip
                )))
            }
            (None, Some(port)) => {
                return Err(SoundbarError::Configuration(format!(
                    "listen_ip cannot be None when listen_port is set: {}",
                    port
                )))
            }
            _ => {}
        }

        for (name, interval) in [
            ("resubscribe_interval", self.resubscribe_interval),
            ("stop_check_interval", self.stop_check_interval),
            ("start_poll_interval", self.start_poll_interval),
        ] {
            if interval.is_zero() {
                return Err(SoundbarError::Configuration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.subscription_timeout.as_secs() == 0 {
            return Err(SoundbarError::Configuration(
                "subscription_timeout must be at least one second".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of stop checks between renewal cycles, at least one
    pub(crate) fn ticks_per_cycle(&self) -> u64 {
        let ticks = self.resubscribe_interval.as_millis() / self.stop_check_interval.as_millis().max(1);
        u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
    }
}
