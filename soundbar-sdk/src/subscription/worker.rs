//! Background listener thread
//!
//! The listener owns a dedicated thread running a current-thread tokio
//! runtime. It binds the notification receiver, subscribes to the target
//! services, then supervises: it forwards notifications to the player and
//! renews leases until asked to stop.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use callback_server::{detect_local_ip, CallbackServer, NotificationPayload};
use soap_client::SoapClient;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::callbacks::Callbacks;
use crate::config::{LogVerbosity, SoundbarConfig};
use crate::descriptor::{DescriptorCache, ServiceDescriptor};
use crate::error::{Result, SoundbarError};
use crate::event::EventPayload;
use crate::player::Player;
use crate::runtime::TaskRunner;
use crate::service::Service;

use super::manager::SubscriptionSet;

/// Everything the listener thread needs from its device
pub(crate) struct ListenerContext {
    pub config: SoundbarConfig,
    pub client: SoapClient,
    pub descriptors: Arc<DescriptorCache>,
    pub player: Arc<Player>,
    pub callbacks: Arc<Callbacks>,
    pub runner: TaskRunner,
}

/// Outcome of the listener's startup, sent once
pub(crate) type StartupResult = Result<()>;

/// Handle to a running listener thread.
///
/// Stopping is a request; the thread exits at its next stop check.
pub struct ListenerHandle {
    stop_tx: watch::Sender<bool>,
    listening: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Ask the listener to stop without waiting for it
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// True until the listener thread has exited
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Whether [`ListenerHandle::stop`] has been called
    pub fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Stop and wait for the thread to exit
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Listener thread panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clears the listening flag however the thread exits
struct ListeningGuard(Arc<AtomicBool>);

impl Drop for ListeningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Spawn the listener thread.
///
/// The returned receiver yields the startup outcome once: `Ok` after the
/// first subscription attempt for every target service, or the error that
/// stopped the listener before that.
pub(crate) fn spawn_listener(
    context: ListenerContext,
) -> Result<(ListenerHandle, std_mpsc::Receiver<StartupResult>)> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (startup_tx, startup_rx) = std_mpsc::channel();
    let listening = Arc::new(AtomicBool::new(true));
    let guard = ListeningGuard(listening.clone());

    let thread = thread::Builder::new()
        .name("soundbar-listener".to_string())
        .spawn(move || {
            let _guard = guard;
            let runner = context.runner.clone();

            runner.with_sink(|| {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = startup_tx.send(Err(SoundbarError::Worker(format!(
                            "failed to create listener runtime: {}",
                            e
                        ))));
                        return;
                    }
                };

                runtime.block_on(run_listener(context, stop_rx, startup_tx));
            });
        })
        .map_err(|e| SoundbarError::Worker(format!("failed to spawn listener thread: {}", e)))?;

    Ok((
        ListenerHandle {
            stop_tx,
            listening,
            thread: Some(thread),
        },
        startup_rx,
    ))
}

async fn run_listener(
    context: ListenerContext,
    stop_rx: watch::Receiver<bool>,
    startup_tx: std_mpsc::Sender<StartupResult>,
) {
    let (server, events, targets, callback_url) = match prepare(&context).await {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!(error = %e, "Listener failed to start");
            let _ = startup_tx.send(Err(e));
            return;
        }
    };

    tracing::info!(%callback_url, "Listening for device events");

    let mut subscriptions = SubscriptionSet::new(
        context.client.clone(),
        targets,
        callback_url,
        context.config.subscription_timeout,
        context.config.verbosity,
    );
    subscriptions.subscribe_all(server.router()).await;

    let _ = startup_tx.send(Ok(()));

    supervise(&context, &server, &mut subscriptions, events, stop_rx).await;

    subscriptions.unsubscribe_all(server.router()).await;
    if let Err(e) = server.shutdown().await {
        tracing::warn!(error = %e, "Notification receiver did not shut down cleanly");
    }

    tracing::info!("Listener stopped");
}

type Prepared = (
    CallbackServer,
    mpsc::UnboundedReceiver<NotificationPayload>,
    Vec<ServiceDescriptor>,
    String,
);

async fn prepare(context: &ListenerContext) -> Result<Prepared> {
    let descriptors = context
        .descriptors
        .describe()
        .await
        .map_err(|e| SoundbarError::Worker(e.to_string()))?;

    let targets = Service::SUBSCRIBABLE
        .into_iter()
        .map(|service| {
            descriptors
                .iter()
                .find(|descriptor| descriptor.service == service)
                .cloned()
                .ok_or_else(|| {
                    SoundbarError::Worker(format!(
                        "service {} is missing from the device description",
                        service
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let bind_addr = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        context.config.source_port,
    );
    let server = CallbackServer::bind(bind_addr, event_tx)
        .await
        .map_err(|e| SoundbarError::Worker(e.to_string()))?;

    let callback_url = match advertised_ip(&context.config) {
        Ok(ip) => server.callback_url(ip, context.config.listen_port),
        Err(e) => {
            let _ = server.shutdown().await;
            return Err(e);
        }
    };

    Ok((server, event_rx, targets, callback_url))
}

/// The address the device should send notifications to
fn advertised_ip(config: &SoundbarConfig) -> Result<IpAddr> {
    if let Some(ip) = config.listen_ip {
        return Ok(ip);
    }

    let url = Url::parse(&config.description_url)
        .map_err(|e| SoundbarError::Configuration(e.to_string()))?;
    let host = url.host_str().unwrap_or_default().to_string();
    let port = url.port_or_known_default().unwrap_or(80);

    detect_local_ip((host.as_str(), port)).ok_or_else(|| {
        SoundbarError::Worker(format!("could not determine a local address routable to {}", host))
    })
}

async fn supervise(
    context: &ListenerContext,
    server: &CallbackServer,
    subscriptions: &mut SubscriptionSet,
    mut events: mpsc::UnboundedReceiver<NotificationPayload>,
    stop_rx: watch::Receiver<bool>,
) {
    let ticks_per_cycle = context.config.ticks_per_cycle();
    let mut ticks = 0;
    let mut stop_check = tokio::time::interval(context.config.stop_check_interval);
    stop_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    stop_check.tick().await;

    loop {
        tokio::select! {
            Some(notification) = events.recv() => {
                handle_notification(context, subscriptions, notification);
            }
            _ = stop_check.tick() => {
                if *stop_rx.borrow() {
                    break;
                }

                ticks += 1;
                if ticks >= ticks_per_cycle {
                    ticks = 0;
                    subscriptions.renew_cycle(server.router()).await;
                }
            }
        }
    }
}

fn handle_notification(
    context: &ListenerContext,
    subscriptions: &SubscriptionSet,
    notification: NotificationPayload,
) {
    let Some(service) = subscriptions.service_for_sid(&notification.subscription_id) else {
        tracing::debug!(sid = %notification.subscription_id, "Notification for a stale subscription");
        return;
    };

    let verbose = context.config.verbosity == LogVerbosity::Verbose;
    if verbose {
        tracing::debug!(
            %service,
            sid = %notification.subscription_id,
            seq = ?notification.sequence,
            "Notification received"
        );
    }

    let payload = match EventPayload::decode(service, &notification.event_xml) {
        Ok(payload) => payload,
        Err(e) => {
            report(context.config.verbosity, service, &e);
            return;
        }
    };

    if let Err(e) = context.player.apply_event(&payload.change_set) {
        report(context.config.verbosity, service, &e);
        return;
    }

    context.callbacks.emit_event(&payload);
}

fn report(verbosity: LogVerbosity, service: Service, err: &SoundbarError) {
    match verbosity {
        LogVerbosity::Verbose => tracing::error!(%service, error = %err, "Dropping event"),
        LogVerbosity::Quiet => tracing::warn!(%service, error = %err, "Dropping event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_listen_ip_is_advertised() {
        let ip: IpAddr = "10.0.0.3".parse().unwrap();
        let config = SoundbarConfig::for_ip("10.0.0.2").with_listen_address(ip, 4000);
        assert_eq!(advertised_ip(&config).unwrap(), ip);
    }

    #[test]
    fn test_local_ip_is_detected_towards_device() {
        let config = SoundbarConfig::for_ip("127.0.0.1");
        assert_eq!(
            advertised_ip(&config).unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[test]
    fn test_listening_guard_clears_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        drop(ListeningGuard(flag.clone()));
        assert!(!flag.load(Ordering::SeqCst));
    }
}
