//! The warp server behind the notification receiver

use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use warp::http::{Method, StatusCode};
use warp::Filter;

use super::error::ServerError;
use super::router::{Delivery, EventRouter, NotificationPayload};

/// Path segment the device delivers NOTIFY requests to
pub const NOTIFY_PATH: &str = "notify";

/// Receiver for `NOTIFY /notify`.
///
/// Requests with a missing `SID` or wrong `NT`/`NTS` get 400, unknown
/// subscription ids get 412, anything but NOTIFY gets 405. Accepted bodies
/// go out through the [`EventRouter`].
///
/// ```no_run
/// use std::net::Ipv4Addr;
/// use tokio::sync::mpsc;
/// use callback_server::CallbackServer;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), callback_server::ServerError> {
/// let (tx, _rx) = mpsc::unbounded_channel();
/// let server = CallbackServer::bind((Ipv4Addr::UNSPECIFIED, 0).into(), tx).await?;
///
/// let url = server.callback_url(Ipv4Addr::new(192, 168, 1, 20).into(), None);
/// assert!(url.ends_with("/notify"));
/// server.shutdown().await
/// # }
/// ```
pub struct CallbackServer {
    local_addr: SocketAddr,
    event_router: Arc<EventRouter>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the receiver and start serving in the current tokio runtime.
    ///
    /// Port 0 lets the OS assign a free port; [`CallbackServer::port`]
    /// reports the bound one.
    pub async fn bind(
        addr: SocketAddr,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, ServerError> {
        let event_router = Arc::new(EventRouter::new(event_sender));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let routes = notify_route(event_router.clone()).recover(handle_rejection);

        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| ServerError::Bind {
                addr,
                reason: e.to_string(),
            })?;

        tracing::debug!(%local_addr, "Callback server listening");

        let server_handle = tokio::spawn(server);

        Ok(Self {
            local_addr,
            event_router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// The socket address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The port the server is bound to
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The callback URL to hand to the device in SUBSCRIBE requests.
    ///
    /// `advertised_port` overrides the bound port, for receivers reachable
    /// through a forwarded port.
    pub fn callback_url(&self, advertised_ip: IpAddr, advertised_port: Option<u16>) -> String {
        let advertised = SocketAddr::new(advertised_ip, advertised_port.unwrap_or(self.port()));
        format!("http://{}/{}", advertised, NOTIFY_PATH)
    }

    /// The router used to accept or drop subscription ids
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Stop serving and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| ServerError::Task(e.to_string()))?;
        }

        tracing::debug!(local_addr = %self.local_addr, "Callback server stopped");
        Ok(())
    }
}

/// The subscription id of a well-formed event NOTIFY.
///
/// `SID` is required. `NT` and `NTS` may be absent, but each one present
/// must carry its GENA event value.
fn event_sid(sid: Option<String>, nt: Option<&str>, nts: Option<&str>) -> Option<String> {
    let nt_ok = nt.map_or(true, |nt| nt == "upnp:event");
    let nts_ok = nts.map_or(true, |nts| nts == "upnp:propchange");

    sid.filter(|sid| !sid.trim().is_empty() && nt_ok && nts_ok)
}

/// Detect the local IP address the device can reach us on.
///
/// Connects a UDP socket towards `target` (usually the device's host and
/// port) and reads back the local address the OS picked for the route. No
/// data is sent.
pub fn detect_local_ip<A: ToSocketAddrs>(target: A) -> Option<IpAddr> {
    let target = target.to_socket_addrs().ok()?.next()?;
    let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

    let socket = UdpSocket::bind(bind_addr).ok()?;
    socket.connect(target).ok()?;
    Some(socket.local_addr().ok()?.ip())
}

fn notify_route(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path(NOTIFY_PATH)
        .and(warp::path::end())
        .and(warp::method())
        .and(warp::header::optional::<String>("sid"))
        .and(warp::header::optional::<String>("nt"))
        .and(warp::header::optional::<String>("nts"))
        .and(warp::header::optional::<String>("seq"))
        .and(warp::body::bytes())
        .and_then(
            move |method: Method,
                  sid: Option<String>,
                  nt: Option<String>,
                  nts: Option<String>,
                  seq: Option<String>,
                  body: Bytes| {
                let router = router.clone();
                async move { handle_notify(router, method, sid, nt, nts, seq, body).await }
            },
        )
}

async fn handle_notify(
    router: Arc<EventRouter>,
    method: Method,
    sid: Option<String>,
    nt: Option<String>,
    nts: Option<String>,
    seq: Option<String>,
    body: Bytes,
) -> Result<warp::reply::WithStatus<&'static str>, warp::Rejection> {
    if method.as_str() != "NOTIFY" {
        return Err(warp::reject::custom(UnsupportedMethod));
    }

    let Some(sid) = event_sid(sid.clone(), nt.as_deref(), nts.as_deref()) else {
        tracing::debug!(?sid, ?nt, ?nts, "Rejecting NOTIFY with invalid headers");
        return Err(warp::reject::custom(InvalidUpnpHeaders));
    };

    // A malformed SEQ only loses gap detection
    let sequence = seq.and_then(|seq| seq.trim().parse::<u32>().ok());
    tracing::trace!(%sid, ?sequence, bytes = body.len(), "Received NOTIFY");

    let notification = NotificationPayload {
        subscription_id: sid.clone(),
        sequence,
        event_xml: String::from_utf8_lossy(&body).into_owned(),
    };

    match router.route(notification).await {
        Delivery::Accepted | Delivery::Held => Ok(warp::reply::with_status("", StatusCode::OK)),
        Delivery::UnknownSubscription => {
            tracing::debug!(%sid, "Dropping NOTIFY for unknown subscription");
            Err(warp::reject::custom(UnknownSubscription))
        }
    }
}

#[derive(Debug)]
struct InvalidUpnpHeaders;

impl warp::reject::Reject for InvalidUpnpHeaders {}

#[derive(Debug)]
struct UnknownSubscription;

impl warp::reject::Reject for UnknownSubscription {}

#[derive(Debug)]
struct UnsupportedMethod;

impl warp::reject::Reject for UnsupportedMethod {}

async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.find::<UnknownSubscription>().is_some() {
        (StatusCode::PRECONDITION_FAILED, "Subscription not found")
    } else if err.find::<InvalidUpnpHeaders>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid UPnP headers")
    } else if err.find::<UnsupportedMethod>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Only NOTIFY is accepted")
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message, code))
}
