//! Local receiver for GENA event notifications.
//!
//! A soundbar delivers state changes by calling back into the controller
//! with `NOTIFY /notify`. This crate serves that endpoint and hands the raw
//! bodies to whoever owns the subscriptions:
//!
//! - [`CallbackServer`] binds the socket and checks the GENA headers;
//! - [`EventRouter`] holds the accepted subscription ids (unknown ones get
//!   `412 Precondition Failed` unless a SUBSCRIBE is still in flight);
//! - [`NotificationPayload`] is what comes out of the channel.
//!
//! Nothing here parses the property-set body.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackServer, NotificationPayload};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::ServerError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
//!     let server = CallbackServer::bind(([0, 0, 0, 0], 0).into(), tx).await?;
//!
//!     server.router().register("uuid:avt-1".to_string()).await;
//!
//!     while let Some(notification) = rx.recv().await {
//!         println!("{} #{:?}", notification.subscription_id, notification.sequence);
//!     }
//!
//!     server.shutdown().await
//! }
//! ```

mod error;
pub mod router;
mod server;

pub use error::ServerError;
pub use router::{Delivery, EventRouter, NotificationPayload, MAX_HELD_NOTIFICATIONS};
pub use server::{detect_local_ip, CallbackServer, NOTIFY_PATH};
