//! Error types for the callback server

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while starting or stopping the callback server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("Failed to bind callback server on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    /// The server task panicked or was cancelled
    #[error("Callback server task failed: {0}")]
    Task(String),
}
