//! Core HTTP server implementation.
//!
//! This module implements only the networking concerns: accepting TCP
//! connections and handing each one off to its own [`HttpConnection`].
//! Request parsing, validation, and response generation live in the `http`,
//! `connection`, and `response_operation` modules; this module never looks
//! inside a request.
//!
//! The server is fully asynchronous and leverages `async-std` to provide
//! non-blocking I/O and concurrent client handling: one task per
//! connection, with no shared mutable state between them beyond the
//! read-only [`ResourceProvider`].

use std::path::PathBuf;
use std::sync::Arc;

use async_std::net::TcpListener;
use async_std::task;
use log::{debug, error, info};

use crate::channel::IoChannel;
use crate::config::config;
use crate::connection::{ConnectionDelegate, ConnectionId, HttpConnection};
use crate::provider::{FilesystemProvider, ResourceProvider};

/// The server's own connection delegate: just logs. An embedder that needs
/// to react to a connection closing (metrics, connection-count bookkeeping)
/// would substitute its own.
struct ConnectionLogger;

impl ConnectionDelegate for ConnectionLogger {
    fn on_connection_closed(&self, connection_id: ConnectionId) {
        info!("connection {:?} closed", connection_id);
    }
}

pub struct Server {
    provider: Arc<dyn ResourceProvider>,
    delegate: Arc<dyn ConnectionDelegate>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            provider: Arc::new(FilesystemProvider),
            delegate: Arc::new(ConnectionLogger),
        }
    }

    /// Starts the HTTP server by binding to the configured address and
    /// port, and runs indefinitely, accepting incoming TCP connections and
    /// spawning a new asynchronous task for each client.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind((config().address, config().port)).await?;
        info!("listening on {}:{}", config().address, config().port);

        let document_root = PathBuf::from(&config().document_root);

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("accept failed: {e}");
                    continue;
                }
            };

            let provider = self.provider.clone();
            let document_root = document_root.clone();
            let delegate = Arc::downgrade(&self.delegate);

            task::spawn(async move {
                let channel = IoChannel::new(stream, config().buffer_size, move || {
                    debug!("channel cleanup for peer {peer_addr}");
                });
                let connection =
                    HttpConnection::new(channel, document_root, provider, Some(delegate));
                info!("accepted connection {:?} from {peer_addr}", connection.id);
                connection.run().await;
            });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
