//! Per-user port server.
//!
//! # Responsibilities
//! - Own the listening socket of one user slot
//! - Spawn one task per accepted connection
//! - Keep accepting through individual accept failures
//! - Stop accepting when the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::net::{ListenerError, PortListener, SessionTracker};
use crate::proxy::session::SessionHandler;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

pub struct PortServer {
    index: usize,
    listener: PortListener,
    handler: Arc<SessionHandler>,
    tracker: SessionTracker,
}

impl PortServer {
    /// Bind the slot's port. A bind failure is returned to the caller, which
    /// treats it as fatal.
    pub async fn bind(
        index: usize,
        addr: SocketAddr,
        max_connections: usize,
        handler: SessionHandler,
    ) -> Result<Self, ListenerError> {
        let listener = PortListener::bind(addr, max_connections).await?;
        let tracker = SessionTracker::new(handler.user());
        Ok(Self {
            index,
            listener,
            handler: Arc::new(handler),
            tracker,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared view of this port's live-session count.
    pub fn tracker(&self) -> SessionTracker {
        self.tracker.clone()
    }

    /// Accept until `shutdown` fires. In-flight sessions are not cancelled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let local_addr = self.listener.local_addr().ok();
        tracing::info!(
            user = %self.handler.user(),
            address = ?local_addr,
            "Port server accepting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(user = %self.handler.user(), "Port server stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            handler.serve(stream, peer, guard.id()).await;
                            drop(guard);
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(user = %self.handler.user(), error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                    }
                },
            }
        }
    }
}
